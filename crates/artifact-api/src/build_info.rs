//! Agent build metadata and the `User-Agent` header derived from it.
//!
//! Captured once into an immutable [`BuildInfo`] and passed to whatever
//! builds requests; nothing here reads process-wide mutable state.

/// Default agent name used in the `User-Agent` header
pub const DEFAULT_AGENT_NAME: &str = "artifact-agent";

/// Placeholder for an unknown build number or commit
const UNKNOWN: &str = "x";

/// Version, build and platform identity of the running agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub agent_name: String,
    pub version: String,
    pub build_number: Option<String>,
    pub commit: Option<String>,
    /// Whether the source tree had uncommitted changes
    pub dirty: bool,
    pub os: String,
    pub arch: String,
}

impl BuildInfo {
    /// Explicit build metadata for the host platform.
    pub fn new(agent_name: impl Into<String>, version: impl Into<String>) -> Self {
        BuildInfo {
            agent_name: agent_name.into(),
            version: version.into(),
            build_number: None,
            commit: None,
            dirty: false,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Metadata baked in at compile time.
    ///
    /// Release pipelines set `ARTIFACT_AGENT_BUILD_NUMBER`,
    /// `ARTIFACT_AGENT_COMMIT` and `ARTIFACT_AGENT_DIRTY` when building.
    pub fn current() -> Self {
        let mut info = Self::new(DEFAULT_AGENT_NAME, env!("CARGO_PKG_VERSION"));
        info.build_number = option_env!("ARTIFACT_AGENT_BUILD_NUMBER")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        info.commit = option_env!("ARTIFACT_AGENT_COMMIT")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        info.dirty = matches!(option_env!("ARTIFACT_AGENT_DIRTY"), Some("1") | Some("true"));
        info
    }

    pub fn with_build_number(mut self, build_number: impl Into<String>) -> Self {
        self.build_number = Some(build_number.into());
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>, dirty: bool) -> Self {
        self.commit = Some(commit.into());
        self.dirty = dirty;
        self
    }

    pub fn with_platform(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.os = os.into();
        self.arch = arch.into();
        self
    }

    pub fn version(&self) -> &str {
        self.version.trim()
    }

    pub fn build_number(&self) -> &str {
        match self.build_number.as_deref() {
            Some(n) if !n.is_empty() => n,
            _ => UNKNOWN,
        }
    }

    fn commit_info(&self) -> String {
        match &self.commit {
            Some(commit) if self.dirty => format!("{commit}.dirty"),
            Some(commit) => commit.clone(),
            None => UNKNOWN.to_string(),
        }
    }

    /// SemVer 2.0 version with build metadata: `{version}+{build}.{commit}`.
    pub fn full_version(&self) -> String {
        format!(
            "{}+{}.{}",
            self.version(),
            self.build_number(),
            self.commit_info()
        )
    }

    /// `{agent}/{version}.{build} ({os}; {arch})`
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{}.{} ({}; {})",
            self.agent_name,
            self.version(),
            self.build_number(),
            self.os,
            self.arch
        )
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_format() {
        let info = BuildInfo::new("ci-agent", "3.42.0\n")
            .with_build_number("1234")
            .with_platform("linux", "amd64");

        assert_eq!(info.user_agent(), "ci-agent/3.42.0.1234 (linux; amd64)");
    }

    #[test]
    fn test_unknown_build_number_is_x() {
        let info = BuildInfo::new("ci-agent", "1.0.0").with_platform("darwin", "arm64");
        assert_eq!(info.build_number(), "x");
        assert_eq!(info.user_agent(), "ci-agent/1.0.0.x (darwin; arm64)");
    }

    #[test]
    fn test_full_version_variants() {
        let base = BuildInfo::new("ci-agent", "1.2.3");
        assert_eq!(base.full_version(), "1.2.3+x.x");

        let clean = base.clone().with_build_number("77").with_commit("abc123", false);
        assert_eq!(clean.full_version(), "1.2.3+77.abc123");

        let dirty = base.with_commit("abc123", true);
        assert_eq!(dirty.full_version(), "1.2.3+x.abc123.dirty");
    }

    #[test]
    fn test_current_uses_package_version() {
        let info = BuildInfo::current();
        assert_eq!(info.version(), env!("CARGO_PKG_VERSION"));
        assert_eq!(info.agent_name, DEFAULT_AGENT_NAME);
        assert!(!info.os.is_empty());
    }
}
