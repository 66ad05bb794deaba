//! Local file inspection for `register`
//!
//! Turns command-line paths into unregistered artifacts: size and SHA-1 are
//! computed here, before anything is sent.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use artifact_api::Artifact;
use sha1::{Digest, Sha1};

/// Describe each file in `paths`, resolving relative paths against `base`.
pub fn collect_artifacts(paths: &[PathBuf], base: &Path) -> Result<Vec<Artifact>> {
    let base = base
        .canonicalize()
        .with_context(|| format!("cannot resolve working directory {}", base.display()))?;
    paths.iter().map(|p| describe_file(p, &base)).collect()
}

fn describe_file(arg: &Path, base: &Path) -> Result<Artifact> {
    let joined = if arg.is_absolute() {
        arg.to_path_buf()
    } else {
        base.join(arg)
    };
    let absolute = joined
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", arg.display()))?;
    let metadata = std::fs::metadata(&absolute)
        .with_context(|| format!("cannot stat {}", absolute.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a regular file", arg.display());
    }

    let relative = match absolute.strip_prefix(base) {
        Ok(rel) => to_slash(rel),
        Err(_) => to_slash(arg),
    };

    Ok(Artifact::new(relative, metadata.len(), sha1_file(&absolute)?)
        .with_absolute_path(absolute.to_string_lossy())
        .with_glob_path(to_slash(arg)))
}

/// Hex SHA-1 of a file's contents.
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sha1_known_value() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, b"test").unwrap();

        assert_eq!(
            sha1_file(&file).unwrap(),
            "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
        );
    }

    #[test]
    fn test_collect_relative_paths() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/app.bin"), vec![7u8; 1500]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        let artifacts = collect_artifacts(
            &[PathBuf::from("dist/app.bin"), PathBuf::from("./notes.txt")],
            dir.path(),
        )
        .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].path, "dist/app.bin");
        assert_eq!(artifacts[0].file_size, 1500);
        assert_eq!(artifacts[0].glob_path, "dist/app.bin");
        assert!(artifacts[0].absolute_path.ends_with("app.bin"));
        assert_eq!(artifacts[1].path, "notes.txt");
        assert_eq!(artifacts[1].sha1sum.len(), 40);
        assert!(artifacts.iter().all(|a| a.validate().is_ok()));
        assert!(artifacts.iter().all(|a| !a.is_registered()));
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();

        let err = collect_artifacts(&[PathBuf::from("sub")], dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(collect_artifacts(&[PathBuf::from("nope.txt")], dir.path()).is_err());
    }
}
