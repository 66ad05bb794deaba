//! artifact-agent - artifact batch protocol CLI
//!
//! ## Commands
//!
//! - `register`: hash local files and register them as one batch
//! - `update`: report artifact states (`ID=STATE`)
//! - `search`: list a build's artifacts
//! - `version`: print build metadata and the user agent

mod discover;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use artifact_api::http::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};
use artifact_api::{
    init_tracing, ApiConfig, Artifact, ArtifactBatch, ArtifactClient, ArtifactRegistry,
    ArtifactSearch, ArtifactState, BuildInfo, HttpTransport, SearchOptions, StateReporter,
    UploadInstructions,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "artifact-agent")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Register, report and search CI build artifacts", long_about = None)]
struct Cli {
    /// Artifact API endpoint
    #[arg(
        long,
        global = true,
        env = "ARTIFACT_API_ENDPOINT",
        default_value = DEFAULT_ENDPOINT
    )]
    endpoint: String,

    /// Agent access token
    #[arg(long, global = true, env = "ARTIFACT_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(
        long,
        global = true,
        env = "ARTIFACT_API_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register local files as one artifact batch
    Register {
        /// Job the artifacts belong to
        #[arg(short, long)]
        job: String,

        /// Upload destination, e.g. a bucket URL
        #[arg(short, long)]
        destination: Option<String>,

        /// Files to register, in batch order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Report artifact states
    Update {
        /// Job the artifacts belong to
        #[arg(short, long)]
        job: String,

        /// `ARTIFACT_ID=STATE` pairs (states: new, uploading, finished, error, ...)
        #[arg(required = true)]
        states: Vec<String>,
    },

    /// Search a build's artifacts
    Search {
        /// Build to search
        #[arg(short, long)]
        build: String,

        /// Path query
        #[arg(short, long)]
        query: Option<String>,

        /// Narrow to a scope such as a job ID
        #[arg(short, long)]
        scope: Option<String>,
    },

    /// Print version and user agent
    Version,
}

#[derive(Serialize)]
struct RegisteredArtifact<'a> {
    id: &'a str,
    path: &'a str,
    file_size: u64,
    sha1sum: &'a str,
}

#[derive(Serialize)]
struct RegisterOutput<'a> {
    batch_id: &'a str,
    artifacts: Vec<RegisteredArtifact<'a>>,
    upload_instructions: Option<&'a UploadInstructions>,
}

#[derive(Serialize)]
struct SearchHit {
    id: Option<String>,
    path: String,
    absolute_path: String,
    glob_path: String,
    file_size: u64,
    sha1sum: String,
    url: Option<String>,
    upload_destination: Option<String>,
}

impl From<Artifact> for SearchHit {
    fn from(a: Artifact) -> Self {
        SearchHit {
            id: a.id().map(str::to_string),
            path: a.path,
            absolute_path: a.absolute_path,
            glob_path: a.glob_path,
            file_size: a.file_size,
            sha1sum: a.sha1sum,
            url: a.url,
            upload_destination: a.upload_destination,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let build_info = BuildInfo::current();
    if let Commands::Version = cli.command {
        println!("{}", build_info.full_version());
        println!("{}", build_info.user_agent());
        return Ok(());
    }

    let mut config = ApiConfig::new(&cli.endpoint).with_timeout(Duration::from_secs(cli.timeout));
    if let Some(token) = cli.token.as_deref().filter(|t| !t.is_empty()) {
        config = config.with_token(token);
    }
    let transport =
        HttpTransport::new(config, &build_info).context("failed to create HTTP client")?;
    let client = ArtifactClient::new(transport);

    match cli.command {
        Commands::Register {
            job,
            destination,
            files,
        } => cmd_register(&client, &job, destination, &files).await,
        Commands::Update { job, states } => cmd_update(&client, &job, &states).await,
        Commands::Search {
            build,
            query,
            scope,
        } => cmd_search(&client, &build, query, scope).await,
        Commands::Version => Ok(()),
    }
}

async fn cmd_register(
    client: &ArtifactClient<HttpTransport>,
    job: &str,
    destination: Option<String>,
    files: &[PathBuf],
) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let artifacts = discover::collect_artifacts(files, &cwd)?;
    info!(count = artifacts.len(), job_id = %job, "registering artifacts");

    let mut batch = ArtifactBatch::new(artifacts);
    batch.upload_destination = destination;

    let result = client
        .create_batch(job, &mut batch)
        .await
        .context("batch creation failed")?;

    let output = RegisterOutput {
        batch_id: &result.id,
        artifacts: batch
            .artifacts()
            .iter()
            .map(|a| RegisteredArtifact {
                id: a.id().unwrap_or_default(),
                path: &a.path,
                file_size: a.file_size,
                sha1sum: &a.sha1sum,
            })
            .collect(),
        upload_instructions: result.upload_instructions.as_deref(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_update(
    client: &ArtifactClient<HttpTransport>,
    job: &str,
    pairs: &[String],
) -> Result<()> {
    let states = parse_state_pairs(pairs)?;
    client
        .update_states(job, &states)
        .await
        .context("state update failed")?;
    println!("Updated {} artifact state(s)", states.len());
    Ok(())
}

async fn cmd_search(
    client: &ArtifactClient<HttpTransport>,
    build: &str,
    query: Option<String>,
    scope: Option<String>,
) -> Result<()> {
    let options = SearchOptions { query, scope };
    let hits: Vec<SearchHit> = client
        .search(build, &options)
        .await
        .context("artifact search failed")?
        .map(SearchHit::from)
        .collect();
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

/// Parse `ID=STATE` arguments. Repeating an ID is an error.
fn parse_state_pairs(pairs: &[String]) -> Result<HashMap<String, ArtifactState>> {
    let mut states = HashMap::with_capacity(pairs.len());
    for pair in pairs {
        let Some((id, state)) = pair.split_once('=') else {
            bail!("expected ID=STATE, got {pair:?}");
        };
        let (id, state) = (id.trim(), state.trim());
        if id.is_empty() || state.is_empty() {
            bail!("expected ID=STATE, got {pair:?}");
        }
        if states
            .insert(id.to_string(), ArtifactState::from(state))
            .is_some()
        {
            bail!("artifact {id} given more than once");
        }
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_pairs() {
        let states = parse_state_pairs(&[
            "art-1=finished".to_string(),
            "art-2 = error".to_string(),
        ])
        .unwrap();
        assert_eq!(states["art-1"], ArtifactState::finished());
        assert_eq!(states["art-2"], ArtifactState::error());
    }

    #[test]
    fn test_parse_state_pairs_rejects_malformed() {
        assert!(parse_state_pairs(&["art-1".to_string()]).is_err());
        assert!(parse_state_pairs(&["=finished".to_string()]).is_err());
        assert!(parse_state_pairs(&["art-1=".to_string()]).is_err());
    }

    #[test]
    fn test_parse_state_pairs_rejects_duplicates() {
        let err = parse_state_pairs(&["a=finished".to_string(), "a=error".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_cli_parses_register() {
        let cli = Cli::try_parse_from([
            "artifact-agent",
            "--endpoint",
            "https://ci.example.com/v3",
            "register",
            "--job",
            "job-1",
            "a.txt",
            "b.txt",
        ])
        .unwrap();
        assert_eq!(cli.endpoint, "https://ci.example.com/v3");
        match cli.command {
            Commands::Register { job, files, .. } => {
                assert_eq!(job, "job-1");
                assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_cli_register_requires_files() {
        assert!(Cli::try_parse_from(["artifact-agent", "register", "--job", "job-1"]).is_err());
    }

    #[test]
    fn test_search_hit_keeps_id() {
        let artifact: Artifact =
            serde_json::from_str(r#"{"id":"art-1","path":"a.txt","file_size":3,"sha1sum":"x"}"#)
                .unwrap();
        let hit = SearchHit::from(artifact);
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["id"], "art-1");
        assert_eq!(json["path"], "a.txt");
    }
}
