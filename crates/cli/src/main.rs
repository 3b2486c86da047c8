//! bibsync command-line tool.
//!
//! Merges two revisions of a BibTeX library kept in git entry by entry,
//! reports conflicts, resolves them (from a strategy, a JSON file or
//! interactively) and writes the merge commit. Also generates and validates
//! configuration files.

mod interactive;
mod report;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bibsync_core::config::AppConfig;
use bibsync_core::errors::ResolutionError;
use bibsync_core::merge::{ResolutionApplier, Strategy, ThreeWaySetDiff};
use bibsync_core::models::{MergeResult, ResolutionMap};
use bibsync_core::sync_service::{GitSyncService, SyncOutcome};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// bibsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "bibsync",
    version,
    about = "Entry-level three-way merge for BibTeX libraries under git"
)]
struct Cli {
    /// Path to the TOML configuration file [default: <config dir>/bibsync/config.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository path, overriding the configuration.
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Library file inside the repository, overriding the configuration.
    #[arg(long, global = true)]
    library: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge REMOTE into LOCAL and report the outcome.
    Merge {
        /// Revision to merge into (branch, tag or commit).
        local: String,

        /// Revision to merge from.
        remote: String,

        /// Write the merge commit when no conflicts remain.
        #[arg(long)]
        commit: bool,

        /// Print the merge result as JSON.
        #[arg(long)]
        json: bool,

        /// Show a unified diff of the library against LOCAL.
        #[arg(long)]
        preview: bool,
    },

    /// Resolve conflicts of a merge and commit it.
    Resolve {
        local: String,
        remote: String,

        /// Answer every conflict with one side: local or remote.
        #[arg(long, conflicts_with_all = ["resolutions", "interactive"])]
        accept: Option<Strategy>,

        /// JSON file with a list of resolutions.
        #[arg(long, conflicts_with = "interactive")]
        resolutions: Option<PathBuf>,

        /// Prompt for each conflict.
        #[arg(short, long)]
        interactive: bool,

        /// Print the resolved library instead of committing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show how each entry changed on both sides since the common ancestor.
    Diff {
        local: String,
        remote: String,

        /// Include unchanged entries.
        #[arg(long)]
        all: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./bibsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_config(&cli);

    let level = config
        .as_ref()
        .map(|c| c.general.log_level.clone())
        .unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .without_time()
        .init();

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: Result<AppConfig>) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&config_path(&cli.config)),
        command => {
            let config = config?;
            match command {
                Commands::Merge {
                    local,
                    remote,
                    commit,
                    json,
                    preview,
                } => cmd_merge(&config, &local, &remote, commit, json, preview),
                Commands::Resolve {
                    local,
                    remote,
                    accept,
                    resolutions,
                    interactive,
                    dry_run,
                } => cmd_resolve(
                    &config,
                    &local,
                    &remote,
                    ResolutionSource::pick(accept, resolutions, interactive)?,
                    dry_run,
                ),
                Commands::Diff { local, remote, all } => cmd_diff(&config, &local, &remote, all),
                Commands::Init { .. } | Commands::Validate => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn config_path(explicit: &Option<PathBuf>) -> PathBuf {
    explicit.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bibsync")
            .join("config.toml")
    })
}

/// Load the configuration, falling back to defaults when no file was given
/// and the default location has none. Command-line overrides win.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = config_path(&cli.config);
    let mut config = if cli.config.is_some() || path.exists() {
        AppConfig::load_from_file(&path).context("failed to load configuration file")?
    } else {
        AppConfig::default()
    };

    if let Some(repo) = &cli.repo {
        config.repository.path = repo.clone();
    }
    if let Some(library) = &cli.library {
        config.repository.library = library.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_service(config: &AppConfig) -> Result<GitSyncService> {
    GitSyncService::from_config(config).with_context(|| {
        format!(
            "failed to open repository at {}",
            config.repository.path.display()
        )
    })
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_merge(
    config: &AppConfig,
    local: &str,
    remote: &str,
    commit: bool,
    json: bool,
    preview: bool,
) -> Result<()> {
    let service = open_service(config)?;
    tracing::info!(local, remote, library = service.library(), "merging");

    if !commit {
        let prepared = service.prepare(local, remote).context("merge failed")?;
        print_result(&prepared.result, json)?;
        if preview {
            let old = service
                .read_library(&prepared.local)
                .context("failed to read local library")?;
            let new = service.render(&prepared.result.merged);
            println!(
                "{}",
                report::preview(&String::from_utf8_lossy(&old), &String::from_utf8_lossy(&new))
            );
        }
        if prepared.result.has_conflicts() && !json {
            println!();
            println!(
                "{}",
                style::warn(&format!(
                    "{} conflict(s). Run `bibsync resolve {} {}` to finish the merge.",
                    prepared.result.conflicts.len(),
                    local,
                    remote
                ))
            );
        }
        return Ok(());
    }

    match service.merge(local, remote).context("merge failed")? {
        SyncOutcome::UpToDate { commit } => {
            println!(
                "{}",
                style::success(&format!("Already up to date ({})", short_sha(&commit)))
            );
        }
        SyncOutcome::Merged { commit, result } => {
            print_result(&result, json)?;
            println!(
                "{}",
                style::success(&format!("Merge committed: {}", short_sha(&commit)))
            );
        }
        SyncOutcome::NeedsResolution(prepared) => {
            print_result(&prepared.result, json)?;
            anyhow::bail!(
                "{} conflict(s) must be resolved; run `bibsync resolve {} {}`",
                prepared.result.conflicts.len(),
                local,
                remote
            );
        }
    }
    Ok(())
}

/// Where resolutions come from.
enum ResolutionSource {
    Strategy(Strategy),
    File(PathBuf),
    Interactive,
}

impl ResolutionSource {
    fn pick(
        accept: Option<Strategy>,
        resolutions: Option<PathBuf>,
        interactive: bool,
    ) -> Result<Self> {
        match (accept, resolutions, interactive) {
            (Some(strategy), None, false) => Ok(Self::Strategy(strategy)),
            (None, Some(path), false) => Ok(Self::File(path)),
            (None, None, true) => Ok(Self::Interactive),
            _ => anyhow::bail!("pass exactly one of --accept, --resolutions or --interactive"),
        }
    }

    fn resolve(&self, result: &MergeResult) -> Result<ResolutionMap> {
        match self {
            Self::Strategy(strategy) => Ok(ResolutionApplier::resolve_all(result, *strategy)),
            Self::File(path) => read_resolutions(path),
            Self::Interactive => interactive::prompt_resolutions(result),
        }
    }
}

fn read_resolutions(path: &Path) -> Result<ResolutionMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let map: ResolutionMap = serde_json::from_str(&text)
        .map_err(|e| ResolutionError::InvalidMap(e.to_string()))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(map)
}

fn cmd_resolve(
    config: &AppConfig,
    local: &str,
    remote: &str,
    source: ResolutionSource,
    dry_run: bool,
) -> Result<()> {
    let service = open_service(config)?;
    let mut prepared = service.prepare(local, remote).context("merge failed")?;

    report::print_conflicts(&prepared.result.conflicts);
    let map = source.resolve(&prepared.result)?;
    tracing::debug!(resolutions = map.len(), "resolutions collected");

    if dry_run {
        let snapshot = prepared
            .apply(&map)
            .context("failed to apply resolutions")?;
        print!("{}", String::from_utf8_lossy(&service.render(&snapshot)));
        return Ok(());
    }

    let commit = service
        .finalize(prepared, &map)
        .context("failed to finalize merge")?;
    println!(
        "{}",
        style::success(&format!("Merge committed: {}", short_sha(&commit)))
    );
    Ok(())
}

fn cmd_diff(config: &AppConfig, local: &str, remote: &str, all: bool) -> Result<()> {
    let service = open_service(config)?;
    let prepared = service.prepare(local, remote).context("diff failed")?;
    let triple = prepared
        .triple()
        .context("no revisions were loaded")?;

    println!(
        "{}",
        style::dim(&format!(
            "{}  base {}  local {}  remote {}",
            service.library(),
            short_sha(&prepared.base),
            short_sha(&prepared.local),
            short_sha(&prepared.remote)
        ))
    );
    report::print_deltas(&ThreeWaySetDiff::diff(triple), all);
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    let body = AppConfig::default()
        .to_toml()
        .context("failed to render default configuration")?;
    let content = format!("# bibsync configuration\n\n{}", body);
    std::fs::write(output, content).context("failed to write config file")?;
    tracing::debug!(path = %output.display(), "wrote default configuration");

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Set [repository] path and library for your bibliography");
    println!("  2. Set the [author] used for merge commits");
    println!(
        "  3. Validate with: bibsync validate --config {}",
        output.display()
    );
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Repository : {}", config.repository.path.display());
    println!("  Library    : {}", config.repository.library);
    println!(
        "  Author     : {} <{}>",
        config.author.name, config.author.email
    );
    println!("  Indent     : {:?}", config.codec.indent);
    println!("  Log level  : {}", config.general.log_level);
    println!();
    println!("Configuration is valid.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_result(result: &MergeResult, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(result).context("failed to encode result")?;
        println!("{}", text);
        return Ok(());
    }
    report::print_summary(result);
    report::print_applied(&result.applied);
    report::print_conflicts(&result.conflicts);
    Ok(())
}

fn short_sha(sha: &str) -> &str {
    &sha[..sha.len().min(10)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_merge() {
        let cli = Cli::try_parse_from(["bibsync", "merge", "main", "topic", "--commit"]).unwrap();
        match cli.command {
            Commands::Merge {
                local,
                remote,
                commit,
                json,
                ..
            } => {
                assert_eq!(local, "main");
                assert_eq!(remote, "topic");
                assert!(commit);
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_accept_strategy() {
        let cli =
            Cli::try_parse_from(["bibsync", "resolve", "main", "topic", "--accept", "remote"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Resolve {
                accept: Some(Strategy::AcceptRemote),
                ..
            }
        ));
        assert!(Cli::try_parse_from([
            "bibsync",
            "resolve",
            "main",
            "topic",
            "--accept",
            "remote",
            "--interactive"
        ])
        .is_err());
    }

    #[test]
    fn test_resolution_source_requires_one_choice() {
        assert!(ResolutionSource::pick(None, None, false).is_err());
        assert!(matches!(
            ResolutionSource::pick(None, None, true),
            Ok(ResolutionSource::Interactive)
        ));
    }

    #[test]
    fn test_read_resolutions_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolutions.json");
        std::fs::write(
            &path,
            r#"[{"kind": "field", "key": "a", "field": "author", "value": "author-a"},
                {"kind": "record", "key": "b", "keep": false}]"#,
        )
        .unwrap();
        let map = read_resolutions(&path).unwrap();
        assert_eq!(map.field("a", "author"), Some(Some("author-a")));
        assert_eq!(map.record("b"), Some(false));

        std::fs::write(&path, "{not json").unwrap();
        assert!(read_resolutions(&path).is_err());
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456789");
        assert_eq!(short_sha("abc"), "abc");
    }
}
