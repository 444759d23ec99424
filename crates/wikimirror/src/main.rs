use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wikimirror_core::MirrorError;
use wikimirror_core::auth::authenticate;
use wikimirror_core::client::MediaWikiClient;
use wikimirror_core::config::{
    DEFAULT_CONFIG_FILENAME, MirrorSettings, SettingOverrides, load_config, resolve_settings,
};
use wikimirror_core::error::MissingSetting;
use wikimirror_core::namespaces::list_namespaces;
use wikimirror_core::pipeline::{MirrorReport, mirror};
use wikimirror_core::vcs::{PUSH_REMOTE_HINT, VcsOutcome};

#[derive(Debug, Parser)]
#[command(
    name = "wikimirror",
    version,
    about = "Mirror the pages of a MediaWiki site into plain .mediawiki files"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (default: wikimirror.toml)")]
    config: Option<PathBuf>,
    #[arg(long, short, global = true, help = "Only log warnings and errors")]
    quiet: bool,
    #[arg(long, global = true, help = "Print resolved settings (password redacted)")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export every page to the output directory
    Export(ExportArgs),
    /// List the namespaces that can be exported
    Namespaces(NamespacesArgs),
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long, value_name = "DIR", help = "Output directory (default: pages)")]
    output_dir: Option<PathBuf>,
    #[arg(long, help = "Export each namespace into its own subdirectory")]
    all_namespaces: bool,
    #[arg(long, help = "Commit and push the output directory after export")]
    git: bool,
    #[arg(long, value_name = "MSG", help = "Commit message for --git")]
    git_message: Option<String>,
    #[arg(long, help = "Ask for missing connection settings on stdin")]
    prompt: bool,
    #[arg(long, help = "Print the run report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct NamespacesArgs {
    #[arg(long, help = "Ask for missing connection settings on stdin")]
    prompt: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.quiet);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));

    match cli.command {
        Commands::Export(args) => run_export(&config_path, cli.diagnostics, args),
        Commands::Namespaces(args) => run_namespaces(&config_path, cli.diagnostics, args),
    }
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run_export(config_path: &Path, diagnostics: bool, args: ExportArgs) -> Result<()> {
    let overrides = SettingOverrides {
        output_dir: args.output_dir,
        all_namespaces: args.all_namespaces,
        git: args.git,
        git_message: args.git_message,
        ..SettingOverrides::default()
    };
    let settings = resolve_runtime_settings(config_path, overrides, args.prompt)?;
    if diagnostics {
        println!("[diagnostics]\n{}\n", settings.diagnostics());
    }

    let report = mirror(&settings).map_err(with_remediation)?;
    if !report.total.failures.is_empty() {
        warn!(
            failed = report.total.failures.len(),
            "some pages could not be exported; see the failures list"
        );
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&settings, &report);
    }
    Ok(())
}

fn run_namespaces(config_path: &Path, diagnostics: bool, args: NamespacesArgs) -> Result<()> {
    let settings =
        resolve_runtime_settings(config_path, SettingOverrides::default(), args.prompt)?;
    if diagnostics {
        println!("[diagnostics]\n{}\n", settings.diagnostics());
    }

    let client = MediaWikiClient::new(&settings.api_url, settings.http.clone())
        .map_err(with_remediation)?;
    let session = authenticate(client, &settings.credentials).map_err(with_remediation)?;
    let namespaces = list_namespaces(session.transport())?;
    println!("namespaces: {}", namespaces.len());
    for namespace in namespaces {
        println!("  [{}] {}", namespace.id, namespace.display_name);
    }
    Ok(())
}

/// Resolve settings; with `prompt`, ask for whatever is missing once and
/// resolve again.
fn resolve_runtime_settings(
    config_path: &Path,
    mut overrides: SettingOverrides,
    prompt: bool,
) -> Result<MirrorSettings> {
    let config = load_config(config_path).map_err(with_remediation)?;
    match resolve_settings(&config, &overrides) {
        Err(MirrorError::Config { missing }) if prompt => {
            for setting in &missing {
                let value = Some(prompt_line(setting)?);
                if *setting == MissingSetting::API_URL {
                    overrides.api_url = value;
                } else if *setting == MissingSetting::USERNAME {
                    overrides.username = value;
                } else if *setting == MissingSetting::PASSWORD {
                    overrides.password = value;
                }
            }
            resolve_settings(&config, &overrides).map_err(with_remediation)
        }
        other => other.map_err(with_remediation),
    }
}

/// Errors that stop a run before any page is exported are almost always
/// settings problems; point at where the settings come from.
fn with_remediation(error: MirrorError) -> anyhow::Error {
    if error.is_fatal_before_export() {
        anyhow::Error::new(error).context(
            "check WIKI_API, WIKI_USER and WIKI_PASS (environment, .env or wikimirror.toml), or rerun with --prompt",
        )
    } else {
        error.into()
    }
}

fn prompt_line(setting: &MissingSetting) -> Result<String> {
    print!("{}: ", setting.description);
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_report(settings: &MirrorSettings, report: &MirrorReport) {
    println!("export complete");
    println!("output_dir: {}", normalize_path(&settings.output_dir));
    for entry in &report.namespaces {
        println!(
            "namespace [{}] {}: written={} skipped={} failed={}",
            entry.namespace.id,
            entry.namespace.display_name,
            entry.summary.written,
            entry.summary.skipped,
            entry.summary.failures.len()
        );
    }
    println!("written: {}", report.total.written);
    println!("unchanged: {}", report.total.unchanged);
    println!("skipped: {}", report.total.skipped);
    println!("failed: {}", report.total.failures.len());
    println!("requests: {}", report.request_count);

    if !report.total.failures.is_empty() {
        println!("failures:");
        for failure in &report.total.failures {
            println!("  - {}: {}", failure.title, failure.message);
        }
    }
    if !report.total.collisions.is_empty() {
        println!("collisions:");
        for collision in &report.total.collisions {
            println!(
                "  - {} (taken by {}) -> {}",
                collision.title,
                collision.claimed_by,
                normalize_path(&collision.written_to)
            );
        }
    }

    if let Some(vcs) = &report.vcs {
        let status = match &vcs.outcome {
            VcsOutcome::NoChanges => "no changes".to_string(),
            VcsOutcome::Pushed => "committed and pushed".to_string(),
            VcsOutcome::PushFailed { .. } => {
                format!("committed locally, push failed; {PUSH_REMOTE_HINT}")
            }
            VcsOutcome::Failed { step, message } => format!("git {step} failed: {message}"),
        };
        println!("git: {status}");
    }

    if report.namespace_mode() {
        println!(
            "note: special pages are generated dynamically by the wiki and cannot be exported"
        );
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
