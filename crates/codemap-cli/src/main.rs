use anyhow::{bail, Context};
use clap::Parser;
use codemap_core::{
    ensure_up_to_date, generate, is_stale, CancellationToken, CliOverrides, Codemap, FileCacheStore,
    Options, CONFIG_FILE_NAME,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Codemap - an incrementally updated index of a source tree
#[derive(Parser, Debug, Clone)]
#[command(name = "codemap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root to index
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Path to codemap.yaml (default: <root>/codemap.yaml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Markdown output, relative to the root
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Paths output, relative to the root
    #[arg(long, value_name = "FILE")]
    paths_output: Option<String>,

    /// Units with at least this many files get per-file detail
    #[arg(long, value_name = "N")]
    large: Option<usize>,

    /// Include test files in the analysis
    #[arg(long)]
    tests: bool,

    /// Do not write the paths output
    #[arg(long)]
    no_paths: bool,

    /// Only report staleness: exit 1 when stale, 0 when up to date
    #[arg(long, conflicts_with_all = ["force", "json", "init"])]
    check: bool,

    /// Regenerate even when the outputs are up to date
    #[arg(long)]
    force: bool,

    /// Print the index as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Write a default codemap.yaml and exit
    #[arg(long)]
    init: bool,

    /// Verbose logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG overrides the default level
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    if cli.check {
        return match check(&cli) {
            Ok(true) => {
                println!("stale");
                ExitCode::from(1)
            }
            Ok(false) => {
                println!("up to date");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(2)
            }
        };
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn check(cli: &Cli) -> anyhow::Result<bool> {
    let options = load_options(cli)?;
    let store = FileCacheStore::new();
    let stale = is_stale(&options, &store, &CancellationToken::new())
        .context("Failed to check staleness")?;
    Ok(stale)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.init {
        return init_config(cli);
    }

    let options = load_options(cli)?;
    let store = FileCacheStore::new();
    let cancel = CancellationToken::new();

    // JSON output needs the model even when nothing changed
    let codemap = if cli.force || cli.json {
        Some(generate(&options, &store, &cancel).context("Failed to generate codemap")?)
    } else {
        ensure_up_to_date(&options, &store, &cancel).context("Failed to update codemap")?
    };
    store.flush().context("Failed to flush cache files")?;

    match codemap {
        Some(codemap) if cli.json => print_json(&codemap)?,
        Some(codemap) => {
            info!("Content hash {}", codemap.content_hash);
            println!(
                "Updated {} ({} packages)",
                options.output_path,
                codemap.packages.len()
            );
        }
        None => println!("{} is up to date", options.output_path),
    }
    Ok(())
}

fn print_json(codemap: &Codemap) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(codemap).context("Failed to serialize codemap")?;
    println!("{}", json);
    Ok(())
}

fn init_config(cli: &Cli) -> anyhow::Result<()> {
    let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));
    let path = cli.config.clone().unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    Options::init_file(&path).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

/// Config file (explicit, or found in the root) with flags layered on top
fn load_options(cli: &Cli) -> anyhow::Result<Options> {
    let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));
    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => Some(root.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
    };

    let mut options = match &config_path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            Options::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?
        }
        None => Options::default(),
    };

    let overrides = CliOverrides {
        project_root: cli.root.clone().or_else(|| config_relative_root(config_path.as_deref(), &options)),
        output_path: cli.output.clone(),
        paths_output_path: cli.paths_output.clone(),
        large_package_files: cli.large,
        include_tests: cli.tests.then_some(true),
        disable_paths: cli.no_paths.then_some(true),
        ..CliOverrides::default()
    };
    options.merge(&overrides);
    Ok(options)
}

/// A relative `projectRoot` in a config file is relative to that file
fn config_relative_root(config_path: Option<&Path>, options: &Options) -> Option<PathBuf> {
    let dir = config_path?.parent()?;
    if options.project_root.is_absolute() || dir.as_os_str().is_empty() {
        return None;
    }
    Some(dir.join(&options.project_root))
}
