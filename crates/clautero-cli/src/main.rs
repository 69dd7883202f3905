use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use clautero_core::config_file;
use clautero_core::library::ZoteroClient;
use clautero_core::summarize::summarizer_from_config;
use clautero_core::{Config, ConfigFile, Workflow};
use clautero_pdf_mupdf::MupdfBackend;

mod output;

use output::ColorMode;

/// Summarize papers tagged in a Zotero library with Claude
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Read configuration from this file only, skipping the cascade
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize up to 50 items tagged TODO
    Summarize,

    /// Tag items carrying no workflow tag with TODO
    Backfill,

    /// Backfill tags, then run one summarization pass
    Run,

    /// Run the workflow on a single item
    Process {
        /// Zotero item key
        item_key: String,
    },

    /// Print the config file location and the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let color = ColorMode(!cli.no_color);

    let file = load(cli.config.as_deref())?;
    let mut out = std::io::stdout();

    match cli.command {
        Command::Config => {
            // Resolution errors are printed, not returned: this is where
            // missing credentials get diagnosed.
            let resolved = Config::from_file(file.clone());
            output::print_config(&mut out, cli.config.as_deref(), &file, &resolved, color)?;
        }
        Command::Summarize => {
            let workflow = start(file)?;
            let report = workflow.run_summarization_pass().await?;
            output::print_pass_report(&mut out, &report, color)?;
        }
        Command::Backfill => {
            let workflow = start(file)?;
            let report = workflow.run_tag_backfill().await?;
            output::print_backfill_report(&mut out, &report, color)?;
        }
        Command::Run => {
            let workflow = start(file)?;
            let backfill = workflow.run_tag_backfill().await?;
            output::print_backfill_report(&mut out, &backfill, color)?;
            let report = workflow.run_summarization_pass().await?;
            output::print_pass_report(&mut out, &report, color)?;
        }
        Command::Process { item_key } => {
            let workflow = start(file)?;
            let outcome = workflow.process_key(&item_key).await?;
            output::print_outcome(&mut out, &item_key, &outcome, color)?;
        }
    }

    Ok(())
}

/// Read configuration: explicit file or platform/CWD cascade, then
/// environment overrides.
fn load(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let file = match explicit {
        Some(path) => config_file::load_from_path(path)?
            .with_context(|| format!("config file {} does not exist", path.display()))?,
        None => config_file::load_config()?,
    };
    Ok(config_file::apply_env(file)?)
}

/// Validate the config, install logging and wire the workflow against the
/// live services.
fn start(file: ConfigFile) -> anyhow::Result<Workflow> {
    let config = Config::from_file(file)?;
    clautero_core::logging::init(&config.log_path, &config.log_level)
        .with_context(|| format!("cannot open log file {}", config.log_path.display()))?;

    let library = ZoteroClient::new(
        &config.zotero_base_url,
        config.zotero_user_id,
        &config.zotero_api_key,
    )?;
    let summarizer = summarizer_from_config(&config)?;
    tracing::info!(backend = summarizer.name(), model = %config.model_name, "summarizer ready");

    Ok(Workflow::from_config(
        &config,
        Arc::new(library),
        summarizer,
        Arc::new(MupdfBackend::new()),
    ))
}
