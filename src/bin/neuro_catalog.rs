use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use neuro_catalog::app::{App, ProgressSink};
use neuro_catalog::config::ConfigLoader;
use neuro_catalog::domain::Source;
use neuro_catalog::downloader::{FetchMode, downloaders_for};
use neuro_catalog::error::CatalogError;
use neuro_catalog::marqo::MarqoHttpClient;
use neuro_catalog::output::{JsonOutput, OutputMode, StderrProgress, TextOutput};
use neuro_catalog::search::SearchFilters;

const BYTES_PER_GB: f64 = 1_000_000_000.0;

#[derive(Parser)]
#[command(name = "neuro-catalog")]
#[command(about = "Harvest, index and search neuroscience dataset metadata")]
#[command(version, author)]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download source catalogs into the local cache")]
    Fetch(FetchArgs),
    #[command(about = "Rebuild the search index from the local cache")]
    Index(IndexArgs),
    #[command(about = "Search the index")]
    Search(SearchArgs),
    #[command(about = "List available filter values")]
    Filters(FiltersArgs),
    #[command(about = "Show index statistics")]
    Stats,
}

#[derive(Args)]
struct FetchArgs {
    /// Sources to fetch; defaults to the configured list.
    #[arg(long = "source", value_enum)]
    sources: Vec<Source>,

    /// Keep the existing cache and append only unseen datasets.
    #[arg(long)]
    incremental: bool,
}

#[derive(Args)]
struct IndexArgs {
    /// Documents per upload call; 1 isolates failures per document.
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Args)]
struct SearchArgs {
    query: Option<String>,

    #[arg(long)]
    modality: Option<String>,

    #[arg(long)]
    species: Option<String>,

    #[arg(long)]
    task: Option<String>,

    /// Minimum size in GB; 0 means no bound.
    #[arg(long, default_value_t = 0.0)]
    min_size_gb: f64,

    /// Maximum size in GB; 0 means no bound.
    #[arg(long, default_value_t = 0.0)]
    max_size_gb: f64,

    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Args)]
struct FiltersArgs {
    /// Derive options from the results of this query instead of scanning the index.
    #[arg(long)]
    from_query: Option<String>,

    #[arg(long, default_value_t = 10)]
    limit: usize,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_)
        | CatalogError::InvalidConfig(_)
        | CatalogError::UnknownSource(_) => 2,
        error if error.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Commands::Index(IndexArgs {
        batch_size: Some(batch_size),
    }) = &cli.command
    {
        if *batch_size == 0 {
            return Err(
                CatalogError::InvalidConfig("--batch-size must be at least 1".to_string()).into(),
            );
        }
        config.batch_size = *batch_size;
    }

    let backend = MarqoHttpClient::new(&config.search_url)?;
    let app = App::new(config, backend);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &StderrProgress,
    };

    match cli.command {
        Commands::Fetch(args) => {
            let sources = if args.sources.is_empty() {
                app.config().sources.clone()
            } else {
                args.sources
            };
            let mode = if args.incremental {
                FetchMode::Incremental
            } else {
                FetchMode::Full
            };
            let downloaders = downloaders_for(&sources, app.config())?;
            let result = app.fetch(&downloaders, mode, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_fetch(&result),
            }
        }
        Commands::Index(_) => {
            let result = app.build_index(sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_index(&result),
            }
        }
        Commands::Search(args) => {
            let filters = SearchFilters {
                modality: args.modality,
                species: args.species,
                task: args.task,
                min_size: gigabytes_to_bytes(args.min_size_gb),
                max_size: gigabytes_to_bytes(args.max_size_gb),
            };
            let result = app.search(args.query.as_deref().unwrap_or(""), &filters, args.limit)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_search(&result),
            }
        }
        Commands::Filters(args) => {
            let options = app.filter_options(args.from_query.as_deref(), args.limit)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&options).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_options(&options),
            }
        }
        Commands::Stats => {
            let result = app.stats()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_stats(&result),
            }
        }
    }
    Ok(())
}

fn gigabytes_to_bytes(value: f64) -> Option<u64> {
    (value.is_finite() && value > 0.0).then(|| (value * BYTES_PER_GB) as u64)
}
