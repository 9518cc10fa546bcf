use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use arxiv_shelf::app::{App, DownloadRequest, ProgressSink};
use arxiv_shelf::bookmarks::ShioriHttpClient;
use arxiv_shelf::catalog::ArxivHttpClient;
use arxiv_shelf::config::{ConfigLoader, Overrides, ResolvedConfig};
use arxiv_shelf::error::ShelfError;
use arxiv_shelf::importers;
use arxiv_shelf::output::{self, JsonOutput, LogSink, OutputMode};
use arxiv_shelf::reconcile::ReconcilePolicy;
use arxiv_shelf::store::PreprintStore;
use arxiv_shelf::transfer::HttpTransport;

/// Exit status of a download run that completed with failed transfers.
const EXIT_TRANSFER_FAILURES: u8 = 4;

#[derive(Parser)]
#[command(name = "arxiv-shelf")]
#[command(about = "Keep a local arXiv preprint library in sync with arXiv, Shiori and a PDF folder")]
#[command(version)]
struct Cli {
    /// Store file (must end in .json)
    #[arg(long, global = true)]
    store: Option<Utf8PathBuf>,

    /// Configuration file (default: ./arxiv-shelf.json if present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Number of ids per arXiv request
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Add papers by id or arXiv link")]
    Add { ids: Vec<String> },
    #[command(about = "Re-fetch metadata for every stored paper")]
    Update,
    #[command(about = "Download artifacts for stored papers")]
    Download(DownloadArgs),
    #[command(about = "Add ids listed in a text file")]
    FromFile {
        #[arg(long)]
        file: Utf8PathBuf,
        #[arg(long, default_value = ",")]
        sep: String,
    },
    #[command(about = "Add papers from a Pocket CSV export")]
    FromPocket {
        #[arg(long)]
        file: Utf8PathBuf,
    },
    #[command(about = "Add papers listed in an old pickled database")]
    FromOldDb {
        #[arg(long)]
        file: Utf8PathBuf,
    },
    #[command(about = "Add arXiv papers bookmarked on a Shiori server")]
    DumpFromBookmarks(BookmarkArgs),
    #[command(about = "Create a Shiori bookmark for every stored paper")]
    UploadToBookmarks(BookmarkArgs),
    #[command(about = "Show store summary")]
    Info,
}

#[derive(Args)]
struct DownloadArgs {
    /// Target directory (default: download_dir from the config)
    #[arg(long)]
    save_path: Option<Utf8PathBuf>,

    /// Only these papers; they are added to the store first
    #[arg(long = "article")]
    articles: Vec<String>,

    /// Recognize pre-canonical file names by title and replace older versions
    #[arg(long)]
    legacy_fuzzy: bool,

    /// Do not look at existing files; download everything
    #[arg(long)]
    no_check: bool,
}

#[derive(Args)]
struct BookmarkArgs {
    #[arg(long)]
    address: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long, env = "ARXIV_SHELF_BOOKMARKS_PASSWORD", hide_env_values = true)]
    password: String,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(shelf) = report.downcast_ref::<ShelfError>() {
                return ExitCode::from(map_exit_code(shelf));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &ShelfError) -> u8 {
    match error {
        ShelfError::InvalidIdentity { .. }
        | ShelfError::StoreLoad { .. }
        | ShelfError::StoreFormat(_)
        | ShelfError::ConfigRead(_)
        | ShelfError::ConfigParse(_)
        | ShelfError::InvalidConfig(_)
        | ShelfError::Import { .. } => 2,
        ShelfError::CatalogHttp(_)
        | ShelfError::CatalogStatus { .. }
        | ShelfError::CatalogParse(_)
        | ShelfError::BookmarkHttp(_)
        | ShelfError::BookmarkStatus { .. }
        | ShelfError::BookmarkAuth(_) => 3,
        _ => 1,
    }
}

fn init_logging(verbose: bool) {
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> miette::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let sink: &dyn ProgressSink = match mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogSink,
    };

    let overrides = Overrides {
        store_path: cli.store,
        batch_size: cli.batch_size,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    let store = PreprintStore::load(config.store_path.clone())?;
    tracing::debug!("loaded {} records from {}", store.len(), store.path());

    let catalog = ArxivHttpClient::new(config.request_timeout, config.max_retries)?;
    let transport = HttpTransport::new(config.request_timeout, config.max_retries)?;
    let mut app = App::new(store, catalog, transport, config.batch_size);

    match cli.command {
        Commands::Add { ids } => {
            let result = app.ingest(&ids, sink)?;
            report(mode, &result, JsonOutput::print_ingest, output::print_ingest_summary)?;
        }
        Commands::Update => {
            let result = app.update(sink)?;
            report(mode, &result, JsonOutput::print_ingest, output::print_ingest_summary)?;
        }
        Commands::FromFile { file, sep } => {
            let ids = importers::read_separated(&file, &sep)?;
            let result = app.ingest(&ids, sink)?;
            report(mode, &result, JsonOutput::print_ingest, output::print_ingest_summary)?;
        }
        Commands::FromPocket { file } => {
            let urls = importers::read_pocket_csv(&file)?;
            let result = app.ingest_links(&urls, sink)?;
            report(mode, &result, JsonOutput::print_ingest, output::print_ingest_summary)?;
        }
        Commands::FromOldDb { file } => {
            let ids = importers::read_legacy_pickle(&file)?;
            let result = app.ingest(&ids, sink)?;
            report(mode, &result, JsonOutput::print_ingest, output::print_ingest_summary)?;
        }
        Commands::DumpFromBookmarks(args) => {
            let bookmarks = connect_bookmarks(&args, &config)?;
            let result = app.sync_bookmarks(&bookmarks, sink)?;
            report(mode, &result, JsonOutput::print_sync, output::print_sync_summary)?;
        }
        Commands::UploadToBookmarks(args) => {
            let bookmarks = connect_bookmarks(&args, &config)?;
            let result = app.upload_bookmarks(&bookmarks, sink);
            report(mode, &result, JsonOutput::print_upload, output::print_upload_summary)?;
        }
        Commands::Download(args) => {
            let directory = args
                .save_path
                .or_else(|| config.download_dir.clone())
                .ok_or_else(|| {
                    ShelfError::InvalidConfig(
                        "no download directory: pass --save-path or set download_dir".to_string(),
                    )
                })?;
            let policy = if args.legacy_fuzzy {
                ReconcilePolicy::LegacyFuzzy {
                    threshold: config.legacy_title_threshold,
                }
            } else {
                ReconcilePolicy::Strict
            };
            let request = DownloadRequest {
                directory,
                articles: (!args.articles.is_empty()).then_some(args.articles),
                policy,
                check_existing: !args.no_check,
                extension: config.artifact_extension.clone(),
            };
            let result = app.download(request, sink)?;
            report(
                mode,
                &result,
                JsonOutput::print_download,
                output::print_download_summary,
            )?;
            if !result.failed.is_empty() {
                return Ok(ExitCode::from(EXIT_TRANSFER_FAILURES));
            }
        }
        Commands::Info => {
            let result = app.info();
            report(mode, &result, JsonOutput::print_info, output::print_info_summary)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report<T>(
    mode: OutputMode,
    result: &T,
    json: fn(&T) -> std::io::Result<()>,
    human: fn(&T),
) -> miette::Result<()> {
    match mode {
        OutputMode::Json => json(result).into_diagnostic(),
        OutputMode::Human => {
            human(result);
            Ok(())
        }
    }
}

fn connect_bookmarks(
    args: &BookmarkArgs,
    config: &ResolvedConfig,
) -> miette::Result<ShioriHttpClient> {
    let address = args
        .address
        .clone()
        .or_else(|| config.bookmarks.address.clone())
        .ok_or_else(|| ShelfError::InvalidConfig("bookmark server address is not set".to_string()))?;
    let user = args
        .user
        .clone()
        .or_else(|| config.bookmarks.user.clone())
        .ok_or_else(|| ShelfError::InvalidConfig("bookmark user is not set".to_string()))?;
    Ok(ShioriHttpClient::login(
        &address,
        &user,
        &args.password,
        config.request_timeout,
    )?)
}
