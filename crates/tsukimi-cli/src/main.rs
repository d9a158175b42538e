mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tsukimi_api::mapping::MappingClient;
use tsukimi_api::sync::{HttpProgressClient, SyncError};
use tsukimi_core::catalog::SourceCatalog;
use tsukimi_core::config::AppConfig;
use tsukimi_core::error::TsukimiError;
use tsukimi_core::kv::FileKvStore;
use tsukimi_core::models::{Identity, MediaInfo, ProgressEntry, TitleKind, TitleRef};
use tsukimi_core::resolve::StreamResolution;
use tsukimi_runtime::{Runtime, RuntimeError, StreamRequest};

use cli::{Cli, Command, EpisodesArgs, ProgressCommand, ResolveArgs};

type App = Runtime<FileKvStore, HttpProgressClient, MappingClient>;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] TsukimiError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tsukimi=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::load()?;
    let catalog = load_catalog()?;
    let kv = FileKvStore::new(AppConfig::data_dir());
    let mapping = MappingClient::new(&config.mapping);

    let identity = match (cli.user, cli.token) {
        (Some(user_id), Some(token)) => Some(Identity { user_id, token }),
        _ => None,
    };
    let remote = match (&identity, &config.sync.endpoint) {
        (Some(_), Some(endpoint)) => Some(Arc::new(HttpProgressClient::new(endpoint)?)),
        (Some(_), None) => {
            tracing::warn!("No sync.endpoint configured, progress stays local");
            None
        }
        _ => None,
    };

    let app: App = Runtime::new(config, catalog, kv, remote, mapping);
    if let Some(identity) = identity {
        if let Err(e) = app.sign_in(identity).await {
            tracing::warn!("Remote progress unavailable: {e}");
        }
    }

    let result = dispatch(&app, cli.command).await;
    app.shutdown().await;
    result
}

async fn dispatch(app: &App, command: Command) -> Result<(), CliError> {
    match command {
        Command::Progress(cmd) => progress(app, cmd),
        Command::Resolve(args) => resolve(app, args).await,
        Command::Episodes(args) => episodes(app, args).await,
        Command::Sources => {
            for source in app.catalog().sources() {
                let languages: Vec<&str> = source
                    .available_languages()
                    .iter()
                    .map(|l| l.as_str())
                    .collect();
                println!("{:<12} {}", source.id, languages.join(", "));
            }
            Ok(())
        }
    }
}

fn progress(app: &App, cmd: ProgressCommand) -> Result<(), CliError> {
    match cmd {
        ProgressCommand::List { limit } => {
            let entries = app.continue_watching(limit);
            if entries.is_empty() {
                println!("Nothing in progress.");
            }
            for entry in &entries {
                print_entry(entry);
            }
            if app.store().is_degraded() {
                tracing::warn!("Progress storage is unavailable, changes will not persist");
            }
        }
        ProgressCommand::Record {
            id,
            episode,
            title,
            kind,
        } => {
            if episode == 0 {
                return Err(CliError::Usage("episodes start at 1".into()));
            }
            match app.record_episode(&title_ref(id, title, kind), episode) {
                Some(entry) => print_entry(&entry),
                None => println!("{id}: episode {episode} already recorded"),
            }
        }
        ProgressCommand::Access { id, title, kind } => {
            print_entry(&app.record_access(&title_ref(id, title, kind)));
        }
        ProgressCommand::Remove { id } => {
            if app.remove(id) {
                println!("{id}: removed");
            } else {
                println!("{id}: not in local progress");
            }
        }
    }
    Ok(())
}

async fn resolve(app: &App, args: ResolveArgs) -> Result<(), CliError> {
    let player = &app.config().player;
    let source_id = args.source.unwrap_or_else(|| player.default_source.clone());
    let wanted = args.language.unwrap_or(player.default_language);
    let language = app.catalog().fallback_language(&source_id, wanted);
    if language != wanted {
        tracing::info!(source = %source_id, "{wanted} unavailable, using {language}");
    }

    let request = StreamRequest {
        title_id: args.id,
        external_id: args.external_id,
        episode: args.episode,
        source_id,
        language,
    };
    match app.resolve_stream(&request).await? {
        Some(StreamResolution::Ready(url)) => println!("{url}"),
        Some(StreamResolution::Pending) => println!("pending: metadata still loading"),
        Some(StreamResolution::Unavailable) => {
            return Err(CliError::Usage(format!(
                "episode {} of {} is not available from {}",
                request.episode, request.title_id, request.source_id
            )))
        }
        Some(StreamResolution::Failed(reason)) => {
            return Err(CliError::Usage(format!("resolution failed: {reason}")))
        }
        None => {}
    }
    Ok(())
}

async fn episodes(app: &App, args: EpisodesArgs) -> Result<(), CliError> {
    let media = MediaInfo {
        id: args.id,
        status: args.status,
        total_episodes: args.total,
        released_episodes: args.released,
        next_airing_episode: args.next_airing,
    };
    let pages = app.episode_pages(&media);
    if pages.len() > 1 {
        let labels: Vec<String> = pages
            .iter()
            .map(|r| format!("{}-{}", r.start(), r.end()))
            .collect();
        println!("pages: {}", labels.join(" | "));
    }

    if args.offline {
        for page in pages {
            for number in page {
                println!("{number:>4}");
            }
        }
        return Ok(());
    }
    for meta in app.episodes(&media).await {
        let title = meta.title.as_deref().unwrap_or("");
        let filler = if meta.filler { " [filler]" } else { "" };
        println!("{:>4}  {title}{filler}", meta.number);
    }
    Ok(())
}

fn title_ref(id: u64, title: String, kind: Option<TitleKind>) -> TitleRef {
    let title = TitleRef::new(id, title);
    match kind {
        Some(kind) => title.with_kind(kind),
        None => title,
    }
}

fn print_entry(entry: &ProgressEntry) {
    let accessed = entry
        .last_accessed
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    let title = if entry.title.is_empty() {
        entry.id.to_string()
    } else {
        entry.title.clone()
    };
    println!(
        "{:>8}  ep {:>4}  {accessed}  {title}",
        entry.id, entry.last_episode_watched
    );
}

/// Embedded catalog, overlaid with `sources.toml` next to the user config.
fn load_catalog() -> Result<SourceCatalog, TsukimiError> {
    let mut catalog = SourceCatalog::embedded();
    let Some(dir) = AppConfig::config_path().parent().map(|p| p.to_path_buf()) else {
        return Ok(catalog);
    };
    let user_path = dir.join("sources.toml");
    if user_path.exists() {
        let user_str = std::fs::read_to_string(&user_path)?;
        catalog.merge_user(&SourceCatalog::from_toml(&user_str)?);
        tracing::debug!(path = %user_path.display(), "Merged user source catalog");
    }
    Ok(catalog)
}
