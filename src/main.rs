use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dramadeck::application::{
    CatalogService, CatalogUpdate, DownloadCoordinator, DownloadEvent, DownloadSettings, Lookup,
};
use dramadeck::domain::entities::{
    CatalogResponse, DownloadStatus, DramaPage, EpisodeList, LoadedImage, ParentItem, SubItem,
    TaskId,
};
use dramadeck::infrastructure::config::prepare_directories;
use dramadeck::infrastructure::http::DEFAULT_IMAGE_TIMEOUT;
use dramadeck::infrastructure::{
    AppConfig, CatalogApiClient, CliArgs, Command, HttpFetcher, HttpMediaSource, ImageLoader,
    ConfigStore, ResourceEvent, TtlCache,
};

const PUMP_INTERVAL: Duration = Duration::from_millis(200);

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let store = match &args.config {
        Some(path) => ConfigStore::at(path),
        None => ConfigStore::locate().wrap_err("cannot locate the config directory")?,
    };
    let mut config = store.load().wrap_err("failed to load configuration")?;
    config.merge_with_args(args);
    Ok(config)
}

fn catalog_client(config: &AppConfig) -> Result<Arc<CatalogApiClient>> {
    Ok(Arc::new(CatalogApiClient::with_base_url(
        config.network.api_base_url.clone(),
        config.network.metadata_timeout(),
        config.network.retry_policy(),
    )?))
}

fn catalog_service(config: &AppConfig, client: Arc<CatalogApiClient>) -> CatalogService {
    let cache = Arc::new(TtlCache::new(config.cache.max_entries, config.cache.ttl()));
    CatalogService::new(client, cache)
}

async fn resolve(service: &mut CatalogService, lookup: Lookup) -> Result<CatalogResponse> {
    match lookup {
        Lookup::Ready(response) => Ok(response),
        Lookup::Pending(_) => match service.next_update().await {
            Some(CatalogUpdate::Loaded(response)) => Ok(response),
            Some(CatalogUpdate::Failed(e)) => Err(e.into()),
            None => bail!("catalog request was dropped"),
        },
    }
}

fn print_page(page: &DramaPage) {
    if page.items.is_empty() {
        println!("No dramas on page {}.", page.page);
        return;
    }
    for item in &page.items {
        println!("{:>12}  {:>4} eps  {}", item.book_id, item.episode_count, item.title);
    }
    if page.has_more {
        println!("-- page {}, more with --page {}", page.page, page.page.saturating_add(1));
    } else {
        println!("-- page {} (last)", page.page);
    }
}

fn print_episodes(list: &EpisodeList) {
    println!("{} ({})", list.book_name, list.book_id);
    for (n, episode) in list.episodes.iter().enumerate() {
        println!("{:>4}  {:>12}  {}", n + 1, episode.video_id, episode.title);
    }
}

async fn run_catalog(config: &AppConfig, command: Command) -> Result<()> {
    let mut service = catalog_service(config, catalog_client(config)?);
    let lookup = match command {
        Command::Search { keyword, page } => service.search(keyword, page),
        Command::Category { name, page } => service.category(name, page),
        Command::Episodes { drama_id } => service.episodes(drama_id),
        _ => bail!("not a catalog command"),
    };

    match resolve(&mut service, lookup).await? {
        CatalogResponse::Search(page) | CatalogResponse::Category(page) => print_page(&page),
        CatalogResponse::Episodes(list) => print_episodes(&list),
    }
    Ok(())
}

fn print_image(image: &LoadedImage) {
    println!(
        "{}x{}  {:?}  {}",
        image.image.width(),
        image.image.height(),
        image.source,
        image.url
    );
}

async fn run_images(config: &AppConfig, urls: Vec<String>, clear_cache: bool) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(DEFAULT_IMAGE_TIMEOUT)?);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let loader = ImageLoader::open(config.images.loader_config(), fetcher, &event_tx).await?;
    if clear_cache {
        loader.clear_all().await;
    }

    let mut seen = HashSet::new();
    let mut waiting = 0usize;
    for url in urls.iter().filter(|url| seen.insert(url.as_str())) {
        match loader.load(url, None).await {
            Some(image) => print_image(&image),
            None => waiting += 1,
        }
    }

    let mut failed = 0usize;
    while waiting > 0 {
        let Some(event) = event_rx.recv().await else {
            break;
        };
        waiting -= 1;
        match event {
            ResourceEvent::Loaded { image, .. } => print_image(&image),
            ResourceEvent::Failed { url, reason } => {
                failed += 1;
                eprintln!("failed  {url}: {reason}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} image(s) failed to load");
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn report(coordinator: &DownloadCoordinator, event: &DownloadEvent) {
    let title = |id: &TaskId| {
        coordinator
            .task(id)
            .map_or_else(String::new, |t| t.item.title.clone())
    };
    match event {
        DownloadEvent::TaskAdded(_) => {}
        DownloadEvent::TaskStarted(id) => println!("start     {}", title(id)),
        DownloadEvent::TaskProgress {
            id,
            percent,
            downloaded,
            speed_bps,
            ..
        } => {
            let done = percent.map_or_else(
                || format!("{:.1} MiB", *downloaded as f64 / 1_048_576.0),
                |p| format!("{p:.1}%"),
            );
            debug!(%id, progress = %done, speed_kib = speed_bps / 1024.0, "Progress");
        }
        DownloadEvent::TaskCompleted(id) => {
            let path = coordinator
                .task(id)
                .and_then(|t| t.destination.as_ref())
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("done      {}  -> {path}", title(id));
        }
        DownloadEvent::TaskFailed { id, reason } => eprintln!("failed    {}: {reason}", title(id)),
        DownloadEvent::TaskCancelled(id) => println!("cancelled {}", title(id)),
        DownloadEvent::AllCompleted => info!("Batch finished"),
    }
}

async fn run_download(config: &AppConfig, drama_id: String, only: Vec<String>) -> Result<()> {
    let client = catalog_client(config)?;
    let mut service = catalog_service(config, client.clone());
    let lookup = service.episodes(drama_id);
    let CatalogResponse::Episodes(list) = resolve(&mut service, lookup).await? else {
        bail!("unexpected catalog response");
    };

    let items: Vec<SubItem> = list
        .episodes
        .iter()
        .filter(|e| only.is_empty() || only.contains(&e.video_id))
        .map(|e| SubItem::new(e.video_id.clone(), e.title.clone()))
        .collect();
    if items.is_empty() {
        bail!("no matching episodes for drama {}", list.book_id);
    }
    let parent = ParentItem::new(list.book_id, list.book_name);

    let media = Arc::new(HttpMediaSource::new(config.network.media_timeout())?);
    let settings = DownloadSettings::from(&config.downloads);
    println!("Downloading {} episode(s) to {}", items.len(), settings.download_dir.display());
    let (mut coordinator, mut events) = DownloadCoordinator::new(client, media, settings);
    coordinator.add_tasks(&parent, &items);
    if !coordinator.start() {
        bail!("download executor could not be started");
    }

    let mut interrupt = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        coordinator.pump();
        while let Ok(event) = events.try_recv() {
            report(&coordinator, &event);
        }
        if !coordinator.is_running() {
            break;
        }
        tokio::select! {
            _ = &mut interrupt => {
                warn!("Interrupted, cancelling downloads");
                coordinator.cancel();
            }
            () = tokio::time::sleep(PUMP_INTERVAL) => {}
        }
    }

    let tasks = coordinator.list_tasks();
    let count = |status| tasks.iter().filter(|t| t.status == status).count();
    println!(
        "{} completed, {} failed, {} cancelled, {} pending",
        count(DownloadStatus::Completed),
        count(DownloadStatus::Failed),
        count(DownloadStatus::Cancelled),
        count(DownloadStatus::Pending),
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = dramadeck::VERSION, "Starting {}", dramadeck::NAME);
    if matches!(args.command, Command::Image { .. } | Command::Download { .. }) {
        prepare_directories(&config).wrap_err("failed to create working directories")?;
    }

    match args.command {
        Command::Image { urls, clear_cache } => run_images(&config, urls, clear_cache).await,
        Command::Download { drama_id, episodes } => {
            run_download(&config, drama_id, episodes).await
        }
        command => run_catalog(&config, command).await,
    }
}
