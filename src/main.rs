use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cantus::app::cli::{Args, Cmd, Grouping, SortKey};
use cantus::app::config::{AppConfig, UserConfig};
use cantus::app::input_handler::describe;
use cantus::library::{
    filter_tracks, playlists_for, sort_playlists, sort_tracks, FsResolver, LibraryResolver,
    PlaylistKind, SortOrder, TrackSort,
};
use cantus::logging;

#[tokio::main]
async fn main() -> Result<()> {
    human_panic::setup_panic!();

    let args = Args::parse();
    let _log_guard = logging::init(&AppConfig::get_log_dir(), args.verbose)?;

    let config = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let command = args.command.unwrap_or(Cmd::Scan {
        query: None,
        sort: None,
        descending: false,
        group: None,
    });

    match command {
        Cmd::Scan {
            query,
            sort,
            descending,
            group,
        } => scan(&config, query, sort, descending, group).await,
        #[cfg(feature = "mpd")]
        Cmd::Run => run(config).await,
        Cmd::GenerateConfig => {
            let text = toml::to_string_pretty(&UserConfig::default())
                .context("Failed to serialize default config")?;
            println!("{}", text);
            Ok(())
        }
    }
}

async fn scan(
    config: &UserConfig,
    query: Option<String>,
    sort: Option<SortKey>,
    descending: bool,
    group: Option<Grouping>,
) -> Result<()> {
    let resolver = FsResolver::new(config.library.clone());
    let tracks = tokio::task::spawn_blocking(move || resolver.scan())
        .await
        .context("Library scan panicked")?;
    info!(count = tracks.len(), "library scanned");

    let tracks = filter_tracks(&tracks, query.as_deref().unwrap_or(""));
    let order = if descending {
        SortOrder::Descending
    } else {
        config.sort.track_order
    };

    if let Some(group) = group {
        let kind = PlaylistKind::from(group);
        let playlists = sort_playlists(&playlists_for(&tracks, kind), config.sort.playlists, order);
        for playlist in &playlists {
            println!("{} ({} tracks)", playlist.display_name(kind), playlist.len());
        }
        return Ok(());
    }

    let sort = sort.map(TrackSort::from).unwrap_or(config.sort.tracks);
    for track in sort_tracks(&tracks, sort, order) {
        println!("{}", describe(&track));
    }
    Ok(())
}

#[cfg(feature = "mpd")]
async fn run(config: UserConfig) -> Result<()> {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, BufReader};

    use cantus::app::config::JsonSessionStore;
    use cantus::app::input_handler::{self, InputHandler};
    use cantus::app::{spawn, Collaborators, SessionConfig};
    use cantus::http::build_client;
    use cantus::lyrics::{FileLyricsCache, LrclibProvider, LyricsResolver};
    use cantus::metadata::{LoftyWriter, MetadataEvent, MetadataPipeline, MusicBrainzProvider};
    use cantus::player::MpdEngine;

    let engine = MpdEngine::new(&config.mpd.host, config.mpd.port, config.mpd_music_directory());
    engine
        .check_connection()
        .with_context(|| format!("Cannot reach MPD at {}:{}", config.mpd.host, config.mpd.port))?;

    let client = build_client(&config.user_agent, config.request_timeout());
    let lyrics = LyricsResolver::new(
        Arc::new(LrclibProvider::new(client.clone())),
        Arc::new(FileLyricsCache::new(FileLyricsCache::default_dir())),
        config.request_timeout(),
    );
    let metadata = MetadataPipeline::new(
        Arc::new(MusicBrainzProvider::new(client)),
        Arc::new(LoftyWriter::new()),
        config.request_timeout(),
        config.match_duration_when_searching,
    );

    let player = spawn(
        Collaborators {
            engine: Box::new(engine),
            resolver: Arc::new(FsResolver::new(config.library.clone())),
            store: Box::new(JsonSessionStore::open(AppConfig::get_session_path())),
            lyrics,
        },
        SessionConfig::from(&config),
    );

    // Surface what happens in the background between prompts.
    let mut notifications = player.notifications();
    let mut metadata_events = metadata.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(n) = notifications.recv() => println!("! {}", n.message()),
                Ok(event) = metadata_events.recv() => match event {
                    MetadataEvent::PermissionRequired { id, token } => println!(
                        "? writing {} needs permission, answer 'grant {}' or 'deny {}'",
                        token, id, id
                    ),
                    MetadataEvent::Committed { uri } => println!("✓ tags written to {}", uri),
                    MetadataEvent::Failed { uri, error } => println!("✗ {}: {}", uri, error),
                },
                else => break,
            }
        }
    });

    println!("cantus ready, type 'help' for commands");
    let mut handler = InputHandler::new(player.clone(), metadata.clone(), config.sort);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match input_handler::parse(&line) {
            Ok(Some(input)) => {
                if !handler.handle(input).await? {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }

    metadata.cancel_pending();
    player.shutdown().await;
    printer.abort();
    info!("session ended");
    Ok(())
}
