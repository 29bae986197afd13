use std::collections::HashSet;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use quaver::common::logger;
use quaver::common::types::ChannelId;
use quaver::configs::Config;
use quaver::player::{FfplayOutputFactory, PlayerEvent, PlayerManager, SessionHandle};
use quaver::sources::{SourceResolver, SpotifyResolver, YtDlpExtractor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::load()?;
    logger::init(&config);

    let extractor: Arc<dyn quaver::sources::Extractor> =
        Arc::new(YtDlpExtractor::new(config.extractor.clone()));
    let spotify = Arc::new(SpotifyResolver::new(config.spotify.clone()));
    let resolver = Arc::new(SourceResolver::new(
        extractor.clone(),
        spotify,
        config.extractor.search_limit,
    ));
    let manager = Arc::new(PlayerManager::new(
        resolver,
        extractor,
        Arc::new(FfplayOutputFactory),
        config.playback.clone(),
    ));

    info!("quaver console ready; type 'help' for commands");
    console(manager).await;
    Ok(())
}

/// Line-oriented front end: one command per line, one session per joined
/// channel. Session notifications are printed as they arrive.
async fn console(manager: Arc<PlayerManager>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut channel = ChannelId(1);
    let mut watched: HashSet<ChannelId> = HashSet::new();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        match command {
            "join" => match rest.parse::<u64>() {
                Ok(id) => {
                    channel = ChannelId(id);
                    info!("switched to channel {channel}");
                }
                Err(_) => warn!("usage: join <channel-id>"),
            },
            "play" | "search" | "select" | "pause" | "resume" | "skip" | "stop" | "loop"
            | "shuffle" | "status" | "queue" => {
                let session = manager.get_or_create(channel);
                if watched.insert(channel) {
                    watch_events(&session);
                }
                dispatch(command, rest, &session).await;
            }
            "leave" => {
                manager.destroy(channel);
                watched.remove(&channel);
                info!("left channel {channel}");
            }
            "quit" | "exit" => break,
            "help" => {
                println!(
                    "join <id> | play <url or text> | search <text> | select <n> | pause | \
                     resume | skip | stop | loop | shuffle | status | queue | leave | quit"
                );
            }
            other => warn!("unknown command '{other}', type 'help'"),
        }
    }
}

async fn dispatch(command: &str, rest: &str, session: &Arc<SessionHandle>) {
    let outcome = match command {
        "play" => session.play(rest, false).await.map(|tracks| {
            info!("queued {} track(s)", tracks.len());
        }),
        "search" => session.search(rest).await.map(|candidates| {
            if candidates.is_empty() {
                warn!("no results for '{rest}'");
            }
            for (i, track) in candidates.iter().enumerate() {
                println!("  {}. {} [{}]", i + 1, track.title, track.length_display());
            }
        }),
        "select" => match rest.parse::<usize>() {
            Ok(n) if n >= 1 => session.select(n - 1).await.map(|_| ()),
            _ => {
                warn!("usage: select <result number>");
                Ok(())
            }
        },
        "pause" => session.pause().await,
        "resume" => session.resume().await,
        "skip" => session.skip().await,
        "stop" => session.stop().await,
        "loop" => session.toggle_loop().await.map(|enabled| {
            info!("loop {}", if enabled { "on" } else { "off" });
        }),
        "shuffle" => session.shuffle().await,
        "status" | "queue" => session.status().await.map(|status| {
            println!("state: {:?}, loop: {}", status.state, status.loop_enabled);
            if let Some(track) = &status.now_playing {
                println!("now playing: {} [{}]", track.title, track.length_display());
            }
            for (i, track) in status.queue.iter().enumerate() {
                println!("  {}. {} [{}]", i + 1, track.title, track.length_display());
            }
        }),
        _ => Ok(()),
    };

    if let Err(e) = outcome {
        error!("{command}: {e}");
    }
}

fn watch_events(session: &Arc<SessionHandle>) {
    let channel = session.channel_id();
    let events = session.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            match event {
                PlayerEvent::TrackStarted(track) => {
                    info!("[{channel}] now playing: {}", track.title)
                }
                PlayerEvent::TrackEnded(track) => info!("[{channel}] finished: {}", track.title),
                PlayerEvent::TrackFailed { track, message } => {
                    warn!("[{channel}] '{}' failed: {message}", track.title)
                }
                PlayerEvent::QueueFinished => info!("[{channel}] queue finished"),
                PlayerEvent::SessionFailed { message } => warn!("[{channel}] {message}"),
            }
        }
    });
}
