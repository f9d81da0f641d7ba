use anyhow::Result;
use tracing::{debug, warn};

use super::config::SortConfig;
use super::session::PlayerHandle;
use super::state::PlaybackState;
use crate::library::{filter_tracks, sort_tracks, Playlist, Track};
use crate::metadata::{Metadata, MetadataPipeline, MetadataSearchResult};

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Tracks(Option<String>),
    PlayIndex(usize),
    Play,
    Pause,
    Next,
    Previous,
    /// Seconds.
    Seek(u64),
    Mode,
    EnqueueNext(usize),
    Append(usize),
    Status,
    Lyrics,
    Expand(bool),
    Search(String),
    Preview(usize),
    Write,
    Grant(u64),
    Deny(u64),
    Help,
    Quit,
}

pub const HELP: &str = "\
tracks [query]     list (and number) library tracks
play [n]           play track n of the last listing, or resume
pause | next | prev
seek <secs>        jump within the current track
mode               cycle repeat / repeat one / shuffle
next-up <n>        queue track n right after the current one
append <n>         queue track n at the end
status             what is playing
lyrics             fetch or show lyrics of the current track
expand | collapse
search <query>     look up metadata for the current track
preview <n>        show the tags candidate n would write
write              write the previewed tags to the file
grant <id> | deny <id>   answer a write-permission request
quit";

fn number<T: std::str::FromStr>(arg: Option<&str>, what: &str) -> Result<T, String> {
    arg.ok_or_else(|| format!("missing {}", what))?
        .parse()
        .map_err(|_| format!("invalid {}", what))
}

/// Parse a prompt line. Blank lines are `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, Some(r.trim()).filter(|r| !r.is_empty())),
        None => (line, None),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "tracks" | "ls" => Input::Tracks(rest.map(String::from)),
        "play" => match rest {
            Some(_) => Input::PlayIndex(number(rest, "track number")?),
            None => Input::Play,
        },
        "pause" => Input::Pause,
        "next" => Input::Next,
        "prev" | "previous" => Input::Previous,
        "seek" => Input::Seek(number(rest, "position")?),
        "mode" => Input::Mode,
        "next-up" => Input::EnqueueNext(number(rest, "track number")?),
        "append" => Input::Append(number(rest, "track number")?),
        "status" => Input::Status,
        "lyrics" => Input::Lyrics,
        "expand" => Input::Expand(true),
        "collapse" => Input::Expand(false),
        "search" => Input::Search(rest.ok_or("missing query")?.to_string()),
        "preview" => Input::Preview(number(rest, "candidate number")?),
        "write" => Input::Write,
        "grant" => Input::Grant(number(rest, "request id")?),
        "deny" => Input::Deny(number(rest, "request id")?),
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(input))
}

pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub fn describe(track: &Track) -> String {
    format!(
        "{} - {}",
        track.artist.as_deref().unwrap_or("Unknown artist"),
        track.title.as_deref().unwrap_or(&track.uri)
    )
}

/// Seconds typed at the prompt; absurd values clamp instead of overflowing.
pub fn seconds_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

pub fn format_draft(draft: &Metadata) -> String {
    let fields = [
        ("title", &draft.title),
        ("album", &draft.album),
        ("artist", &draft.artist),
        ("album artist", &draft.album_artist),
        ("genre", &draft.genre),
        ("year", &draft.year),
        ("track", &draft.track_number),
    ];
    let mut out: Vec<String> = fields
        .iter()
        .map(|(name, value)| format!("{:>13}: {}", name, value.as_deref().unwrap_or("(unchanged)")))
        .collect();
    out.push(format!(
        "{:>13}: {}",
        "cover",
        match &draft.cover_art {
            Some(bytes) => format!("{} bytes", bytes.len()),
            None => "(unchanged)".to_string(),
        }
    ));
    out.join("\n")
}

fn describe_candidate(c: &MetadataSearchResult) -> String {
    format!(
        "{} - {} [{}{}]",
        c.artist.as_deref().unwrap_or("?"),
        c.title.as_deref().unwrap_or("?"),
        c.album.as_deref().unwrap_or("no album"),
        c.year.as_deref().map(|y| format!(", {}", y)).unwrap_or_default()
    )
}

/// Executes prompt commands against a running session.
pub struct InputHandler {
    player: PlayerHandle,
    metadata: MetadataPipeline,
    sort: SortConfig,
    listing: Vec<Track>,
    candidates: Vec<MetadataSearchResult>,
    /// Reviewed with `preview`, written with `write`.
    draft: Option<(Track, Metadata)>,
}

impl InputHandler {
    pub fn new(player: PlayerHandle, metadata: MetadataPipeline, sort: SortConfig) -> Self {
        Self {
            player,
            metadata,
            sort,
            listing: Vec::new(),
            candidates: Vec::new(),
            draft: None,
        }
    }

    fn listed(&self, n: usize) -> Option<Track> {
        n.checked_sub(1).and_then(|i| self.listing.get(i)).cloned()
    }

    fn print_status(state: &PlaybackState) {
        match &state.current_track {
            Some(track) => println!(
                "{} {} [{} / {}] mode: {:?}",
                if state.is_playing { "▶" } else { "⏸" },
                describe(track),
                format_duration(state.position_ms),
                format_duration(track.duration_ms),
                state.mode
            ),
            None => println!("nothing playing, mode: {:?}", state.mode),
        }
        if let Some(lyrics) = state.current_lyrics() {
            let line = state
                .active_lyrics_line()
                .and_then(|i| lyrics.synced.as_ref().and_then(|s| s.get(i)));
            if let Some(line) = line {
                println!("  ♪ {}", line.text);
            }
        }
    }

    /// Returns `false` once the user asked to quit.
    pub async fn handle(&mut self, input: Input) -> Result<bool> {
        debug!(?input, "input");
        match input {
            Input::Tracks(query) => {
                let all = self.player.tracks().borrow().clone();
                let filtered = filter_tracks(&all, query.as_deref().unwrap_or(""));
                self.listing = sort_tracks(&filtered, self.sort.tracks, self.sort.track_order);
                for (i, track) in self.listing.iter().enumerate() {
                    println!("{:>4}. {} ({})", i + 1, describe(track), format_duration(track.duration_ms));
                }
                if self.listing.is_empty() {
                    println!("no tracks (the library may still be scanning)");
                }
            }
            Input::PlayIndex(n) => match self.listed(n) {
                Some(track) => {
                    let playlist = Playlist::new(None, self.listing.clone());
                    self.player.select_track(track, playlist).await?;
                }
                None => println!("no track {}", n),
            },
            Input::Play => self.player.play().await?,
            Input::Pause => self.player.pause().await?,
            Input::Next => self.player.seek_next().await?,
            Input::Previous => self.player.seek_previous().await?,
            Input::Seek(secs) => self.player.seek_to(seconds_to_ms(secs)).await?,
            Input::Mode => self.player.cycle_playback_mode().await?,
            Input::EnqueueNext(n) | Input::Append(n) => {
                let Some(track) = self.listed(n) else {
                    println!("no track {}", n);
                    return Ok(true);
                };
                if matches!(input, Input::EnqueueNext(_)) {
                    self.player.enqueue_next(track).await?;
                } else {
                    self.player.append_to_queue(track).await?;
                }
            }
            Input::Status => Self::print_status(&self.player.snapshot()),
            Input::Lyrics => {
                let state = self.player.snapshot();
                match state.current_lyrics() {
                    Some(lyrics) => match (&lyrics.synced, &lyrics.plain) {
                        (Some(lines), _) => lines.iter().for_each(|l| {
                            println!("[{}] {}", format_duration(l.timestamp_ms), l.text)
                        }),
                        (None, Some(lines)) => lines.iter().for_each(|l| println!("{}", l)),
                        (None, None) => println!("no lyrics for this track"),
                    },
                    None if state.is_loading_lyrics => println!("still loading lyrics"),
                    None => {
                        self.player.request_lyrics().await?;
                        println!("looking up lyrics, run 'lyrics' again in a moment");
                    }
                }
            }
            Input::Expand(expanded) => self.player.set_player_expanded(expanded).await?,
            Input::Search(query) => {
                let duration = self
                    .player
                    .snapshot()
                    .current_track
                    .map(|t| t.duration_ms)
                    .unwrap_or(0);
                match self.metadata.search(&query, duration).await {
                    Ok(results) => {
                        for (i, c) in results.iter().enumerate() {
                            println!("{:>3}. {}", i + 1, describe_candidate(c));
                        }
                        if results.is_empty() {
                            println!("no candidates");
                        }
                        self.candidates = results;
                    }
                    Err(e) => println!("search failed: {}", e),
                }
            }
            Input::Preview(n) => {
                let Some(track) = self.player.snapshot().current_track else {
                    println!("nothing playing to tag");
                    return Ok(true);
                };
                let Some(candidate) = n.checked_sub(1).and_then(|i| self.candidates.get(i)) else {
                    println!("no candidate {}", n);
                    return Ok(true);
                };
                let preview = self.metadata.preview(candidate).await;
                if let Some(e) = &preview.cover_art_error {
                    println!("cover art unavailable: {}", e);
                }
                println!("{}\n{}", describe(&track), format_draft(&preview.metadata));
                println!("type 'write' to save these tags");
                self.draft = Some((track, preview.metadata));
            }
            Input::Write => {
                let Some((track, metadata)) = self.draft.take() else {
                    println!("nothing previewed, use 'preview <n>' first");
                    return Ok(true);
                };

                // May wait on a permission grant typed at the prompt.
                let pipeline = self.metadata.clone();
                tokio::spawn(async move {
                    if let Err(e) = pipeline.commit(track, metadata).await {
                        warn!(error = %e, "metadata edit failed");
                    }
                });
            }
            Input::Grant(id) => {
                if !self.metadata.grant(id) {
                    println!("no pending request {}", id);
                }
            }
            Input::Deny(id) => {
                if !self.metadata.deny(id) {
                    println!("no pending request {}", id);
                }
            }
            Input::Help => println!("{}", HELP),
            Input::Quit => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("  "), Ok(None));
        assert_eq!(parse("play"), Ok(Some(Input::Play)));
        assert_eq!(parse("play 3"), Ok(Some(Input::PlayIndex(3))));
        assert_eq!(parse("SEEK 90"), Ok(Some(Input::Seek(90))));
        assert_eq!(
            parse("tracks daft punk"),
            Ok(Some(Input::Tracks(Some("daft punk".into()))))
        );
        assert_eq!(parse("tracks"), Ok(Some(Input::Tracks(None))));
        assert_eq!(
            parse("search  one more time "),
            Ok(Some(Input::Search("one more time".into())))
        );
        assert_eq!(parse("grant 7"), Ok(Some(Input::Grant(7))));
        assert_eq!(parse("q"), Ok(Some(Input::Quit)));
        assert_eq!(parse("preview 2"), Ok(Some(Input::Preview(2))));
        assert_eq!(parse("write"), Ok(Some(Input::Write)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("seek").is_err());
        assert!(parse("seek soon").is_err());
        assert!(parse("search").is_err());
        assert!(parse("dance").is_err());
        assert!(parse("preview").is_err());
        // Tags are only written after a separate review step.
        assert!(parse("apply 1").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(62_500), "1:02");
        assert_eq!(format_duration(3_600_000), "60:00");
    }

    #[test]
    fn test_huge_seek_saturates() {
        assert_eq!(parse("seek 18446744073709551615"), Ok(Some(Input::Seek(u64::MAX))));
        assert_eq!(seconds_to_ms(u64::MAX), u64::MAX);
        assert_eq!(seconds_to_ms(90), 90_000);
    }

    #[test]
    fn test_draft_lists_every_field() {
        let draft = Metadata {
            title: Some("Song".into()),
            year: Some("1999".into()),
            cover_art: Some(vec![0; 42]),
            ..Default::default()
        };
        let text = format_draft(&draft);
        assert_eq!(text.lines().count(), 8);
        assert!(text.contains("title: Song"));
        assert!(text.contains("year: 1999"));
        assert!(text.contains("album: (unchanged)"));
        assert!(text.contains("cover: 42 bytes"));
    }
}
