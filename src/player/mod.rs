#[cfg(feature = "mpd")]
pub mod mpd;
pub mod traits;

#[cfg(feature = "mpd")]
pub use self::mpd::MpdEngine;
pub use traits::{EngineEvent, EngineListener, MediaItem, PlaybackEngine, RepeatMode};
