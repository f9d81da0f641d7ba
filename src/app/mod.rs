pub mod cli;
pub mod config;
pub mod events;
pub mod input_handler;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use events::{Command, Notification};
pub use session::{spawn, Collaborators, PlayerHandle, SessionConfig};
pub use state::{PlaybackMode, PlaybackState};
