pub mod app;
pub mod error;
pub mod http;
pub mod library;
pub mod logging;
pub mod lyrics;
pub mod metadata;
pub mod player;
