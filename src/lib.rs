pub mod audio;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod livekit;
pub mod plan;
pub mod relay;
pub mod session;
pub mod stt;
pub mod tts;
pub mod video;

pub use error::{CoachError, Result};
