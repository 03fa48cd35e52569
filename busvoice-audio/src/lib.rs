// Speech outputs for the announcement dispatcher

pub mod log_sink;
pub use log_sink::LogSink;

#[cfg(feature = "tts")]
pub mod tts;

#[cfg(feature = "tts")]
pub use tts::{CommandSink, CommandSinkConfig, Engine};

#[cfg(feature = "tts")]
pub mod voices;

#[cfg(feature = "tts")]
pub mod wav;
