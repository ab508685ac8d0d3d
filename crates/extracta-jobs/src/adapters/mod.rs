//! Stage adapter implementations.

pub mod codec;
pub mod encoder;
pub mod process;
pub mod transcriber;

pub use codec::encoder_args;
pub use encoder::FfmpegAdapter;
pub use process::compact_log_line;
pub use transcriber::WhisperAdapter;
