pub mod ffmpeg;
pub mod metrics;
pub mod miloco;
pub mod probe;
