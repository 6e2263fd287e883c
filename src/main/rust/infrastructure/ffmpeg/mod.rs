mod command_builder;
mod feed_pump;
mod ffmpeg_launcher;

pub use command_builder::FfmpegCommandBuilder;
pub use feed_pump::{pump_feed, ForwardingActivity};
pub use ffmpeg_launcher::FfmpegLauncher;
