use crate::domain::value_objects::VideoCodec;

pub struct FfmpegCommandBuilder;

impl FfmpegCommandBuilder {
    /// Arguments for ffmpeg reading a raw elementary stream from stdin and
    /// publishing it to an RTSP sink.
    /// Video is passed through; audio is transcoded to mono AAC, which HomeKit
    /// consumers require.
    pub fn build_args(codec: VideoCodec, sink: &str) -> Vec<String> {
        let args: &[&str] = &[
            "-y",
            "-v",
            "error",
            "-hide_banner",
            // Low latency input: no buffering, arrival-time timestamps
            "-fflags",
            "nobuffer",
            "-flags",
            "low_delay",
            "-use_wallclock_as_timestamps",
            "1",
            "-max_delay",
            "500000",
            // Short probing keeps startup fast for RTSP clients
            "-analyzeduration",
            "1000000",
            "-probesize",
            "1000000",
            "-f",
            codec.ffmpeg_format(),
            "-i",
            "pipe:0",
            "-c:v",
            "copy",
            // Repeat SPS/PPS so late joiners can decode
            "-bsf:v",
            "dump_extra",
            "-c:a",
            "aac",
            "-b:a",
            "64k",
            "-ar",
            "16000",
            "-ac",
            "1",
            "-f",
            "rtsp",
            "-rtsp_transport",
            "tcp",
            "-max_muxing_queue_size",
            "1024",
        ];

        let mut args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        args.push(sink.to_string());
        args
    }

    /// Printable command line, for logs.
    pub fn describe(program: &str, codec: VideoCodec, sink: &str) -> String {
        let mut line = program.to_string();
        for arg in Self::build_args(codec, sink) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}
