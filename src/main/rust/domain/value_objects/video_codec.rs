use std::fmt;

use clap::ValueEnum;

/// Elementary stream codec delivered by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VideoCodec {
    #[value(name = "h264", alias = "avc")]
    H264,
    #[value(name = "hevc", alias = "h265")]
    Hevc,
}

impl VideoCodec {
    /// ffmpeg demuxer name for the raw elementary stream
    pub fn ffmpeg_format(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Hevc => "hevc",
        }
    }

    /// Whether `data` carries an H.264 IDR or an HEVC IRAP NAL unit.
    pub fn contains_keyframe(&self, data: &[u8]) -> bool {
        nal_headers(data).any(|header| match self {
            VideoCodec::H264 => header & 0x1f == 5,
            VideoCodec::Hevc => (16..=21).contains(&((header >> 1) & 0x3f)),
        })
    }
}

impl Default for VideoCodec {
    fn default() -> Self {
        VideoCodec::Hevc
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_format())
    }
}

/// First byte of every NAL unit following an Annex B start code (3 or 4 bytes).
fn nal_headers(data: &[u8]) -> impl Iterator<Item = u8> + '_ {
    let mut i = 0;
    std::iter::from_fn(move || {
        while i + 3 < data.len() {
            let at = i;
            i += 1;
            if data[at] != 0 || data[at + 1] != 0 {
                continue;
            }
            let header = match data[at + 2] {
                1 => at + 3,
                0 if data[at + 3] == 1 => at + 4,
                _ => continue,
            };
            if header < data.len() {
                i = header;
                return Some(data[header]);
            }
        }
        None
    })
}

/// Drops chunks until the first keyframe so the muxer never starts mid-GOP.
#[derive(Debug, Clone)]
pub struct KeyframeGate {
    codec: VideoCodec,
    open: bool,
}

impl KeyframeGate {
    pub fn new(codec: VideoCodec) -> Self {
        Self { codec, open: false }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns true if the chunk should be forwarded.
    pub fn admit(&mut self, chunk: &[u8]) -> bool {
        if !self.open && self.codec.contains_keyframe(chunk) {
            self.open = true;
        }
        self.open
    }
}
