/// Audio container handling for stream-copy segmentation.
///
/// Chunks are produced with `-c copy`, so the output container must be able
/// to hold the source codec as-is. Containers restricted to a single codec
/// family (mp3, adts, wav, flac) are only ever selected when the source
/// already carries that extension; for everything else the output container
/// matches the input container. Keys with an unrecognized extension fall
/// back to the MP4 audio container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp3,
    M4a,
    Mp4,
    Aac,
    Wav,
    Ogg,
    Opus,
    Flac,
    Webm,
}

impl ContainerFormat {
    /// Detect the output container for a storage key from its extension
    pub fn from_key(key: &str) -> Self {
        let extension = key
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "mp3" => ContainerFormat::Mp3,
            "m4a" => ContainerFormat::M4a,
            "mp4" => ContainerFormat::Mp4,
            "aac" => ContainerFormat::Aac,
            "wav" => ContainerFormat::Wav,
            "ogg" | "oga" => ContainerFormat::Ogg,
            "opus" => ContainerFormat::Opus,
            "flac" => ContainerFormat::Flac,
            "webm" => ContainerFormat::Webm,
            _ => ContainerFormat::M4a,
        }
    }

    /// ffmpeg muxer name passed to `-segment_format`
    pub fn muxer(&self) -> &'static str {
        match self {
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::M4a => "ipod",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Aac => "adts",
            ContainerFormat::Wav => "wav",
            ContainerFormat::Ogg | ContainerFormat::Opus => "ogg",
            ContainerFormat::Flac => "flac",
            ContainerFormat::Webm => "webm",
        }
    }

    /// File extension for produced chunks and derived storage keys
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::M4a => "m4a",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Aac => "aac",
            ContainerFormat::Wav => "wav",
            ContainerFormat::Ogg => "ogg",
            ContainerFormat::Opus => "opus",
            ContainerFormat::Flac => "flac",
            ContainerFormat::Webm => "webm",
        }
    }

    /// MIME content type recorded on re-upload
    pub fn content_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mp3 => "audio/mpeg",
            ContainerFormat::M4a | ContainerFormat::Mp4 => "audio/mp4",
            ContainerFormat::Aac => "audio/aac",
            ContainerFormat::Wav => "audio/wav",
            ContainerFormat::Ogg | ContainerFormat::Opus => "audio/ogg",
            ContainerFormat::Flac => "audio/flac",
            ContainerFormat::Webm => "audio/webm",
        }
    }
}
