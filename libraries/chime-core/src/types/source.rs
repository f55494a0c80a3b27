/// Media source descriptors
use std::path::PathBuf;

/// Where the audio for a single-shot playback comes from
#[derive(Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A remote or app-scheme URL, resolved by the host's media element
    Url(String),
    /// A local file path
    File(PathBuf),
    /// An in-memory blob (a self-describing container such as WAV)
    Bytes(Vec<u8>),
}

impl MediaSource {
    /// Whether this source is an in-memory blob
    #[must_use]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    /// Short human-readable description for logging
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => format!("url:{url}"),
            Self::File(path) => format!("file:{}", path.display()),
            Self::Bytes(data) => format!("bytes:{} bytes", data.len()),
        }
    }
}

// Manual Debug so a blob prints its length, not its contents
impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_sources() {
        assert_eq!(
            MediaSource::Url("https://example.com/a.mp3".into()).describe(),
            "url:https://example.com/a.mp3"
        );
        assert_eq!(
            MediaSource::File(PathBuf::from("/music/a.wav")).describe(),
            "file:/music/a.wav"
        );
        assert_eq!(MediaSource::Bytes(vec![0; 128]).describe(), "bytes:128 bytes");
    }

    #[test]
    fn debug_hides_blob_contents() {
        let source = MediaSource::Bytes(vec![1, 2, 3, 4]);
        assert_eq!(format!("{source:?}"), "Bytes(4)");
    }
}
