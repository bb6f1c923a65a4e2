//! Media classification types and the cover payload.
//!
//! Files are admitted into the index by coarse kind (audio, image, video),
//! derived from the file extension. The accepted-kind set is a bitflag so a
//! single index can serve any combination.

use std::path::Path;

bitflags::bitflags! {
    /// Set of media kinds accepted by an index.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MediaTypes: u8 {
        const AUDIO = 1;
        const IMAGE = 1 << 1;
        const VIDEO = 1 << 2;
    }
}

impl MediaTypes {
    /// Returns true if files of the given kind belong in the index.
    pub fn accepts(self, kind: MediaKind) -> bool {
        self.contains(kind.into())
    }
}

impl Default for MediaTypes {
    fn default() -> Self {
        Self::all()
    }
}

/// Coarse media kind of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Classifies a path by its extension.
    ///
    /// Returns `None` for unknown or missing extensions; such files are not
    /// indexed at all.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&extension)
    }

    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "aac" | "flac" | "m4a" | "mp3" | "ogg" | "opus" | "wav" | "wma" => Some(Self::Audio),
            "bmp" | "gif" | "jpeg" | "jpg" | "png" | "webp" => Some(Self::Image),
            "avi" | "flv" | "m4v" | "mkv" | "mov" | "mp4" | "mpeg" | "mpg" | "ts" | "webm"
            | "wmv" => Some(Self::Video),
            _ => None,
        }
    }
}

impl From<MediaKind> for MediaTypes {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => MediaTypes::AUDIO,
            MediaKind::Image => MediaTypes::IMAGE,
            MediaKind::Video => MediaTypes::VIDEO,
        }
    }
}

/// Derived cover/thumbnail data for a file item.
///
/// Extraction is performed by an external [`CoverSource`](crate::CoverSource);
/// the index only carries the result around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub mime: String,
    pub data: Vec<u8>,
}
