use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Kind of a localized resource. Decides which output folder it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    Css,
    Js,
    Img,
    Font,
    Video,
    Audio,
    Misc,
}

impl AssetCategory {
    /// Classifies an extension (with or without the leading dot), ignoring case.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" => AssetCategory::Img,
            "ttf" | "otf" | "woff" | "woff2" | "eot" => AssetCategory::Font,
            "mp4" | "webm" | "m4v" | "avi" | "mov" => AssetCategory::Video,
            "mp3" | "ogg" | "wav" => AssetCategory::Audio,
            _ => AssetCategory::Misc,
        }
    }

    /// Classifies a remote URL by the extension of its last path segment.
    pub fn from_url(url: &Url) -> Self {
        let last_segment = url
            .path_segments()
            .and_then(|segments| segments.last())
            .unwrap_or("");

        match Path::new(last_segment).extension() {
            Some(ext) => Self::from_extension(&ext.to_string_lossy()),
            None => AssetCategory::Misc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Css => "css",
            AssetCategory::Js => "js",
            AssetCategory::Img => "img",
            AssetCategory::Font => "font",
            AssetCategory::Video => "video",
            AssetCategory::Audio => "audio",
            AssetCategory::Misc => "misc",
        }
    }

    /// Folder relative to the output root: `css`, `js` or `asset/<category>`.
    pub fn relative_dir(&self) -> PathBuf {
        match self {
            AssetCategory::Css | AssetCategory::Js => PathBuf::from(self.as_str()),
            _ => Path::new("asset").join(self.as_str()),
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
