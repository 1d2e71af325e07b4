use std::path::{Path, PathBuf};

/// Image encodings recognized by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// No file was given.
    Absent,
    StandardBitmap,
    Packed4bpp,
    Unsupported,
}

impl ImageFormat {
    /// Classifies `path` by its literal, case-sensitive suffix.
    pub fn sniff(path: &Path) -> Self {
        let name = path.as_os_str().as_encoded_bytes();
        if name.ends_with(b".bmp") {
            Self::StandardBitmap
        } else if name.ends_with(b".4bpp") {
            Self::Packed4bpp
        } else {
            Self::Unsupported
        }
    }
}

/// What to put on the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub path: Option<PathBuf>,
    pub format: ImageFormat,
}

impl ImageSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if !path.as_os_str().is_empty() => {
                let format = ImageFormat::sniff(&path);
                Self {
                    path: Some(path),
                    format,
                }
            }
            _ => Self {
                path: None,
                format: ImageFormat::Absent,
            },
        }
    }
}
