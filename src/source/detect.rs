/// Image container formats recognized from leading bytes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    /// Not enough bytes yet, or nothing matched.
    #[default]
    Unknown,
    /// JPEG / JFIF.
    Jpeg,
    /// JPEG 2000 codestream or JP2 box container.
    Jpeg2000,
    /// TIFF, either byte order.
    Tiff,
    /// Windows bitmap.
    Bmp,
    /// Windows icon.
    Ico,
    /// Apple icon image.
    Icns,
    /// GIF87a / GIF89a.
    Gif,
    /// PNG, including APNG.
    Png,
    /// RIFF WebP.
    WebP,
    /// Recognizably an image container, but not one listed above.
    Other,
}

impl ImageType {
    /// Conventional file extension, without the dot.
    pub fn file_extension(self) -> Option<&'static str> {
        Some(match self {
            Self::Jpeg => "jpg",
            Self::Jpeg2000 => "jp2",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Ico => "ico",
            Self::Icns => "icns",
            Self::Gif => "gif",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Unknown | Self::Other => return None,
        })
    }

    /// Inverse of [`ImageType::file_extension`], case-insensitive, accepting common aliases.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "jp2" | "j2k" => Self::Jpeg2000,
            "tif" | "tiff" => Self::Tiff,
            "bmp" => Self::Bmp,
            "ico" => Self::Ico,
            "icns" => Self::Icns,
            "gif" => Self::Gif,
            "png" | "apng" => Self::Png,
            "webp" => Self::WebP,
            _ => Self::Unknown,
        }
    }
}

/// Bytes after which an undetected prefix is reported as [`ImageType::Other`] rather than
/// [`ImageType::Unknown`].
pub const DETECT_PREFIX_LEN: usize = 16;

/// Detect a buffer's image type from its leading bytes.
///
/// Returns [`ImageType::Unknown`] while the prefix is too short to decide.
pub fn detect_image_type(bytes: &[u8]) -> ImageType {
    let starts = |magic: &[u8]| bytes.len() >= magic.len() && &bytes[..magic.len()] == magic;

    if starts(&[0xFF, 0xD8, 0xFF]) {
        return ImageType::Jpeg;
    }
    if starts(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return ImageType::Png;
    }
    if starts(b"GIF87a") || starts(b"GIF89a") {
        return ImageType::Gif;
    }
    if starts(b"RIFF") && bytes.len() >= 12 && &bytes[8..12] == b"WEBP" {
        return ImageType::WebP;
    }
    if starts(b"II*\0") || starts(b"MM\0*") {
        return ImageType::Tiff;
    }
    if starts(&[0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ']) || starts(&[0xFF, 0x4F, 0xFF, 0x51])
    {
        return ImageType::Jpeg2000;
    }
    if starts(b"icns") {
        return ImageType::Icns;
    }
    if starts(&[0x00, 0x00, 0x01, 0x00]) {
        return ImageType::Ico;
    }
    if starts(b"BM") && bytes.len() >= 6 {
        return ImageType::Bmp;
    }

    if bytes.len() >= DETECT_PREFIX_LEN {
        ImageType::Other
    } else {
        ImageType::Unknown
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/detect.rs"]
mod tests;
