//! Content sniffing. Magic bytes decide first; the entry name is only a
//! fallback for formats without a reliable signature.

use std::fmt;

const PDF_SIGNATURE: &[u8] = b"%PDF-";

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "tif", "tiff", "bmp", "gif", "webp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A single raster image, OCR'd directly.
    Image,
    /// A PDF: rendered page by page and also mined for native text.
    PaginatedDocument,
    Unsupported,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentKind::Image => "image",
            DocumentKind::PaginatedDocument => "paginated",
            DocumentKind::Unsupported => "unsupported",
        })
    }
}

pub fn classify(bytes: &[u8], name: &str) -> DocumentKind {
    if bytes.starts_with(PDF_SIGNATURE) {
        return DocumentKind::PaginatedDocument;
    }
    if bytes.starts_with(b"%PDF") || has_extension(name, "pdf") {
        // Truncated header, or named like a PDF without being one.
        return DocumentKind::Unsupported;
    }
    if has_image_signature(bytes) {
        return DocumentKind::Image;
    }
    if IMAGE_EXTENSIONS.iter().any(|ext| has_extension(name, ext)) {
        return DocumentKind::Image;
    }
    DocumentKind::Unsupported
}

fn has_image_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(b"II*\0")
        || bytes.starts_with(b"MM\0*")
        || bytes.starts_with(b"BM")
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || (bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
}

fn has_extension(name: &str, ext: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(stem, e)| !stem.is_empty() && e.eq_ignore_ascii_case(ext))
}
