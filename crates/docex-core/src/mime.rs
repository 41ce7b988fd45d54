//! File extension to document kind mapping.

use std::path::Path;

/// Kind of source document, as far as the model transports care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeKind {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl MimeKind {
    /// MIME type string sent to providers.
    pub fn mime_type(&self) -> &'static str {
        match self {
            MimeKind::Pdf => "application/pdf",
            MimeKind::Png => "image/png",
            MimeKind::Jpeg => "image/jpeg",
            MimeKind::Gif => "image/gif",
            MimeKind::Webp => "image/webp",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, MimeKind::Pdf)
    }
}

/// Classify a path by its lowercased extension.
///
/// Unknown or missing extensions are treated as PDF: most inputs are PDFs,
/// and a vision model can usually cope with a PDF byte stream.
pub fn classify(path: &Path) -> MimeKind {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "png" => MimeKind::Png,
        "jpg" | "jpeg" => MimeKind::Jpeg,
        "gif" => MimeKind::Gif,
        "webp" => MimeKind::Webp,
        _ => MimeKind::Pdf,
    }
}
