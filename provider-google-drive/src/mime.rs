//! MIME type resolution for uploads.

/// Used when neither the declared type nor the extension says anything.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Pick the MIME type sent to Drive for `file_name`.
///
/// A specific `declared` type (anything other than empty or
/// `application/octet-stream`) wins; otherwise the extension decides.
///
/// ```
/// use provider_google_drive::resolve_mime_type;
///
/// assert_eq!(resolve_mime_type("notes.txt", ""), "text/plain");
/// assert_eq!(resolve_mime_type("photo.jpg", "image/webp"), "image/webp");
/// assert_eq!(resolve_mime_type("blob", ""), "application/octet-stream");
/// ```
pub fn resolve_mime_type(file_name: &str, declared: &str) -> String {
    let declared = declared.trim();
    if !declared.is_empty() && !declared.eq_ignore_ascii_case(DEFAULT_MIME_TYPE) {
        return declared.to_string();
    }

    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(resolve_mime_type("report.pdf", ""), "application/pdf");
        assert_eq!(resolve_mime_type("Song.MP3", ""), "audio/mpeg");
        assert_eq!(resolve_mime_type("page.html", DEFAULT_MIME_TYPE), "text/html");
    }

    #[test]
    fn test_declared_type_wins() {
        assert_eq!(resolve_mime_type("report.pdf", "text/csv"), "text/csv");
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        assert_eq!(resolve_mime_type("archive.unknownext", ""), DEFAULT_MIME_TYPE);
        assert_eq!(resolve_mime_type("", ""), DEFAULT_MIME_TYPE);
    }
}
