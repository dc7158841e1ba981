//! Filename extraction and sanitization for completed downloads.

use std::path::{Component, Path, PathBuf};

/// Parses a Content-Disposition header to extract the filename.
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // the RFC 5987 form wins when both are present
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            // value runs to the next parameter
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            // percent-decoded; invalid UTF-8 falls through to plain filename=
            if let Ok(decoded) = urlencoding::decode(encoded_name) {
                return Some(decoded.into_owned());
            }
        }
    }

    // plain filename=, quoted or bare
    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            // unquoted: stop at the next parameter
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |` and control characters) and neutralizes dot segments.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            // NUL and other control characters
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        // "." and ".." would escape the download directory
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Derives the final filename from a Content-Disposition header value.
pub(crate) fn filename_from_disposition(header: &str) -> Option<String> {
    let name = sanitize_filename(&parse_content_disposition(header)?);
    (!name.trim_matches('_').is_empty()).then_some(name)
}

/// Resolves a path in `dir` for `filename`, adding `_N` before the extension if taken.
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let base_path = dir.join(filename);
    if !base_path.exists() {
        return base_path;
    }

    // suffix goes before the last extension; dotfiles keep their whole name as stem
    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };

    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    // every numbered name taken
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

/// Returns false if `name` parses as anything other than plain path components.
fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file\\name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("a<b>c|d?.txt"), "a_b_c_d_.txt");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("."), "_");
    }

    #[test]
    fn test_parse_content_disposition_quoted() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="report.zip""#),
            Some("report.zip".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted_with_trailing_param() {
        assert_eq!(
            parse_content_disposition("attachment; filename=data.csv; size=10"),
            Some("data.csv".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        assert_eq!(
            parse_content_disposition("attachment; filename*=UTF-8''na%C3%AFve%20file.txt"),
            Some("naïve file.txt".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_bad_encoding_falls_back_to_plain() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename*=UTF-8''%FF; filename="plain.txt""#),
            Some("plain.txt".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_filename_from_disposition_blocks_traversal() {
        let name = filename_from_disposition(r#"attachment; filename="../../etc/passwd""#).unwrap();
        assert!(!name.contains('/'));
        assert_eq!(filename_from_disposition(r#"attachment; filename="""#), None);
    }

    #[test]
    fn test_resolve_unique_path_adds_suffix() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_unique_path(dir.path(), "a.txt"), dir.path().join("a.txt"));

        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert_eq!(resolve_unique_path(dir.path(), "a.txt"), dir.path().join("a_1.txt"));

        std::fs::write(dir.path().join("a_1.txt"), b"x").unwrap();
        assert_eq!(resolve_unique_path(dir.path(), "a.txt"), dir.path().join("a_2.txt"));
    }

    #[test]
    fn test_resolve_unique_path_dotfile_keeps_name_as_stem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), b"x").unwrap();
        assert_eq!(resolve_unique_path(dir.path(), ".env"), dir.path().join(".env_1"));
    }
}
