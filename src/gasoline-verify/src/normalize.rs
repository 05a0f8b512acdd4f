//! Error-message normalisation for stable matching.

use once_cell::sync::Lazy;
use regex::Regex;

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("timestamp pattern must compile")
});

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("uuid pattern must compile")
});

static FILE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[\w./-]+\.[A-Za-z]{1,5}:\d+(?::\d+)?").expect("file pattern must compile")
});

static NUMERIC_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\b").expect("numeric pattern must compile"));

/// Replace volatile fragments with stable placeholders:
/// UUIDs become `[uuid]`, ISO timestamps `[timestamp]`,
/// `file.ext:NNN` references `[file]`, remaining numbers `[id]`.
pub fn normalize(text: &str) -> String {
    let text = TIMESTAMP_RE.replace_all(text, "[timestamp]");
    let text = UUID_RE.replace_all(&text, "[uuid]");
    let text = FILE_LINE_RE.replace_all(&text, "[file]");
    NUMERIC_ID_RE.replace_all(&text, "[id]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_file_and_uuid() {
        assert_eq!(
            normalize("Error at file.js:42, request a1b2c3d4-e5f6-7890-abcd-ef0123456789"),
            "Error at [file], request [uuid]"
        );
    }

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(
            normalize("failed at 2026-07-31T18:22:05.123Z retrying"),
            "failed at [timestamp] retrying"
        );
    }

    #[test]
    fn test_normalize_numeric_ids() {
        assert_eq!(normalize("user 48213 not found"), "user [id] not found");
    }

    #[test]
    fn test_normalize_file_with_column() {
        assert_eq!(
            normalize("TypeError at src/components/App.tsx:120:17"),
            "TypeError at [file]"
        );
    }

    #[test]
    fn test_equal_after_normalization() {
        let a = normalize("Timeout for request 111 at api.ts:10");
        let b = normalize("Timeout for request 222 at api.ts:99");
        assert_eq!(a, b);
    }
}
