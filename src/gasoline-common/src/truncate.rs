//! Bounded display snippets for captured text.
//!
//! Console messages, selectors, and URLs arrive with whatever length the
//! page produced, and messages may span lines. Anything echoed into a
//! tool summary or timeline detail is cut to one bounded line here.

/// Default cap for snippet output, in characters.
pub const SNIPPET_MAX_CHARS: usize = 120;

/// Cut captured text down to a single bounded line.
///
/// Only the first line survives; a `…` marks the cut whenever characters
/// or later lines were dropped. Output never exceeds `max_chars`.
///
/// # Examples
/// ```
/// use gasoline_common::truncate::snippet;
///
/// assert_eq!(snippet("ReferenceError: x is not defined", 40), "ReferenceError: x is not defined");
/// assert_eq!(snippet("line one\nline two", 40), "line one…");
/// assert_eq!(snippet("abcdefgh", 5), "abcd…");
/// ```
pub fn snippet(text: &str, max_chars: usize) -> String {
    let first = text.lines().next().unwrap_or("").trim_end();
    let multiline = text.lines().nth(1).is_some();

    let budget = max_chars.max(1);
    let count = first.chars().count();

    if !multiline && count <= budget {
        first.to_string()
    } else if count < budget {
        format!("{first}…")
    } else {
        let cut: String = first.chars().take(budget - 1).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_single_line_unchanged() {
        assert_eq!(snippet("boom", 10), "boom");
    }

    #[test]
    fn test_exact_fit_unchanged() {
        assert_eq!(snippet("12345", 5), "12345");
    }

    #[test]
    fn test_overlong_line_cut_within_budget() {
        let out = snippet("abcdefghij", 6);
        assert_eq!(out, "abcde…");
        assert_eq!(out.chars().count(), 6);
    }

    #[test]
    fn test_dropped_lines_are_marked() {
        assert_eq!(snippet("first\nsecond\nthird", 40), "first…");
    }

    #[test]
    fn test_multiline_at_budget_still_fits() {
        let out = snippet("123456\nmore", 6);
        assert_eq!(out, "12345…");
        assert_eq!(out.chars().count(), 6);
    }

    #[test]
    fn test_multibyte_chars_counted_not_bytes() {
        let out = snippet("нагрузка страницы", 9);
        assert_eq!(out.chars().count(), 9);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(snippet("", 10), "");
    }
}
