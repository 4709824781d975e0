//! The one place that knows how list columns are represented.
//!
//! Genres, professions, known-for titles, directors and writers are stored as
//! comma-joined text. Everything that builds, splits or filters on such a
//! column goes through here, so moving to a child table later only touches
//! this module.

/// Separator between values in a list column.
pub const SEPARATOR: char = ',';

/// Trim every value, drop empties, re-join with [`SEPARATOR`].
///
/// Returns `None` when no value survives.
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let joined = split(raw).collect::<Vec<_>>().join(",");
    if joined.is_empty() { None } else { Some(joined) }
}

/// Iterate the values of a list column.
pub fn split(stored: &str) -> impl Iterator<Item = &str> {
    stored.split(SEPARATOR).map(str::trim).filter(|v| !v.is_empty())
}

/// Whole-value membership test, case-sensitive.
#[must_use]
pub fn contains(stored: &str, value: &str) -> bool {
    let value = value.trim();
    split(stored).any(|v| v == value)
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
#[must_use]
pub fn like_escape(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// SQL predicate: list `column` contains the value bound to `?{param}`.
///
/// The bound value must already be passed through [`like_escape`].
#[must_use]
pub fn contains_sql(column: &str, param: usize) -> String {
    format!("(',' || {column} || ',') LIKE '%,' || ?{param} || ',%' ESCAPE '\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_drops_empty_values() {
        assert_eq!(normalize(" Drama, ,Comedy,").as_deref(), Some("Drama,Comedy"));
        assert_eq!(normalize(" , "), None);
    }

    #[test]
    fn contains_matches_whole_values_only() {
        assert!(contains("Drama,Sci-Fi", "Sci-Fi"));
        assert!(!contains("Drama,Sci-Fi", "Sci"));
        assert!(!contains("Documentary", "Drama"));
    }

    #[test]
    fn like_escape_guards_wildcards() {
        assert_eq!(like_escape("100%_a\\b"), "100\\%\\_a\\\\b");
    }
}
