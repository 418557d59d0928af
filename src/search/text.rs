/// Case-insensitive substring containment using Unicode lowercase folding.
///
/// An empty needle matches everything, mirroring `ILIKE '%%'`.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Trim a raw query string; blank means "no text filter".
pub fn normalize_query(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
