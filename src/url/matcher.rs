/// Checks if a string matches a glob pattern
///
/// Only the `*` wildcard is supported; it matches any run of characters,
/// including the empty run. Patterns without `*` require an exact match.
///
/// # Arguments
///
/// * `pattern` - The glob pattern, e.g. `utm_*`
/// * `candidate` - The string to check against the pattern
///
/// # Examples
///
/// ```
/// use sumi_sitecrawl::url::matches_glob;
///
/// assert!(matches_glob("utm_*", "utm_source"));
/// assert!(matches_glob("fbclid", "fbclid"));
/// assert!(matches_glob("*_id", "session_id"));
/// assert!(!matches_glob("utm_*", "xutm_source"));
/// ```
pub fn matches_glob(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == candidate;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if candidate.len() < first.len() + last.len()
        || !candidate.starts_with(first)
        || !candidate.ends_with(last)
    {
        return false;
    }

    // Middle fragments must appear in order between the anchored ends
    let mut rest = &candidate[first.len()..candidate.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    true
}
