// pattern.rs — Subject/action/resource pattern matching.
//
// The vocabulary is deliberately tiny: `*` alone, an exact string, or a prefix
// followed by a single trailing `*`. No case folding, no regex, and a `*`
// anywhere but the end is a literal character.

/// Check whether a policy pattern matches a request value.
///
/// - `"*"` matches anything.
/// - An identical string matches.
/// - `"prefix*"` matches any value starting with `prefix`.
pub fn matches_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" || pattern == value {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => false,
    }
}
