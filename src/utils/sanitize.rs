//! Filename sanitization utilities

/// Characters that are never allowed to reach storage, with their escape
const RESERVED: [(char, &str); 7] = [
    (':', "%3A"),
    ('?', "%3F"),
    ('*', "%2A"),
    ('/', "%2F"),
    ('\\', "%5C"),
    ('"', "%22"),
    ('|', "%7C"),
];

/// Sanitize a filename or folder name for safe filesystem usage
///
/// Trims surrounding whitespace, then percent-escapes the reserved characters
/// `: ? * / \ " |`. A name made only of dots (`.`, `..`) has its dots escaped
/// so it can never act as a path component. Every other character passes
/// through unchanged.
///
/// # Examples
///
/// ```
/// use tunegrab::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC - T.N.T."), "AC%2FDC - T.N.T.");
/// assert_eq!(sanitize_filename("  Why?  "), "Why%3F");
/// assert_eq!(sanitize_filename(".."), "%2E%2E");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let name = name.trim();
    if !name.is_empty() && name.chars().all(|c| c == '.') {
        return "%2E".repeat(name.len());
    }

    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match RESERVED.iter().find(|(reserved, _)| *reserved == c) {
            Some((_, escape)) => out.push_str(escape),
            None => out.push(c),
        }
    }
    out
}

/// Whether `c` is escaped by [`sanitize_filename`]
pub fn is_reserved(c: char) -> bool {
    RESERVED.iter().any(|(reserved, _)| *reserved == c)
}
