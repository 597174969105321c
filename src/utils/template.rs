//! Filename template rendering

use super::sanitize_filename;

/// Default template used when none is configured
pub const DEFAULT_TEMPLATE: &str = "{artist} - {title}";

/// Values substituted into a filename template
#[derive(Debug, Clone, Default)]
pub struct TemplateValues<'a> {
    pub title: &'a str,
    pub album: &'a str,
    pub artist: &'a str,
}

/// Render a filename template
///
/// Substitutes `{title}`, `{album}` and `{artist}`, then trims and sanitizes
/// the result. Unknown `{tokens}` are left as-is. If the rendered name is
/// empty the sanitized title is used instead.
pub fn render_filename(template: &str, values: &TemplateValues<'_>) -> String {
    let rendered = template
        .replace("{title}", values.title)
        .replace("{album}", values.album)
        .replace("{artist}", values.artist);

    let name = sanitize_filename(&rendered);
    if name.is_empty() {
        sanitize_filename(values.title)
    } else {
        name
    }
}
