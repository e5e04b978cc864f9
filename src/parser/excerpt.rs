pub const EXCERPT_CHARS: usize = 50;

/// Drops every `<...>` span. An unterminated `<` drops the rest of the text.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match (in_tag, c) {
            (false, '<') => in_tag = true,
            (false, c) => out.push(c),
            (true, '>') => in_tag = false,
            (true, _) => {}
        }
    }
    out
}

/// First [`EXCERPT_CHARS`] characters of the tag-stripped body.
pub fn excerpt(body: &str) -> String {
    strip_tags(body).chars().take(EXCERPT_CHARS).collect()
}
