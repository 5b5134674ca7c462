//! Formatting utilities (escaping per render mode, preview trimming, links).

use std::sync::OnceLock;

use regex::Regex;

use crate::messaging::types::RenderMode;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn escape_for(mode: RenderMode, text: &str) -> String {
    match mode {
        RenderMode::Html => escape_html(text),
        RenderMode::Markdown => escape_markdown(text),
        RenderMode::Plain => text.to_string(),
    }
}

/// A link in the given mode. Plain mode degrades to `text (url)`.
pub fn link(mode: RenderMode, text: &str, url: &str) -> String {
    match mode {
        RenderMode::Html => format!("<a href=\"{}\">{}</a>", escape_html(url), escape_html(text)),
        RenderMode::Markdown => format!("[{}]({url})", escape_markdown(text)),
        RenderMode::Plain => format!("{text} ({url})"),
    }
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"))
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n+").expect("valid regex"))
}

/// Build the preview shown under a content title.
///
/// Strips markup from the feed description, collapses blank lines and cuts it to
/// `limit` characters. A limit of 0 disables previews entirely.
pub fn trim_description(desc: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }

    let text = html_tag_re().replace_all(desc, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    let text = blank_lines_re().replace_all(text.trim(), "\n");

    if text.chars().count() <= limit {
        return text.into_owned();
    }
    text.chars().take(limit).collect::<String>().trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn escapes_markdown_markup() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
    }

    #[test]
    fn links_per_mode() {
        assert_eq!(
            link(RenderMode::Html, "A&B", "https://x.y/?a=1&b=2"),
            "<a href=\"https://x.y/?a=1&amp;b=2\">A&amp;B</a>"
        );
        assert_eq!(
            link(RenderMode::Markdown, "my_feed", "https://x.y"),
            "[my\\_feed](https://x.y)"
        );
        assert_eq!(link(RenderMode::Plain, "t", "u"), "t (u)");
    }

    #[test]
    fn zero_limit_disables_preview() {
        assert_eq!(trim_description("anything", 0), "");
    }

    #[test]
    fn preview_strips_tags_and_truncates_by_chars() {
        let desc = "\n<p>Привет <b>мир</b></p>\n\n\n<p>second</p>\n";
        assert_eq!(trim_description(desc, 100), "Привет мир\nsecond");
        assert_eq!(trim_description(desc, 6), "Привет");
    }

    #[test]
    fn preview_decodes_common_entities() {
        assert_eq!(trim_description("a &amp; b&nbsp;c", 50), "a & b c");
    }
}
