//! Markdown is the canonical rich output; text is the whitespace-normalized
//! plain rendering of the same content.

use htmd::HtmlToMarkdown;

/// Convert an HTML fragment or document to markdown. Script/style/chrome
/// elements are dropped before conversion.
pub fn html_to_markdown(html: &str) -> String {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "iframe"])
        .build();
    match converter.convert(html) {
        Ok(md) => md.trim().to_string(),
        Err(_) => String::new(),
    }
}

/// Collapse all runs of whitespace to single spaces.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text from HTML: markdown conversion first (drops tags and chrome),
/// then markdown syntax stripped down to readable text.
pub fn html_to_text(html: &str) -> String {
    let md = html_to_markdown(html);
    let cleaned: String = md
        .lines()
        .map(|line| {
            line.trim_start_matches('#')
                .trim_start_matches('>')
                .trim_start_matches(['-', '*'])
                .trim()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&cleaned)
}
