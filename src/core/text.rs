use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

static BLOCK_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</li\s*>").expect("valid regex"));
static INLINE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Strip markup from a post body, keeping line structure and decoding entities.
pub fn html_to_text(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return html.trim().to_string();
    }

    let with_breaks = BLOCK_BREAK.replace_all(html, "$0\n");
    let fragment = Html::parse_fragment(&with_breaks);
    let raw: String = fragment.root_element().text().collect();

    let lines: Vec<String> = raw
        .lines()
        .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
        .collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Cut `text` to at most `max` chars, appending `...` when shortened.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("  hello there "), "hello there");
    }

    #[test]
    fn tags_are_stripped_and_entities_decoded() {
        assert_eq!(
            html_to_text("<p>Patch <strong>4.1</strong> is &amp; live</p>"),
            "Patch 4.1 is & live"
        );
    }

    #[test]
    fn breaks_become_newlines() {
        assert_eq!(
            html_to_text("<p>first</p><p>second<br/>third</p>"),
            "first\nsecond\nthird"
        );
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
    }
}
