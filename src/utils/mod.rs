//! Utility functions and helpers.

pub mod url;

use scraper::ElementRef;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &::url::Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(element: &ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Non-empty, trimmed text nodes of an element in document order.
pub fn text_nodes<'a>(element: &ElementRef<'a>) -> Vec<&'a str> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn test_resolve_url() {
        let base = ::url::Url::parse("https://cms.example.edu/apps/student/").unwrap();
        assert_eq!(
            resolve_url(&base, "/content/file.pdf"),
            "https://cms.example.edu/content/file.pdf"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  CSEN \n\t 401  "), "CSEN 401");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_text_helpers() {
        let html = Html::parse_fragment("<div> CSEN   401 <small>Tut</small>\n<b> </b>H14</div>");
        let sel = Selector::parse("div").unwrap();
        let div = html.select(&sel).next().unwrap();

        assert_eq!(element_text(&div), "CSEN 401 Tut H14");
        assert_eq!(text_nodes(&div), vec!["CSEN   401", "Tut", "H14"]);
    }
}
