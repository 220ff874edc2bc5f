//! Hidden web-forms state echoed back on every postback.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static VIEWSTATE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name='__VIEWSTATE']").expect("viewstate selector"));
static VIEWSTATE_GENERATOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("input[name='__VIEWSTATEGENERATOR']").expect("viewstate generator selector")
});
static EVENT_VALIDATION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("input[name='__EVENTVALIDATION']").expect("event validation selector")
});

/// Anti-tamper tokens captured from one page response.
///
/// A postback must carry the tokens of the response immediately before it,
/// so the value is threaded through the postback loop and replaced after
/// every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub viewstate: String,
    pub viewstate_generator: String,
    pub event_validation: String,
}

impl FormState {
    /// Read all three hidden fields. `None` if any input is absent.
    pub fn from_document(document: &Html) -> Option<Self> {
        let read = |selector: &Selector| {
            document
                .select(selector)
                .next()
                .map(|input| input.value().attr("value").unwrap_or_default().to_string())
        };

        Some(Self {
            viewstate: read(&*VIEWSTATE)?,
            viewstate_generator: read(&*VIEWSTATE_GENERATOR)?,
            event_validation: read(&*EVENT_VALIDATION)?,
        })
    }

    pub fn from_html(html: &str) -> Option<Self> {
        Self::from_document(&Html::parse_document(html))
    }

    /// The hidden fields as form pairs, in page order.
    pub fn fields(&self) -> [(&'static str, &str); 3] {
        [
            ("__VIEWSTATE", &self.viewstate),
            ("__VIEWSTATEGENERATOR", &self.viewstate_generator),
            ("__EVENTVALIDATION", &self.event_validation),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_hidden_fields() {
        let html = r#"<form>
            <input type="hidden" name="__VIEWSTATE" value="vs1" />
            <input type="hidden" name="__VIEWSTATEGENERATOR" value="C2EE9ABB" />
            <input type="hidden" name="__EVENTVALIDATION" value="ev1" />
        </form>"#;

        let state = FormState::from_html(html).unwrap();
        assert_eq!(state.viewstate, "vs1");
        assert_eq!(state.viewstate_generator, "C2EE9ABB");
        assert_eq!(state.event_validation, "ev1");
        assert_eq!(state.fields()[2], ("__EVENTVALIDATION", "ev1"));
    }

    #[test]
    fn test_missing_field_is_none() {
        let html = r#"<input name="__VIEWSTATE" value="vs1" /><input name="__EVENTVALIDATION" value="ev1" />"#;
        assert_eq!(FormState::from_html(html), None);
    }

    #[test]
    fn test_missing_value_is_empty() {
        let html = r#"<input name="__VIEWSTATE" /><input name="__VIEWSTATEGENERATOR" value="" /><input name="__EVENTVALIDATION" value="x" />"#;
        let state = FormState::from_html(html).unwrap();
        assert_eq!(state.viewstate, "");
    }
}
