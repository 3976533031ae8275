//! Selector catalogue for the OCR site's markup.
//!
//! Everything the driver knows about the target UI lives here: which elements
//! look like rendered pages, which buttons start processing or open the raw
//! view, and where the raw-view dialog keeps its headings. The values are
//! reverse-engineered from one site and are expected to drift, so they are
//! plain configuration rather than literals inside the engine.

use serde::{Deserialize, Serialize};

/// CSS selector optionally narrowed to elements whose rendered text contains
/// a fragment (the equivalent of Playwright's `:has-text()`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSelector {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ControlSelector {
    pub fn new(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: Some(text.into()),
        }
    }
}

/// Full set of selectors used by the navigator and the result extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteSelectors {
    /// Elements hypothesised to hold one rendered output page each.
    pub page_containers: String,
    /// Candidate raw-text output blocks.
    pub text_blocks: String,
    pub images: String,
    pub consent_control: ControlSelector,
    pub file_input: String,
    pub start_control: ControlSelector,
    /// Text shown inside a container while its page is still being processed.
    pub processing_text: String,
    pub loading_indicators: String,
    pub raw_control: ControlSelector,
    pub dialog: String,
    pub dialog_heading: String,
    pub dialog_preformatted: String,
    pub dialog_close: ControlSelector,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            page_containers: "[data-page-index], .page, .result-page, .ocr-page, .page-result, \
                              .page-block, article, .css-lffl6r"
                .to_string(),
            text_blocks: "pre, code, textarea".to_string(),
            images: "img".to_string(),
            consent_control: ControlSelector::with_text("button", "Accept"),
            file_input: "input[type=\"file\"]".to_string(),
            start_control: ControlSelector::with_text("button", "Process Document"),
            processing_text: "Processing...".to_string(),
            loading_indicators: ".css-12nj87g, [aria-label=\"Loading…\"], [role=\"progressbar\"]"
                .to_string(),
            raw_control: ControlSelector::with_text("button", "View Raw"),
            dialog: "section[role=\"dialog\"], div[role=\"dialog\"]".to_string(),
            dialog_heading: "h3".to_string(),
            dialog_preformatted: "pre".to_string(),
            dialog_close: ControlSelector::with_text("button", "Close"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_cover_every_container_variant() {
        let selectors = SiteSelectors::default();
        for fragment in [
            "[data-page-index]",
            ".result-page",
            ".ocr-page",
            ".page-block",
            "article",
            ".css-lffl6r",
        ] {
            assert!(
                selectors.page_containers.contains(fragment),
                "missing container selector {fragment}"
            );
        }
        assert_eq!(selectors.raw_control.text.as_deref(), Some("View Raw"));
    }

    #[test]
    fn partial_overrides_keep_remaining_defaults() {
        let selectors: SiteSelectors = serde_json::from_value(json!({
            "pageContainers": ".custom-page",
            "rawControl": { "css": "a.raw" }
        }))
        .expect("selectors parse");

        assert_eq!(selectors.page_containers, ".custom-page");
        assert_eq!(selectors.raw_control, ControlSelector::new("a.raw"));
        assert_eq!(selectors.dialog_heading, "h3");
    }
}
