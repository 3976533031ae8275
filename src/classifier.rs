//! Decides which output shape, if any, a poll observation shows.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{PageSummary, PollObservation};

/// Thresholds that separate real OCR output from UI chrome such as headers
/// or labels rendered in `pre`/`code` blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextSignalHeuristics {
    /// Trimmed length must be strictly greater than this.
    pub min_length: usize,
    /// Line count must be strictly greater than this.
    pub min_lines: usize,
    pub json_prefixes: Vec<char>,
}

impl Default for TextSignalHeuristics {
    fn default() -> Self {
        Self {
            min_length: 200,
            min_lines: 3,
            json_prefixes: vec!['[', '{'],
        }
    }
}

impl TextSignalHeuristics {
    pub fn is_signal(&self, block: &str) -> bool {
        let trimmed = block.trim();
        trimmed.chars().count() > self.min_length
            || trimmed.split('\n').count() > self.min_lines
            || trimmed
                .chars()
                .next()
                .is_some_and(|first| self.json_prefixes.contains(&first))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    RawText(Vec<String>),
    Pages(Vec<PageSummary>),
    /// Something was detected but it fits neither known shape.
    Unrecognized(JsonValue),
}

pub trait Classifier: Send + Sync {
    /// `None` means nothing recognisable yet; keep polling.
    fn classify(&self, observation: &PollObservation, page_limit: usize)
    -> Option<Classification>;
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    heuristics: TextSignalHeuristics,
}

impl HeuristicClassifier {
    pub fn new(heuristics: TextSignalHeuristics) -> Self {
        Self { heuristics }
    }

    /// Blocks that carry real content, in page order and untrimmed.
    pub fn signal_blocks(&self, blocks: &[String]) -> Vec<String> {
        blocks
            .iter()
            .filter(|block| self.heuristics.is_signal(block))
            .cloned()
            .collect()
    }
}

impl Classifier for HeuristicClassifier {
    fn classify(
        &self,
        observation: &PollObservation,
        page_limit: usize,
    ) -> Option<Classification> {
        let signal = self.signal_blocks(&observation.text_blocks);
        if !signal.is_empty() {
            return Some(Classification::RawText(signal));
        }

        if !observation.containers.is_empty() {
            let pages = observation
                .containers
                .iter()
                .take(page_limit)
                .enumerate()
                .map(|(i, container)| PageSummary {
                    index: i + 1,
                    text: Some(container.text.clone()).filter(|text| !text.is_empty()),
                    images: container.images.clone(),
                })
                .collect();
            return Some(Classification::Pages(pages));
        }

        if !observation.images.is_empty() {
            let pages = observation
                .images
                .iter()
                .take(page_limit)
                .enumerate()
                .map(|(i, image)| PageSummary {
                    index: i + 1,
                    text: None,
                    images: vec![image.clone()],
                })
                .collect();
            return Some(Classification::Pages(pages));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContainerSnapshot, ImageRef};

    fn image(src: &str) -> ImageRef {
        ImageRef {
            src: src.to_string(),
            alt: String::new(),
        }
    }

    #[test]
    fn heuristic_thresholds_are_strict() {
        let heuristics = TextSignalHeuristics::default();
        assert!(!heuristics.is_signal(&"a".repeat(200)));
        assert!(heuristics.is_signal(&"a".repeat(201)));
        assert!(!heuristics.is_signal("one\ntwo\nthree"));
        assert!(heuristics.is_signal("one\ntwo\nthree\nfour"));
        assert!(!heuristics.is_signal("\n\none\ntwo\nthree\n\n"));
        assert!(heuristics.is_signal("  {\"page\": 1}"));
        assert!(heuristics.is_signal("[1]"));
        assert!(!heuristics.is_signal("Raw output"));
    }

    #[test]
    fn text_blocks_win_over_containers() {
        let observation = PollObservation {
            containers: vec![ContainerSnapshot {
                text: "page".into(),
                images: vec![],
            }],
            images: vec![image("https://cdn/p1.png")],
            text_blocks: vec!["Header".into(), "{\"a\":1}".into()],
        };

        let result = HeuristicClassifier::default().classify(&observation, 10);
        assert_eq!(
            result,
            Some(Classification::RawText(vec!["{\"a\":1}".into()]))
        );
    }

    #[test]
    fn header_like_blocks_fall_through_to_pages() {
        let observation = PollObservation {
            containers: vec![
                ContainerSnapshot {
                    text: "First page".into(),
                    images: vec![image("https://cdn/p1.png")],
                },
                ContainerSnapshot {
                    text: String::new(),
                    images: vec![],
                },
            ],
            images: vec![],
            text_blocks: vec!["Markdown".into(), "JSON".into()],
        };

        let Some(Classification::Pages(pages)) =
            HeuristicClassifier::default().classify(&observation, 10)
        else {
            panic!("expected pages");
        };
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].index, 1);
        assert_eq!(pages[0].text.as_deref(), Some("First page"));
        assert_eq!(pages[0].images.len(), 1);
        assert_eq!(pages[1].index, 2);
        assert_eq!(pages[1].text, None);
    }

    #[test]
    fn images_without_containers_become_pages() {
        let observation = PollObservation {
            containers: vec![],
            images: vec![image("a.png"), image("b.png"), image("c.png")],
            text_blocks: vec![],
        };

        let Some(Classification::Pages(pages)) =
            HeuristicClassifier::default().classify(&observation, 2)
        else {
            panic!("expected pages");
        };
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|page| page.text.is_none()));
        assert_eq!(pages[1].images[0].src, "b.png");
    }

    #[test]
    fn page_limit_caps_containers() {
        let observation = PollObservation {
            containers: vec![ContainerSnapshot::default(); 12],
            images: vec![],
            text_blocks: vec![],
        };
        let Some(Classification::Pages(pages)) =
            HeuristicClassifier::default().classify(&observation, 10)
        else {
            panic!("expected pages");
        };
        assert_eq!(pages.len(), 10);
        assert_eq!(pages.last().map(|page| page.index), Some(10));
    }

    #[test]
    fn containers_take_precedence_over_loose_images() {
        let observation = PollObservation {
            containers: vec![ContainerSnapshot {
                text: "c".into(),
                images: vec![image("https://cdn/inner.png")],
            }],
            images: vec![image("https://cdn/a.png"), image("https://cdn/b.png")],
            text_blocks: vec!["Markdown".into(), "JSON".into()],
        };

        let Some(Classification::Pages(pages)) =
            HeuristicClassifier::default().classify(&observation, 10)
        else {
            panic!("expected pages");
        };
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].index, 1);
        assert_eq!(pages[0].text.as_deref(), Some("c"));
        assert_eq!(pages[0].images, vec![image("https://cdn/inner.png")]);
    }

    #[test]
    fn long_block_wins_over_containers_and_images() {
        let long = "x".repeat(201);
        let observation = PollObservation {
            containers: vec![ContainerSnapshot {
                text: "c".into(),
                images: vec![],
            }],
            images: vec![image("https://cdn/a.png"), image("https://cdn/b.png")],
            text_blocks: vec!["Header".into(), long.clone()],
        };

        assert_eq!(
            HeuristicClassifier::default().classify(&observation, 10),
            Some(Classification::RawText(vec![long]))
        );
    }

    #[test]
    fn empty_observation_keeps_polling() {
        assert_eq!(
            HeuristicClassifier::default().classify(&PollObservation::default(), 10),
            None
        );
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let classifier = HeuristicClassifier::new(TextSignalHeuristics {
            min_length: 5,
            min_lines: 100,
            json_prefixes: vec![],
        });
        let observation = PollObservation {
            text_blocks: vec!["short".into(), "longer text".into(), "{x".into()],
            ..PollObservation::default()
        };
        assert_eq!(
            classifier.classify(&observation, 10),
            Some(Classification::RawText(vec!["longer text".into()]))
        );
    }
}
