//! Three-tier decision between tapping a UI-tree element, asking the caller
//! to disambiguate, or falling back to vision.
use std::collections::HashSet;

use crate::agent_engine::state::Strategy;
use crate::perception::matcher::fuzzy_match;
use crate::perception::types::Element;

/// Action verbs stripped from an instruction before matching. "点击" precedes "点".
const ACTION_VERBS: &[&str] = &["点击", "点", "按", "选择", "打开", "进入", "找到", "tap", "click"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one element matched: tap its center.
    UiTree(Element),
    /// Several distinct elements matched; the caller has to choose.
    Disambiguate(Vec<Element>),
    /// Nothing structural matched.
    Vision,
}

impl Resolution {
    pub fn strategy(&self) -> Strategy {
        match self {
            Resolution::UiTree(_) => Strategy::UiTree,
            Resolution::Disambiguate(_) => Strategy::Disambiguate,
            Resolution::Vision => Strategy::Vision,
        }
    }
}

/// Strips action verbs and splits the remainder on whitespace. An instruction made
/// only of verbs is kept whole as its single keyword.
pub fn extract_keywords(instruction: &str) -> Vec<String> {
    let mut stripped = instruction.to_string();
    for verb in ACTION_VERBS {
        stripped = stripped.replace(verb, " ");
    }
    let keywords: Vec<String> = stripped.split_whitespace().map(String::from).collect();
    if keywords.is_empty() {
        let whole = instruction.trim();
        if whole.is_empty() {
            return Vec::new();
        }
        return vec![whole.to_string()];
    }
    keywords
}

/// Elements matching any keyword, deduplicated by center (first wins).
pub fn candidates(instruction: &str, elements: &[Element]) -> Vec<Element> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for keyword in extract_keywords(instruction) {
        for element in fuzzy_match(&keyword, elements) {
            if seen.insert(element.center) {
                found.push(element);
            }
        }
    }
    found
}

pub fn resolve(instruction: &str, elements: &[Element]) -> Resolution {
    let mut found = candidates(instruction, elements);
    tracing::debug!(instruction, candidates = found.len(), "structural match");
    match found.len() {
        0 => Resolution::Vision,
        1 => Resolution::UiTree(found.remove(0)),
        _ => Resolution::Disambiguate(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(text: &str, desc: &str, bounds: [i32; 4]) -> Element {
        Element::new(text, desc, "", "android.widget.TextView", bounds)
    }

    fn screen() -> Vec<Element> {
        vec![
            el("外卖", "", [100, 200, 300, 260]),
            el("Settings", "", [0, 0, 100, 50]),
            el("", "Settings gear", [0, 0, 100, 50]),
            el("Settings", "", [0, 60, 100, 110]),
        ]
    }

    #[test]
    fn keywords_drop_verbs() {
        assert_eq!(extract_keywords("点击外卖"), vec!["外卖"]);
        assert_eq!(extract_keywords("tap Settings"), vec!["Settings"]);
        assert_eq!(extract_keywords("进入 我的  订单"), vec!["我的", "订单"]);
    }

    #[test]
    fn verb_only_instruction_is_its_own_keyword() {
        assert_eq!(extract_keywords("点击"), vec!["点击"]);
        assert_eq!(extract_keywords(" tap "), vec!["tap"]);
        assert!(extract_keywords("   ").is_empty());
    }

    #[test]
    fn single_match_taps_center() {
        let elements = vec![el("外卖", "", [100, 200, 300, 260])];
        match resolve("点击外卖", &elements) {
            Resolution::UiTree(e) => assert_eq!(e.center, (200, 230)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn distinct_centers_need_disambiguation() {
        match resolve("tap Settings", &screen()) {
            Resolution::Disambiguate(c) => {
                assert_eq!(c.len(), 2);
                assert_eq!(c[0].center, (50, 25));
                assert_eq!(c[1].center, (50, 85));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shared_center_collapses_to_one() {
        let elements = vec![
            el("Settings", "", [0, 0, 100, 50]),
            el("", "Settings gear", [0, 0, 100, 50]),
        ];
        match resolve("tap Settings", &elements) {
            Resolution::UiTree(e) => assert_eq!(e.text, "Settings"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unmatched_instruction_goes_to_vision() {
        assert_eq!(resolve("点击购物车", &screen()), Resolution::Vision);
        assert_eq!(resolve("点击", &screen()), Resolution::Vision);
        assert_eq!(resolve("外卖", &[]), Resolution::Vision);
        assert_eq!(resolve("", &screen()), Resolution::Vision);
    }

    #[test]
    fn strategy_tags() {
        assert_eq!(Resolution::Vision.strategy(), Strategy::Vision);
        assert_eq!(
            Resolution::Disambiguate(vec![]).strategy(),
            Strategy::Disambiguate
        );
    }

    #[test]
    fn single_settings_row() {
        let elements = vec![el("Settings", "", [0, 0, 100, 50])];
        assert_eq!(extract_keywords("tap Settings"), vec!["Settings"]);
        let resolution = resolve("tap Settings", &elements);
        assert_eq!(resolution.strategy(), Strategy::UiTree);
        assert!(matches!(resolution, Resolution::UiTree(e) if e.center == (50, 25)));
    }

    #[test]
    fn three_settings_rows() {
        let elements = vec![
            el("Settings", "", [0, 0, 100, 50]),
            el("Settings Center", "", [0, 60, 100, 110]),
            el("Advanced Settings", "", [0, 120, 100, 170]),
        ];
        match resolve("tap Settings", &elements) {
            Resolution::Disambiguate(candidates) => assert_eq!(candidates.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_screen_goes_to_vision() {
        assert_eq!(resolve("tap the blue icon", &[]), Resolution::Vision);
    }
}
