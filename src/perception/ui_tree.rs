//! UI hierarchy normalization.
//!
//! Flattens the two hierarchy dialects produced by device drivers into a single
//! pre-ordered list of [`Element`]s:
//! - Android `uiautomator dump`: XML where every node carries `text`,
//!   `content-desc`, `resource-id`, `class` and a `[x1,y1][x2,y2]` bounds string.
//! - HarmonyOS `uitest dumpLayout`: nested JSON objects with `children`.
//!
//! Normalization never fails: malformed input yields an empty list.
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value;

use crate::device::traits::Platform;
use crate::perception::types::Element;

static BOUNDS_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("bounds number regex"));

/// A hierarchy dump exactly as a device returned it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawUiTree {
    /// Attributed tree (Android).
    Xml(String),
    /// Nested keyed object (HarmonyOS).
    Json(Value),
}

impl RawUiTree {
    /// Wraps raw `dumpLayout` output. Invalid JSON becomes `Null`, which normalizes
    /// to an empty element list.
    pub fn from_json_str(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => Self::Json(value),
            Err(e) => {
                tracing::warn!(error = %e, len = raw.len(), "layout dump is not valid JSON");
                Self::Json(Value::Null)
            }
        }
    }
}

impl RawUiTree {
    /// Wraps a dump string in the dialect its platform produces.
    pub fn from_raw_dump(platform: Platform, raw: &str) -> Self {
        match platform {
            Platform::Android => Self::Xml(raw.to_string()),
            Platform::Harmony => Self::from_json_str(raw),
        }
    }
}

pub fn normalize_raw_dump(platform: Platform, raw: &str) -> Vec<Element> {
    normalize(&RawUiTree::from_raw_dump(platform, raw))
}

pub fn normalize(tree: &RawUiTree) -> Vec<Element> {
    match tree {
        RawUiTree::Xml(xml) => parse_android(xml),
        RawUiTree::Json(value) => parse_harmony(value),
    }
}

// ── Android ────────────────────────────────────────────────────────────────

pub fn parse_android(xml: &str) -> Vec<Element> {
    match collect_xml_nodes(xml) {
        Some(elements) => elements,
        None => {
            tracing::debug!(len = xml.len(), "malformed UI hierarchy XML, no elements");
            Vec::new()
        }
    }
}

/// Returns `None` on any syntax error so partial results are never leaked.
fn collect_xml_nodes(xml: &str) -> Option<Vec<Element>> {
    let mut reader = Reader::from_str(xml);
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(node)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
                push_xml_node(&node, &mut elements)?;
            }
            Ok(Event::Empty(node)) => {
                if depth == 0 {
                    roots += 1;
                }
                push_xml_node(&node, &mut elements)?;
            }
            Ok(Event::End(_)) => {
                depth = depth.checked_sub(1)?;
            }
            Ok(Event::Text(text)) => {
                // Character data outside the root element is not a document.
                if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
        if roots > 1 {
            return None;
        }
    }

    (depth == 0 && roots == 1).then_some(elements)
}

fn push_xml_node(node: &BytesStart<'_>, out: &mut Vec<Element>) -> Option<()> {
    let mut text = String::new();
    let mut description = String::new();
    let mut identifier = String::new();
    let mut class_name = String::new();
    let mut bounds = String::new();

    for attr in node.attributes() {
        let attr = attr.ok()?;
        let value = attr.unescape_value().ok()?.into_owned();
        match attr.key.as_ref() {
            b"text" => text = value,
            b"content-desc" => description = value,
            b"resource-id" => identifier = value,
            b"class" => class_name = value,
            b"bounds" => bounds = value,
            _ => {}
        }
    }

    let element = Element::new(text, description, identifier, class_name, parse_bounds(&bounds));
    if element.is_addressable() {
        out.push(element);
    }
    Some(())
}

/// Parses `"[x1,y1][x2,y2]"`. Anything that does not contain exactly four
/// integers yields `[0, 0, 0, 0]`.
pub fn parse_bounds(bounds: &str) -> [i32; 4] {
    let numbers: Vec<i32> = BOUNDS_NUMBER
        .find_iter(bounds)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    match numbers.as_slice() {
        [x1, y1, x2, y2] => [*x1, *y1, *x2, *y2],
        _ => [0, 0, 0, 0],
    }
}

// ── HarmonyOS ──────────────────────────────────────────────────────────────

pub fn parse_harmony(root: &Value) -> Vec<Element> {
    let mut elements = Vec::new();
    if root.is_object() {
        walk_harmony(root, &mut elements);
    }
    elements
}

fn walk_harmony(node: &Value, out: &mut Vec<Element>) {
    // Newer dumps nest node data under `attributes`; older ones keep it inline.
    let attrs = node
        .get("attributes")
        .filter(|a| a.is_object())
        .unwrap_or(node);

    let field = |key: &str| -> String {
        attrs
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let element = Element::new(
        field("text"),
        field("description"),
        field("id"),
        field("type"),
        harmony_bounds(attrs.get("bounds")),
    );
    if element.is_addressable() {
        out.push(element);
    }

    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children.iter().filter(|c| c.is_object()) {
            walk_harmony(child, out);
        }
    }
}

fn harmony_bounds(bounds: Option<&Value>) -> [i32; 4] {
    match bounds {
        Some(Value::String(s)) => parse_bounds(s),
        Some(obj @ Value::Object(_)) => {
            let side = |key: &str| {
                obj.get(key)
                    .and_then(Value::as_i64)
                    .and_then(|v| i32::try_from(v).ok())
                    .unwrap_or(0)
            };
            [side("left"), side("top"), side("right"), side("bottom")]
        }
        _ => [0, 0, 0, 0],
    }
}
