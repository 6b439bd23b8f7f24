use serde::{Deserialize, Serialize};

/// A normalized on-screen UI node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub text: String,
    pub description: String,
    pub identifier: String,
    /// Widget class (`class` on Android, `type` on HarmonyOS). Informational only.
    #[serde(default)]
    pub class_name: String,
    /// `[left, top, right, bottom]` in device pixels.
    pub bounds: [i32; 4],
    pub center: (i32, i32),
}

impl Element {
    /// Builds an element and derives its center from `bounds`.
    pub fn new(
        text: impl Into<String>,
        description: impl Into<String>,
        identifier: impl Into<String>,
        class_name: impl Into<String>,
        bounds: [i32; 4],
    ) -> Self {
        Self {
            text: text.into(),
            description: description.into(),
            identifier: identifier.into(),
            class_name: class_name.into(),
            bounds,
            center: center_of(bounds),
        }
    }

    /// An element with no text, description or identifier carries nothing to match on.
    pub fn is_addressable(&self) -> bool {
        !self.text.is_empty() || !self.description.is_empty() || !self.identifier.is_empty()
    }

    /// Best human-readable label, used in logs and step messages.
    pub fn label(&self) -> &str {
        [&self.text, &self.description, &self.identifier]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Integer midpoint of a `[left, top, right, bottom]` box (floor division).
pub fn center_of(bounds: [i32; 4]) -> (i32, i32) {
    let [left, top, right, bottom] = bounds;
    (midpoint(left, right), midpoint(top, bottom))
}

// Widened so extreme bounds cannot overflow; the floor midpoint of two i32s is an i32.
fn midpoint(a: i32, b: i32) -> i32 {
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

/// Output of the vision fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [i32; 4],
    pub center: (i32, i32),
}

impl Detection {
    pub fn from_bbox(bbox: [i32; 4]) -> Self {
        Self {
            bbox,
            center: center_of(bbox),
        }
    }
}
