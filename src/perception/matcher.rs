use crate::perception::types::Element;

/// Case-insensitive substring match over text, description and identifier.
///
/// An element matches when *any* of the three fields contains `query`.
/// Source order is preserved and no ranking is applied.
pub fn fuzzy_match(query: &str, elements: &[Element]) -> Vec<Element> {
    let needle = query.to_lowercase();
    elements
        .iter()
        .filter(|e| {
            [&e.text, &e.description, &e.identifier]
                .into_iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}
