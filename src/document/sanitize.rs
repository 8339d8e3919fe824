//! Removal of active content from page markup before display.

use super::{Document, NodeData};

/// Elements dropped together with their whole subtree.
const BLOCKED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "frame", "frameset", "noscript",
];

/// Attributes that carry URLs.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "xlink:href", "action", "formaction", "poster"];

pub(super) fn sanitize(doc: &mut Document) {
    let root = doc.root();
    for id in doc.descendants(root) {
        // Nodes under an already removed subtree are skipped.
        if !doc.is_inclusive_descendant(id, root) {
            continue;
        }
        let blocked = doc
            .element_name(id)
            .is_some_and(|name| BLOCKED_ELEMENTS.contains(&name));
        if blocked {
            doc.detach(id);
            continue;
        }
        if let NodeData::Element(element) = &mut doc.node_mut(id).data {
            element.attrs.retain(|(key, value)| {
                if key.starts_with("on") {
                    return false;
                }
                if URL_ATTRIBUTES.contains(&key.as_str()) {
                    let normalized: String = value
                        .chars()
                        .filter(|c| !c.is_whitespace() && !c.is_control())
                        .collect::<String>()
                        .to_ascii_lowercase();
                    return !(normalized.starts_with("javascript:")
                        || normalized.starts_with("vbscript:"));
                }
                true
            });
        }
    }
    doc.normalize(root);
}
