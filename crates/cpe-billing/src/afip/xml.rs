//! Normalization of AFIP SOAP responses into `serde_json::Value` trees.
//!
//! The waybill and registry services return deeply nested payloads whose key names drift
//! between versions (`cuitDestinatario` vs `cuitDestino`, `pesoBruto` vs
//! `pesoBrutoDescarga`, ...). Converting them to a plain tree and searching by a set of
//! candidate keys keeps the reconciliation code independent of the exact shape.

use roxmltree::{Document, Node};
use serde_json::{Map, Value};

/// Convert an element into a JSON tree.
///
/// Leaf elements become their trimmed text. Elements with children become objects keyed by
/// local tag name in document order; repeated tags collapse into arrays.
pub fn element_to_value(node: Node<'_, '_>) -> Value {
    let mut children = node.children().filter(Node::is_element).peekable();
    if children.peek().is_none() {
        return Value::String(node.text().unwrap_or_default().trim().to_string());
    }

    let mut data = Map::new();
    for child in children {
        let key = child.tag_name().name().to_string();
        let value = element_to_value(child);
        match data.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                data.insert(key, value);
            }
        }
    }
    Value::Object(data)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// First scalar that is neither null, an empty string nor an empty list.
pub fn first_leaf(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => map.values().find_map(first_leaf),
        Value::Array(items) => items.iter().find_map(first_leaf),
        scalar if is_blank(scalar) => None,
        scalar => Some(scalar),
    }
}

/// Search nested objects/arrays for the first non-blank value stored under any of `keys`.
///
/// Each visited object is scanned completely before its nested containers, which are
/// explored last-in first-out. A matching key holding a container yields that container's
/// [`first_leaf`].
pub fn find_first<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let mut stack = vec![data];
    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                for (key, value) in map {
                    let short_key = key.rsplit('}').next().unwrap_or(key.as_str());
                    let nested = matches!(value, Value::Object(_) | Value::Array(_));
                    if keys.contains(&short_key) {
                        if nested {
                            if let Some(leaf) = first_leaf(value) {
                                return Some(leaf);
                            }
                        } else if !is_blank(value) {
                            return Some(value);
                        }
                    }
                    if nested {
                        stack.push(value);
                    }
                }
            }
            Value::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }
    None
}

/// [`find_first`] rendered as trimmed text; blank results count as missing.
pub fn find_first_text(data: &Value, keys: &[&str]) -> Option<String> {
    find_first(data, keys)
        .and_then(scalar_text)
        .filter(|text| !text.is_empty())
}

/// Text form of a scalar JSON value.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Depth-first lookup of `key` anywhere in the tree, returning the raw value.
pub fn deep_get<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    match data {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|value| deep_get(value, key))),
        Value::Array(items) => items.iter().find_map(|value| deep_get(value, key)),
        _ => None,
    }
}

/// First descendant element (including `node` itself) with the given local name.
pub fn find_element<'a, 'input>(
    node: Node<'a, 'input>,
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    node.descendants()
        .find(|candidate| candidate.is_element() && candidate.tag_name().name() == local_name)
}

/// Direct children elements with the given local name.
pub fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    local_name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == local_name)
}

/// Trimmed text of the first direct child with the given local name, empty when missing.
pub fn child_text(node: Node<'_, '_>, local_name: &str) -> String {
    child_elements(node, local_name)
        .next()
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Trimmed text of the first descendant with the given local name.
pub fn descendant_text(node: Node<'_, '_>, local_name: &str) -> Option<String> {
    find_element(node, local_name)
        .and_then(|element| element.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Parse a response body, mapping parser failures into a displayable message.
pub fn parse_document(body: &str) -> Result<Document<'_>, XmlError> {
    Document::parse(body.trim_start_matches('\u{feff}').trim())
        .map_err(|err| XmlError(err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed XML: {0}")]
pub struct XmlError(pub String);
