//! Lenient reading of `application/ld+json` blocks.

use crate::text::decode_entities;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
});

/// The three top-level layouts a JSON-LD block comes in.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonLdShape {
    /// `{"@context": ..., "@graph": [...]}`
    Graph(Vec<Value>),
    /// `[{...}, {...}]`
    List(Vec<Value>),
    /// `{...}`
    Single(Map<String, Value>),
}

impl JsonLdShape {
    pub fn classify(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(JsonLdShape::List(items)),
            Value::Object(mut map) => match map.remove("@graph") {
                Some(Value::Array(items)) => Some(JsonLdShape::Graph(items)),
                Some(other) => {
                    map.insert("@graph".to_string(), other);
                    Some(JsonLdShape::Single(map))
                }
                None => Some(JsonLdShape::Single(map)),
            },
            _ => None,
        }
    }

    /// Candidate entities, in document order. Non-object members are dropped.
    pub fn into_entities(self) -> Vec<Map<String, Value>> {
        let items = match self {
            JsonLdShape::Graph(items) | JsonLdShape::List(items) => items,
            JsonLdShape::Single(map) => return vec![map],
        };
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()
    }
}

/// Decode one script body: as-is, then entity-decoded, then with control
/// characters stripped.
pub fn decode_block(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }

    let unescaped = decode_entities(raw);
    if let Ok(value) = serde_json::from_str(&unescaped) {
        debug!("JSON-LD recovered after entity decoding");
        return Some(value);
    }

    let stripped: String = unescaped.chars().filter(|c| !c.is_control()).collect();
    match serde_json::from_str(&stripped) {
        Ok(value) => {
            debug!("JSON-LD recovered after stripping control characters");
            Some(value)
        }
        Err(e) => {
            debug!("Unreadable JSON-LD block: {}", e);
            None
        }
    }
}

/// Every entity from every decodable JSON-LD block in the document.
pub fn entities(document: &Html) -> Vec<Map<String, Value>> {
    document
        .select(&LD_JSON)
        .filter_map(|script| decode_block(&script.text().collect::<String>()))
        .filter_map(JsonLdShape::classify)
        .flat_map(JsonLdShape::into_entities)
        .collect()
}

/// Whether an entity's `@type` is, or lists, `wanted` (case-insensitive).
pub fn has_type(entity: &Map<String, Value>, wanted: &str) -> bool {
    match entity.get("@type") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case(wanted),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| t.eq_ignore_ascii_case(wanted)),
        _ => false,
    }
}

/// The first Product entity on the page, if any.
pub fn find_product(document: &Html) -> Option<Map<String, Value>> {
    entities(document).into_iter().find(|e| has_type(e, "Product"))
}
