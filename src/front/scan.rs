//! Selection of the schemas inside a document
//!
//! A document may hold schemas at arbitrary depths (`/definitions/*`,
//! `/components/schemas/*`, ...). The name map decides: every in-file path it
//! matches is a schema and is not descended into.

use indexmap::IndexMap;
use serde_json::Value;

use crate::name_map::NameMap;

/// Collect `in-file path -> raw schema` for every path matched by `name_map`,
/// in document order.
pub fn extract_schemas_to_scan(document: &Value, name_map: &NameMap) -> IndexMap<String, Value> {
    let mut found = IndexMap::new();
    visit(document, String::new(), name_map, &mut found);
    found
}

fn visit(value: &Value, path: String, name_map: &NameMap, found: &mut IndexMap<String, Value>) {
    if !path.is_empty() && name_map.matches(&path) {
        found.insert(path, value.clone());
        return;
    }
    if let Value::Object(object) = value {
        for (key, child) in object {
            let segment = key.replace('~', "~0").replace('/', "~1");
            visit(child, format!("{path}/{segment}"), name_map, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_by_name_map() {
        let document = json!({
            "info": {"title": "ignored"},
            "definitions": {
                "A": {"type": "string"},
                "B": {"type": "object", "properties": {"x": {"type": "integer"}}}
            }
        });
        let map = NameMap::from_rules(&["/definitions/([^/]*)={0}"]).unwrap();
        let found = extract_schemas_to_scan(&document, &map);
        let keys: Vec<&str> = found.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["/definitions/A", "/definitions/B"]);
    }

    #[test]
    fn test_matched_paths_not_descended() {
        let document = json!({"definitions": {"A": {"definitions": {"B": {"type": "string"}}}}});
        let map = NameMap::from_rules(&[
            "/definitions/([^/]*)={0}",
            "/definitions/A/definitions/([^/]*)={0}",
        ])
        .unwrap();
        let found = extract_schemas_to_scan(&document, &map);
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("/definitions/A"));
    }
}
