//! Default plaintext extraction for rich-text fields ahead of indexing.
//!
//! Content fields store rich text as a Slate-style tree: a JSON array of element nodes,
//! each either a leaf `{"text": "..."}` or a branch `{"children": [...]}`. The default
//! normalizer flattens that tree and joins every leaf's `text` with a single space, which
//! is what `search-index-item-normalize` does before a plugin gets a chance to override it.

use serde_json::Value;

/// Flattens a Slate-tree value into its plaintext. Non-array/object inputs that are
/// already strings pass through unchanged; anything else yields an empty string.
pub fn flatten_slate_tree(value: &Value) -> String {
    let mut leaves = Vec::new();
    collect_leaves(value, &mut leaves);
    leaves.join(" ")
}

fn collect_leaves(value: &Value, leaves: &mut Vec<String>) {
    match value {
        Value::String(s) => leaves.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_leaves(item, leaves);
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                leaves.push(text.clone());
            }
            if let Some(children) = map.get("children") {
                collect_leaves(children, leaves);
            }
        }
        _ => {}
    }
}

/// Extracts plaintext from every rich-text-shaped value found in `fields`' top-level
/// object entries, joining the results. Scalar fields are ignored; this mirrors the
/// default normalizer only caring about rich-text content, not ordinary metadata.
pub fn extract_plaintext(fields: &Value) -> String {
    let Value::Object(map) = fields else {
        return String::new();
    };
    map.values()
        .filter(|v| v.is_array() || (v.is_object() && v.get("children").is_some()))
        .map(flatten_slate_tree)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_slate_tree_leaves_in_order() {
        let tree = json!([
            {"children": [{"text": "Hello"}, {"text": "world"}]},
            {"children": [{"children": [{"text": "nested"}]}]},
        ]);
        assert_eq!(flatten_slate_tree(&tree), "Hello world nested");
    }

    #[test]
    fn extract_plaintext_ignores_scalar_metadata_fields() {
        let fields = json!({
            "title": "My Post",
            "body": [{"children": [{"text": "Body text"}]}],
            "published": true,
        });
        assert_eq!(extract_plaintext(&fields), "Body text");
    }
}
