use serde_json::{Map, Value};

/// Applies `overlay` on top of `base`. Objects merge key by key; every other
/// value present in the overlay (arrays included) replaces the base value.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Minimal delta turning `default` into `current`, or `None` when nothing
/// needs to be recorded. Sequences are compared as a whole.
pub fn diff(default: Option<&Value>, current: Option<&Value>) -> Option<Value> {
    let current = current?;
    let Some(default) = default else {
        return Some(current.clone());
    };
    if default == current {
        return None;
    }
    match (default, current) {
        (Value::Object(default_map), Value::Object(current_map)) => {
            let mut delta = Map::new();
            for (key, value) in current_map {
                if let Some(changed) = diff(default_map.get(key), Some(value)) {
                    delta.insert(key.clone(), changed);
                }
            }
            (!delta.is_empty()).then_some(Value::Object(delta))
        }
        _ => Some(current.clone()),
    }
}

/// Runs [`diff`] over the named top-level sections only.
pub fn diff_sections<S: AsRef<str>>(
    default: &Value,
    current: &Value,
    sections: &[S],
) -> Map<String, Value> {
    let mut delta = Map::new();
    for section in sections {
        let key = section.as_ref();
        if let Some(changed) = diff(default.get(key), current.get(key)) {
            delta.insert(key.to_string(), changed);
        }
    }
    delta
}

/// Removes `object.field` from a top-level object if both exist.
pub(crate) fn strip_field(document: &mut Value, object: &str, field: &str) {
    if let Some(Value::Object(section)) = document.get_mut(object) {
        section.remove(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_recursive_for_objects_only() {
        let mut base = json!({
            "pdfOptions": { "pdfEngine": 2, "compactPdfText": 0 },
            "textFileTypes": [".txt", ".md"],
            "locale": 2
        });
        merge(
            &mut base,
            json!({
                "pdfOptions": { "pdfEngine": 1 },
                "textFileTypes": [".srt"],
                "dictionary": "custom"
            }),
        );
        assert_eq!(
            base,
            json!({
                "pdfOptions": { "pdfEngine": 1, "compactPdfText": 0 },
                "textFileTypes": [".srt"],
                "locale": 2,
                "dictionary": "custom"
            })
        );
    }

    #[test]
    fn diff_rules() {
        let default = json!({ "a": 1, "nested": { "x": 1, "y": 2 }, "list": [1, 2, 3] });

        assert_eq!(diff(Some(&default), None), None);
        assert_eq!(diff(None, Some(&json!(5))), Some(json!(5)));
        assert_eq!(diff(Some(&default), Some(&default)), None);

        let current = json!({ "a": 1, "nested": { "x": 1, "y": 3 }, "list": [1, 2, 4] });
        assert_eq!(
            diff(Some(&default), Some(&current)),
            Some(json!({ "nested": { "y": 3 }, "list": [1, 2, 4] }))
        );
    }

    #[test]
    fn diff_drops_objects_that_only_lost_keys() {
        let default = json!({ "nested": { "x": 1, "y": 2 } });
        let current = json!({ "nested": { "x": 1 } });
        assert_eq!(diff(Some(&default), Some(&current)), None);
    }

    #[test]
    fn scalar_replacing_object_is_verbatim() {
        let default = json!({ "mode": { "value": 2 } });
        let current = json!({ "mode": 3 });
        assert_eq!(
            diff(Some(&default), Some(&current)),
            Some(json!({ "mode": 3 }))
        );
    }

    #[test]
    fn sections_limit_the_diff() {
        let default = json!({ "locale": 2, "charCheck": 50, "languages": [] });
        let current = json!({ "locale": 1, "charCheck": 50, "languages": [{ "id": 9 }] });
        let delta = diff_sections(&default, &current, &["locale", "charCheck"]);
        assert_eq!(Value::Object(delta), json!({ "locale": 1 }));
    }

    #[test]
    fn merging_a_diff_restores_current() {
        let default = json!({ "pdfOptions": { "pdfEngine": 2, "addPdfPageHeader": 0 }, "locale": 2 });
        let current = json!({ "pdfOptions": { "pdfEngine": 1, "addPdfPageHeader": 0 }, "locale": 3 });
        let delta = diff(Some(&default), Some(&current)).expect("delta");
        let mut restored = default.clone();
        merge(&mut restored, delta);
        assert_eq!(restored, current);
    }
}
