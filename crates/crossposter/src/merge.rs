//! Deep merge of profile documents.
//!
//! A user profile is a named base document with a per-user override laid on
//! top. The merge is a pure function over the JSON tree: objects merge
//! recursively, everything else (scalars and arrays) is replaced by the
//! override, and base-only keys survive.

use serde_json::Value;

/// Merge `overlay` onto `base`, returning the combined document.
#[must_use]
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        // Arrays and scalars replace; an overlay null wins too.
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_scalars_replace() {
        let merged = merge(json!({"a": 1, "b": 2}), json!({"b": 3}));
        assert_eq!(merged, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn objects_merge_recursively() {
        let base = json!({"confs": {"enableTags": true, "skipHashtag": "nocp"}});
        let overlay = json!({"confs": {"enableTags": false}});

        assert_eq!(
            merge(base, overlay),
            json!({"confs": {"enableTags": false, "skipHashtag": "nocp"}})
        );
    }

    #[test]
    fn arrays_replace_wholesale() {
        let base = json!({"twitterApiConfs": [{"visibility": "public"}, {"visibility": "home"}]});
        let overlay = json!({"twitterApiConfs": [{"visibility": "followers"}]});

        assert_eq!(
            merge(base, overlay),
            json!({"twitterApiConfs": [{"visibility": "followers"}]})
        );
    }

    #[test]
    fn base_only_keys_survive() {
        let merged = merge(
            json!({"secret": "s3cret", "confs": {"enableRenote": false}}),
            json!({"misskeyId": "u1@misskey.test"}),
        );

        assert_eq!(
            merged,
            json!({
                "secret": "s3cret",
                "confs": {"enableRenote": false},
                "misskeyId": "u1@misskey.test"
            })
        );
    }

    #[test]
    fn round_trips_a_profile_merge() {
        let base = json!({
            "secret": "",
            "confs": {
                "enableRenote": false,
                "enableTags": true,
                "skipLinkRequired": false,
                "alwaysIncludeLink": false,
                "skipHashtag": "nocp",
                "cwTitleOnly": false,
                "excludeNsfw": true
            }
        });
        let overlay = json!({
            "misskeyId": "u1@misskey.test",
            "secret": "hook-secret",
            "confs": {
                "enableRenote": true
            }
        });

        let merged = merge(base.clone(), overlay.clone());

        // Override scalars win, objects merge, base-only keys survive.
        assert_eq!(merged["secret"], "hook-secret");
        assert_eq!(merged["misskeyId"], "u1@misskey.test");
        assert_eq!(merged["confs"]["enableRenote"], true);
        assert_eq!(merged["confs"]["excludeNsfw"], true);
        assert_eq!(merged["confs"]["skipHashtag"], "nocp");
    }
}
