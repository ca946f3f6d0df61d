//! Keyed merge of auxiliary datasets into the primary dataset.

use crate::config::MergeRule;
use crate::transform::Record;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::debug;

/// Merge `auxiliary` records into `primary` in place.
///
/// Builds a lookup from the value of `rule.on_field` to the primary record
/// holding it, then overwrites `rule.target_field` on every matched primary
/// record with the auxiliary record's value. Auxiliary records with no match
/// are dropped; no new rows are ever created.
///
/// When the primary set contains duplicate keys only the last record with a
/// given key remains addressable, so earlier duplicates never receive merged
/// fields. Existing task configs rely on this last-wins behavior; it is kept
/// as a documented limitation.
pub fn apply(primary: &mut [Record], auxiliary: &[Record], rule: &MergeRule) {
    let mut lookup: HashMap<String, usize> = HashMap::with_capacity(primary.len());
    for (idx, record) in primary.iter().enumerate() {
        if let Some(key) = record.get(&rule.on_field).map(merge_key) {
            lookup.insert(key, idx);
        }
    }

    let mut matched = 0usize;
    for record in auxiliary {
        let Some(key) = record.get(&rule.on_field).map(merge_key) else {
            continue;
        };
        if let Some(&idx) = lookup.get(&key) {
            let value = record
                .get(&rule.target_field)
                .cloned()
                .unwrap_or(JsonValue::Null);
            primary[idx].insert(rule.target_field.clone(), value);
            matched += 1;
        }
    }

    debug!(
        "Merged {}/{} auxiliary records on '{}' into '{}'",
        matched,
        auxiliary.len(),
        rule.on_field,
        rule.target_field
    );
}

/// Key identity is type-sensitive: the JSON text form keeps string `"1"` and
/// number `1` distinct.
fn merge_key(value: &JsonValue) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(on: &str, target: &str) -> MergeRule {
        MergeRule {
            on_field: on.into(),
            target_field: target.into(),
        }
    }

    fn record(value: serde_json::Value) -> Record {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("record fixtures must be JSON objects"),
        }
    }

    #[test]
    fn test_merge_overwrites_matched_target() {
        let mut primary = vec![
            record(json!({ "id": 1, "amt": "100.00" })),
            record(json!({ "id": 2, "amt": "200.00" })),
        ];
        let auxiliary = vec![record(json!({ "id": 2, "paid": "Y" }))];

        apply(&mut primary, &auxiliary, &rule("id", "paid"));

        assert_eq!(primary[0].get("paid"), None);
        assert_eq!(primary[1]["paid"], json!("Y"));
        assert_eq!(primary[1]["amt"], json!("200.00"));
    }

    #[test]
    fn test_unmatched_auxiliary_is_dropped() {
        let mut primary = vec![record(json!({ "id": 1 }))];
        let auxiliary = vec![record(json!({ "id": 99, "paid": "Y" }))];

        apply(&mut primary, &auxiliary, &rule("id", "paid"));

        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].get("paid"), None);
    }

    #[test]
    fn test_duplicate_primary_keys_last_wins() {
        let mut primary = vec![
            record(json!({ "id": 1, "label": "first" })),
            record(json!({ "id": 1, "label": "second" })),
        ];
        let auxiliary = vec![record(json!({ "id": 1, "paid": "Y" }))];

        apply(&mut primary, &auxiliary, &rule("id", "paid"));

        assert_eq!(primary[0].get("paid"), None);
        assert_eq!(primary[1]["paid"], json!("Y"));
    }

    #[test]
    fn test_later_dataset_overwrites_earlier() {
        let mut primary = vec![record(json!({ "id": 1 }))];
        let first = vec![record(json!({ "id": 1, "paid": "N" }))];
        let second = vec![record(json!({ "id": 1, "paid": "Y" }))];

        apply(&mut primary, &first, &rule("id", "paid"));
        apply(&mut primary, &second, &rule("id", "paid"));

        assert_eq!(primary[0]["paid"], json!("Y"));
    }

    #[test]
    fn test_key_identity_is_type_sensitive() {
        let mut primary = vec![record(json!({ "id": 1 }))];
        let auxiliary = vec![record(json!({ "id": "1", "paid": "Y" }))];

        apply(&mut primary, &auxiliary, &rule("id", "paid"));

        assert_eq!(primary[0].get("paid"), None);
    }

    #[test]
    fn test_missing_target_field_writes_null() {
        let mut primary = vec![record(json!({ "id": 1, "paid": "N" }))];
        let auxiliary = vec![record(json!({ "id": 1 }))];

        apply(&mut primary, &auxiliary, &rule("id", "paid"));

        assert_eq!(primary[0]["paid"], JsonValue::Null);
    }
}
