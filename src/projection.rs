use serde_json::{Map, Value};

use crate::{eval::RecordSet, records::RecordStore};

/// Placeholder for a selected field the record does not have.
pub fn missing_field(name: &str) -> Value {
    Value::String(format!("unknown field {name}"))
}

/// Map result ids back to record payloads, in id order.
///
/// With a non-empty `select` each record is reduced to exactly those
/// top-level fields, with [`missing_field`] standing in for absent ones.
/// Ids unknown to `records` are skipped.
pub fn project(
    select: Option<&[String]>,
    ids: &RecordSet,
    records: &RecordStore,
) -> Vec<Value> {
    let select = select.filter(|fields| !fields.is_empty());

    ids.iter()
        .filter_map(|id| records.get(*id))
        .map(|record| match select {
            Some(fields) => select_fields(record, fields),
            None => record.clone(),
        })
        .collect()
}

fn select_fields(record: &Value, fields: &[String]) -> Value {
    let mut view = Map::new();
    for field in fields {
        let value = record
            .as_object()
            .and_then(|object| object.get(field))
            .cloned()
            .unwrap_or_else(|| missing_field(field));
        view.insert(field.clone(), value);
    }
    Value::Object(view)
}
