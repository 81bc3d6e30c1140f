//! Record normalization and schema mapping.
//!
//! Upstream feed payloads arrive as deeply nested JSON. This crate flattens
//! each record into dotted-key form, then drives the dataset's declarative
//! field specs over the flat record to produce typed rows ready for storage.

use std::collections::BTreeMap;

use serde_json::Value;

use screenfeed_core::{
    ColumnType, ColumnValue, DatasetSpec, Extraction, FieldSpec, MappedRow, Requirement,
};

pub const CRATE_NAME: &str = "screenfeed-adapters";

/// One source record with nesting collapsed into dotted keys. Arrays and
/// scalars are kept whole as leaf values; only objects are descended.
pub type FlatRecord = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("dataset {dataset} has no record array at `{path}`")]
    MissingRecords { dataset: &'static str, path: String },
    #[error("record `{record_key}` is missing required field `{field}`")]
    MissingField {
        field: &'static str,
        record_key: String,
    },
    #[error("record `{record_key}` field `{field}` is not {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
        record_key: String,
    },
}

/// Flattens an arbitrary JSON document into dotted keys.
///
/// Nested objects contribute `parent.child` entries, empty objects stay as
/// leaves under their own key, and arrays are never descended. A non-object
/// document flattens to an empty record.
pub fn flatten_document(document: &Value) -> FlatRecord {
    let mut flat = FlatRecord::new();
    if let Value::Object(map) = document {
        for (key, value) in map {
            flatten_into(&mut flat, key.clone(), value);
        }
    }
    flat
}

fn flatten_into(flat: &mut FlatRecord, prefix: String, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten_into(flat, format!("{prefix}.{key}"), child);
            }
        }
        other => {
            flat.insert(prefix, other.clone());
        }
    }
}

/// Descends the dataset's envelope path and flattens each record in the
/// array found there.
pub fn flatten_records(payload: &Value, spec: &DatasetSpec) -> Result<Vec<FlatRecord>, MapError> {
    let mut cursor = payload;
    for segment in spec.records_path {
        cursor = match cursor.get(segment) {
            Some(next) => next,
            None => {
                return Err(MapError::MissingRecords {
                    dataset: spec.table,
                    path: spec.records_path.join("."),
                })
            }
        };
    }
    let records = cursor.as_array().ok_or_else(|| MapError::MissingRecords {
        dataset: spec.table,
        path: spec.records_path.join("."),
    })?;
    Ok(records.iter().map(flatten_document).collect())
}

/// Maps one flattened record into a typed row per the dataset's field specs.
///
/// Required fields that are absent or JSON null fail the mapping; optional
/// fields fall back to their declared default. A present value of the wrong
/// JSON type is an error regardless of requirement.
pub fn map_record(spec: &DatasetSpec, record: &FlatRecord) -> Result<MappedRow, MapError> {
    let mut values = Vec::with_capacity(spec.fields.len());
    for field in spec.fields {
        values.push(map_field(spec, field, record)?);
    }
    Ok(MappedRow { values })
}

/// Maps every record, in order. The first failure aborts the whole batch so
/// a partially mapped dataset never reaches the store.
pub fn map_records(
    spec: &DatasetSpec,
    records: &[FlatRecord],
) -> Result<Vec<MappedRow>, MapError> {
    records.iter().map(|r| map_record(spec, r)).collect()
}

fn map_field(
    spec: &DatasetSpec,
    field: &FieldSpec,
    record: &FlatRecord,
) -> Result<ColumnValue, MapError> {
    let raw = match field.extraction {
        Extraction::Key(key) => record.get(key),
        Extraction::FirstWatchProvider => {
            return Ok(ColumnValue::Text(first_watch_provider(record)));
        }
    };
    match raw {
        None | Some(Value::Null) => match field.requirement {
            Requirement::Required => Err(MapError::MissingField {
                field: field.column,
                record_key: record_key(spec, record),
            }),
            Requirement::Optional(default) => Ok(default.to_value()),
        },
        Some(value) => {
            coerce(value, field.ty).ok_or_else(|| MapError::InvalidType {
                field: field.column,
                expected: expected_name(field.ty),
                record_key: record_key(spec, record),
            })
        }
    }
}

fn coerce(value: &Value, ty: ColumnType) -> Option<ColumnValue> {
    match ty {
        ColumnType::Text => value.as_str().map(|s| ColumnValue::Text(s.to_string())),
        ColumnType::Integer => {
            if let Some(n) = value.as_i64() {
                Some(ColumnValue::Integer(n))
            } else {
                // Some feeds serialize whole numbers as floats.
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| ColumnValue::Integer(f as i64))
            }
        }
        ColumnType::Real => value.as_f64().map(ColumnValue::Real),
    }
}

fn expected_name(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Text => "a string",
        ColumnType::Integer => "an integer",
        ColumnType::Real => "a number",
    }
}

fn record_key(spec: &DatasetSpec, record: &FlatRecord) -> String {
    record
        .get(spec.key_column)
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Resolves the streaming provider shown for a chart title: the first watch
/// option of the first category. Any missing level, empty list, or malformed
/// provider object resolves to `"Unknown"`.
pub fn first_watch_provider(record: &FlatRecord) -> String {
    record
        .get("watchOptionsByCategory.categorizedWatchOptionsList")
        .and_then(Value::as_array)
        .and_then(|categories| categories.first())
        .and_then(|category| category.get("watchOptions"))
        .and_then(Value::as_array)
        .and_then(|options| options.first())
        .and_then(provider_name)
        .unwrap_or_else(|| "Unknown".to_string())
}

fn provider_name(option: &Value) -> Option<String> {
    let nested = option
        .get("provider")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.get("value"))
        .and_then(Value::as_str);
    // Some feeds pre-flatten the provider path into a single dotted key.
    nested
        .or_else(|| option.get("provider.name.value").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenfeed_core::{DatasetId, MOVIES, POPULAR_CELEBRITIES, WEEKLY_TOP_10};
    use serde_json::json;

    #[test]
    fn flattening_collapses_objects_and_keeps_arrays_whole() {
        let doc = json!({
            "id": "nm1",
            "nameText": { "text": "Ana" },
            "credits": ["a", "b"],
            "empty": {},
        });
        let flat = flatten_document(&doc);
        assert_eq!(flat["id"], json!("nm1"));
        assert_eq!(flat["nameText.text"], json!("Ana"));
        assert_eq!(flat["credits"], json!(["a", "b"]));
        assert_eq!(flat["empty"], json!({}));
        assert!(!flat.contains_key("nameText"));
    }

    #[test]
    fn flattening_a_non_object_yields_an_empty_record() {
        assert!(flatten_document(&json!([1, 2])).is_empty());
        assert!(flatten_document(&json!("scalar")).is_empty());
    }

    #[test]
    fn records_are_read_from_the_envelope_path() {
        let payload = json!({ "data": { "list": [ { "id": "nm1" }, { "id": "nm2" } ] } });
        let records = flatten_records(&payload, &POPULAR_CELEBRITIES).expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], json!("nm2"));
    }

    #[test]
    fn a_missing_envelope_path_is_an_error() {
        let payload = json!({ "data": { "items": [] } });
        let err = flatten_records(&payload, &POPULAR_CELEBRITIES).unwrap_err();
        assert!(matches!(err, MapError::MissingRecords { path, .. } if path == "data.list"));
    }

    #[test]
    fn an_envelope_holding_a_non_array_is_an_error() {
        let payload = json!({ "data": { "list": "not-an-array" } });
        assert!(flatten_records(&payload, &POPULAR_CELEBRITIES).is_err());
    }

    #[test]
    fn optional_fields_default_when_absent_or_null() {
        let record = flatten_document(&json!({
            "id": "tt1",
            "qid": "movie",
            "title": "Quiet Hours",
            "q": "feature",
            "year": null,
        }));
        let row = map_record(&MOVIES, &record).expect("mapped");
        // year null, stars absent, image absent
        assert_eq!(row.values[3], ColumnValue::Null);
        assert_eq!(row.values[4], ColumnValue::Text("Unknown".to_string()));
        assert_eq!(row.values[6], ColumnValue::Null);
    }

    #[test]
    fn a_missing_required_field_names_the_record() {
        let record = flatten_document(&json!({ "id": "nm9" }));
        let err = map_record(&POPULAR_CELEBRITIES, &record).unwrap_err();
        match err {
            MapError::MissingField { field, record_key } => {
                assert_eq!(field, "name");
                assert_eq!(record_key, "nm9");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn a_record_without_a_key_reports_unknown() {
        let record = flatten_document(&json!({ "qid": "movie" }));
        let err = map_record(&MOVIES, &record).unwrap_err();
        match err {
            MapError::MissingField { record_key, .. } => assert_eq!(record_key, "unknown"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn a_wrong_typed_value_is_rejected_even_when_optional() {
        let record = flatten_document(&json!({
            "id": "nm1",
            "nameText": { "text": "Ana" },
            "height": { "measurement": { "value": "tall" } },
        }));
        let err = map_record(&POPULAR_CELEBRITIES, &record).unwrap_err();
        assert!(matches!(err, MapError::InvalidType { field: "height", .. }));
    }

    #[test]
    fn whole_number_floats_coerce_to_integers() {
        assert_eq!(
            coerce(&json!(2015.0), ColumnType::Integer),
            Some(ColumnValue::Integer(2015))
        );
        assert_eq!(coerce(&json!(3.5), ColumnType::Integer), None);
        assert_eq!(
            coerce(&json!(7), ColumnType::Real),
            Some(ColumnValue::Real(7.0))
        );
    }

    #[test]
    fn one_bad_record_aborts_the_whole_batch() {
        let payload = json!({ "data": { "list": [
            { "id": "nm1", "nameText": { "text": "Ana" } },
            { "id": "nm2" },
        ] } });
        let records = flatten_records(&payload, &POPULAR_CELEBRITIES).expect("records");
        assert!(map_records(&POPULAR_CELEBRITIES, &records).is_err());
    }

    #[test]
    fn provider_resolves_from_the_first_category_and_option() {
        let record = flatten_document(&json!({
            "watchOptionsByCategory": { "categorizedWatchOptionsList": [
                { "watchOptions": [
                    { "provider": { "name": { "value": "Netflix" } } },
                    { "provider": { "name": { "value": "Hulu" } } },
                ] },
                { "watchOptions": [ { "provider": { "name": { "value": "Max" } } } ] },
            ] },
        }));
        assert_eq!(first_watch_provider(&record), "Netflix");
    }

    #[test]
    fn provider_falls_back_to_unknown_at_every_missing_level() {
        let no_categories = flatten_document(&json!({ "id": "tt1" }));
        assert_eq!(first_watch_provider(&no_categories), "Unknown");

        let empty_categories = flatten_document(&json!({
            "watchOptionsByCategory": { "categorizedWatchOptionsList": [] },
        }));
        assert_eq!(first_watch_provider(&empty_categories), "Unknown");

        let empty_options = flatten_document(&json!({
            "watchOptionsByCategory": { "categorizedWatchOptionsList": [
                { "watchOptions": [] },
            ] },
        }));
        assert_eq!(first_watch_provider(&empty_options), "Unknown");

        let malformed_provider = flatten_document(&json!({
            "watchOptionsByCategory": { "categorizedWatchOptionsList": [
                { "watchOptions": [ { "provider": { "name": {} } } ] },
            ] },
        }));
        assert_eq!(first_watch_provider(&malformed_provider), "Unknown");
    }

    #[test]
    fn provider_accepts_the_pre_flattened_dotted_key() {
        let record = flatten_document(&json!({
            "watchOptionsByCategory": { "categorizedWatchOptionsList": [
                { "watchOptions": [ { "provider.name.value": "Prime Video" } ] },
            ] },
        }));
        assert_eq!(first_watch_provider(&record), "Prime Video");
    }

    #[test]
    fn a_full_celebrity_record_maps_end_to_end() {
        let record = flatten_document(&json!({
            "id": "nm0000138",
            "nameText": { "text": "Leonardo DiCaprio" },
            "birthDateComponents": { "displayableProperty": { "value": {
                "plainText": "November 11, 1974",
            } } },
            "height": { "measurement": { "value": 1.83 } },
            "meterRanking": { "currentRank": 12 },
        }));
        let row = map_record(DatasetId::PopularCelebrities.spec(), &record).expect("mapped");
        assert_eq!(
            row.values,
            vec![
                ColumnValue::Text("nm0000138".to_string()),
                ColumnValue::Text("Leonardo DiCaprio".to_string()),
                ColumnValue::Text("November 11, 1974".to_string()),
                ColumnValue::Real(1.83),
                ColumnValue::Integer(12),
            ]
        );
    }

    #[test]
    fn a_weekly_chart_record_maps_with_its_provider() {
        let record = flatten_document(&json!({
            "id": "tt0111161",
            "titleText": { "text": "The Shawshank Redemption" },
            "releaseYear": { "year": 1994 },
            "ratingsSummary": { "aggregateRating": 9.3, "voteCount": 2900000 },
            "chartMeterRanking": { "currentRank": 1 },
            "watchOptionsByCategory": { "categorizedWatchOptionsList": [
                { "watchOptions": [ { "provider": { "name": { "value": "Netflix" } } } ] },
            ] },
        }));
        let row = map_record(&WEEKLY_TOP_10, &record).expect("mapped");
        assert_eq!(row.values[1], ColumnValue::Text("The Shawshank Redemption".to_string()));
        assert_eq!(row.values[2], ColumnValue::Integer(1994));
        assert_eq!(row.values[3], ColumnValue::Real(9.3));
        assert_eq!(row.values[6], ColumnValue::Text("Netflix".to_string()));
    }
}
