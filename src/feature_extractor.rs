//! Feature extraction for fraud model inference.
//!
//! Turns the source's tabular payload into the typed records the model was
//! trained on: the millisecond clock becomes `unix_time` and
//! `trans_date_trans_time`, integers are upcast to `f64`, and the ground
//! truth label never reaches the model.

use chrono::DateTime;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::types::transaction::{
    FeatureRecord, RawTransaction, EPOCH_MS_COLUMN, FEATURE_COLUMNS, LABEL_COLUMN,
};

/// Timestamp layout of `trans_date_trans_time`
pub const TRANS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source columns that must be present in every payload.
const SOURCE_COLUMNS: [&str; 21] = [
    "cc_num",
    "merchant",
    "category",
    "amt",
    "first",
    "last",
    "gender",
    "street",
    "city",
    "state",
    "zip",
    "lat",
    "long",
    "city_pop",
    "job",
    "dob",
    "trans_num",
    "merch_lat",
    "merch_long",
    LABEL_COLUMN,
    EPOCH_MS_COLUMN,
];

/// Builds model input records from raw source payloads.
///
/// Pure: no I/O, same payload in, same records out.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Build one feature record per source row.
    ///
    /// Columns are resolved by name. A missing source column, or a value
    /// that cannot be read as its field's type, is a `SchemaMismatch`.
    pub fn build(&self, raw: &RawTransaction) -> Result<Vec<FeatureRecord>> {
        let columns = ColumnMap::resolve(raw)?;
        raw.data
            .iter()
            .enumerate()
            .map(|(i, row)| columns.record(row).map_err(|e| with_row(e, i)))
            .collect()
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COLUMNS.len()
    }

    /// Get feature names, in model input order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_COLUMNS
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a millisecond epoch into `(unix_time, trans_date_trans_time)`.
pub fn epoch_ms_to_times(ms: f64) -> Result<(f64, String)> {
    if !ms.is_finite() {
        return Err(PipelineError::SchemaMismatch(format!(
            "{} is not a finite number",
            EPOCH_MS_COLUMN
        )));
    }
    let stamp = DateTime::from_timestamp_millis(ms.floor() as i64).ok_or_else(|| {
        PipelineError::SchemaMismatch(format!("{} out of range: {}", EPOCH_MS_COLUMN, ms))
    })?;
    Ok((ms / 1000.0, stamp.format(TRANS_TIME_FORMAT).to_string()))
}

/// Positions of the source columns, looked up once per payload.
struct ColumnMap {
    positions: [usize; SOURCE_COLUMNS.len()],
}

impl ColumnMap {
    fn resolve(raw: &RawTransaction) -> Result<Self> {
        let mut positions = [0usize; SOURCE_COLUMNS.len()];
        let mut missing = Vec::new();

        for (slot, name) in SOURCE_COLUMNS.iter().enumerate() {
            match raw.column_index(name) {
                Some(idx) => positions[slot] = idx,
                None => missing.push(*name),
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch(format!(
                "missing source columns: {}",
                missing.join(", ")
            )));
        }
        Ok(Self { positions })
    }

    fn value<'a>(&self, row: &'a [Value], name: &'static str) -> Result<&'a Value> {
        let slot = SOURCE_COLUMNS
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| PipelineError::SchemaMismatch(format!("unknown column {}", name)))?;
        row.get(self.positions[slot])
            .ok_or_else(|| PipelineError::SchemaMismatch(format!("row has no value for {}", name)))
    }

    fn num(&self, row: &[Value], name: &'static str) -> Result<f64> {
        value_as_f64(self.value(row, name)?)
            .ok_or_else(|| PipelineError::SchemaMismatch(format!("{} is not numeric", name)))
    }

    fn text(&self, row: &[Value], name: &'static str) -> Result<String> {
        match self.value(row, name)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(PipelineError::SchemaMismatch(format!(
                "{} is not a text value",
                name
            ))),
        }
    }

    fn record(&self, row: &[Value]) -> Result<FeatureRecord> {
        let (unix_time, trans_date_trans_time) =
            epoch_ms_to_times(self.num(row, EPOCH_MS_COLUMN)?)?;

        Ok(FeatureRecord {
            cc_num: self.num(row, "cc_num")?,
            merchant: self.text(row, "merchant")?,
            category: self.text(row, "category")?,
            amt: self.num(row, "amt")?,
            first: self.text(row, "first")?,
            last: self.text(row, "last")?,
            gender: self.text(row, "gender")?,
            street: self.text(row, "street")?,
            city: self.text(row, "city")?,
            state: self.text(row, "state")?,
            zip: self.num(row, "zip")?,
            lat: self.num(row, "lat")?,
            long: self.num(row, "long")?,
            city_pop: self.num(row, "city_pop")?,
            job: self.text(row, "job")?,
            dob: self.text(row, "dob")?,
            trans_num: self.text(row, "trans_num")?,
            merch_lat: self.num(row, "merch_lat")?,
            merch_long: self.num(row, "merch_long")?,
            unix_time,
            trans_date_trans_time,
        })
    }
}

/// Read a JSON value as `f64`; integers are upcast, numeric strings parsed.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn with_row(err: PipelineError, row: usize) -> PipelineError {
    match err {
        PipelineError::SchemaMismatch(msg) => {
            PipelineError::SchemaMismatch(format!("row {}: {}", row, msg))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw() -> RawTransaction {
        RawTransaction {
            columns: SOURCE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            index: vec![json!(438972)],
            data: vec![vec![
                json!(4653879239169997_i64),
                json!("fraud_Morissette-Schaefer"),
                json!("personal_care"),
                json!(50.29),
                json!("Monica"),
                json!("Tucker"),
                json!("F"),
                json!("302 Christina Islands"),
                json!("Smiths Grove"),
                json!("KY"),
                json!(42171),
                json!(37.0581),
                json!(-86.1938),
                json!(6841),
                json!("Therapist, sports"),
                json!("1999-06-06"),
                json!("0cb2d42eabbf90673d5578aeb79b79f8"),
                json!(36.708164),
                json!(-86.996368),
                json!(0),
                json!(1765317289296_i64),
            ]],
        }
    }

    #[test]
    fn test_feature_extraction() {
        let extractor = FeatureExtractor::new();
        let records = extractor.build(&raw()).unwrap();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.merchant, "fraud_Morissette-Schaefer");
        assert_eq!(r.amt, 50.29);
        assert_eq!(r.zip, 42171.0);
        assert_eq!(r.city_pop, 6841.0);
        assert_eq!(r.cc_num, 4653879239169997.0);
        assert_eq!(r.unix_time, 1765317289.296);
        assert_eq!(r.trans_date_trans_time, "2025-12-09 21:54:49");
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 21);
        assert_eq!(extractor.feature_names().len(), 21);
        assert!(!extractor.feature_names().contains(&LABEL_COLUMN));
        assert!(!extractor.feature_names().contains(&EPOCH_MS_COLUMN));
        assert!(extractor.feature_names().contains(&"unix_time"));
        assert!(extractor.feature_names().contains(&"trans_date_trans_time"));
    }

    #[test]
    fn test_columns_resolved_by_name() {
        let mut shuffled = raw();
        shuffled.columns.reverse();
        shuffled.data[0].reverse();

        let a = FeatureExtractor::new().build(&raw()).unwrap();
        let b = FeatureExtractor::new().build(&shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_build_is_deterministic() {
        let extractor = FeatureExtractor::new();
        let render = |records: &[FeatureRecord]| -> Vec<Vec<String>> {
            records
                .iter()
                .map(|r| r.cells().iter().map(|c| c.render()).collect())
                .collect()
        };
        let first = render(&extractor.build(&raw()).unwrap());
        let second = render(&extractor.build(&raw()).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let mut payload = raw();
        let idx = payload.column_index(EPOCH_MS_COLUMN).unwrap();
        payload.columns.remove(idx);
        payload.data[0].remove(idx);

        let err = FeatureExtractor::new().build(&payload).unwrap_err();
        match err {
            PipelineError::SchemaMismatch(msg) => assert!(msg.contains("current_time")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_amount_is_schema_mismatch() {
        let mut payload = raw();
        let idx = payload.column_index("amt").unwrap();
        payload.data[0][idx] = json!("fifty");

        let err = FeatureExtractor::new().build(&payload).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }

    #[test]
    fn test_numeric_strings_are_parsed() {
        let mut payload = raw();
        let idx = payload.column_index("zip").unwrap();
        payload.data[0][idx] = json!("42171");

        let records = FeatureExtractor::new().build(&payload).unwrap();
        assert_eq!(records[0].zip, 42171.0);
    }

    #[test]
    fn test_epoch_conversion() {
        let (unix, stamp) = epoch_ms_to_times(1765483867831.0).unwrap();
        assert_eq!(unix, 1765483867.831);
        assert_eq!(stamp, "2025-12-11 20:11:07");
        assert!(epoch_ms_to_times(f64::NAN).is_err());
    }
}
