//! Transaction records as they move through the pipeline.
//!
//! `RawTransaction` is the source payload verbatim, `FeatureRecord` is the
//! model input, `ClassifiedRecord` adds the verdict and `PersistedRow` is the
//! relational shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ground-truth label column supplied by the source.
pub const LABEL_COLUMN: &str = "is_fraud";

/// Millisecond epoch column supplied by the source.
pub const EPOCH_MS_COLUMN: &str = "current_time";

/// Verdict column appended by the model stage.
pub const VERDICT_COLUMN: &str = "classification";

/// Model input schema, in column order.
pub const FEATURE_COLUMNS: [&str; 21] = [
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
    "unix_time",
    "trans_date_trans_time",
];

/// Columns of `public.transactions`, in insert order.
pub const TABLE_COLUMNS: [&str; 23] = [
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
    "is_fraud",
    "unix_time",
    "trans_date_trans_time",
    "classification",
];

/// Tabular payload returned by the transaction source.
///
/// Field order is fixed so the raw archive serializes with stable key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
    #[serde(default)]
    pub index: Vec<Value>,
}

impl RawTransaction {
    /// Position of a column, looked up by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Check that every row is as wide as the column list.
    pub fn check_shape(&self) -> Result<(), String> {
        for (i, row) in self.data.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(format!(
                    "row {} has {} values for {} columns",
                    i,
                    row.len(),
                    self.columns.len()
                ));
            }
        }
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.data.len()
    }
}

/// One typed cell of a tabular record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Num(f64),
    Text(&'a str),
}

impl Cell<'_> {
    /// Delimited-text rendering; floats always keep a decimal point.
    pub fn render(&self) -> String {
        match self {
            Cell::Num(v) => format_float(*v),
            Cell::Text(s) => (*s).to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Num(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Text(s) => Value::String((*s).to_string()),
        }
    }
}

/// Render a float with a decimal point: `42171.0`, `50.29`.
///
/// Whole numbers below 2^63 stay in fixed notation so long card numbers
/// remain readable; anything else uses the shortest round-trip form.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.223372036854775808e18 {
        format!("{:.1}", v)
    } else {
        format!("{:?}", v)
    }
}

/// Model-ready transaction features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub cc_num: f64,
    pub merchant: String,
    pub category: String,
    pub amt: f64,
    pub first: String,
    pub last: String,
    pub gender: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: f64,
    pub lat: f64,
    pub long: f64,
    pub city_pop: f64,
    pub job: String,
    pub dob: String,
    pub trans_num: String,
    pub merch_lat: f64,
    pub merch_long: f64,
    /// Seconds since epoch
    pub unix_time: f64,
    /// `YYYY-MM-DD HH:MM:SS`, UTC
    pub trans_date_trans_time: String,
}

impl FeatureRecord {
    /// Cells in `FEATURE_COLUMNS` order.
    pub fn cells(&self) -> [Cell<'_>; 21] {
        [
            Cell::Num(self.cc_num),
            Cell::Text(&self.merchant),
            Cell::Text(&self.category),
            Cell::Num(self.amt),
            Cell::Text(&self.first),
            Cell::Text(&self.last),
            Cell::Text(&self.gender),
            Cell::Text(&self.street),
            Cell::Text(&self.city),
            Cell::Text(&self.state),
            Cell::Num(self.zip),
            Cell::Num(self.lat),
            Cell::Num(self.long),
            Cell::Num(self.city_pop),
            Cell::Text(&self.job),
            Cell::Text(&self.dob),
            Cell::Text(&self.trans_num),
            Cell::Num(self.merch_lat),
            Cell::Num(self.merch_long),
            Cell::Num(self.unix_time),
            Cell::Text(&self.trans_date_trans_time),
        ]
    }

    /// Row as JSON values, for dataframe-style model requests.
    pub fn to_json_row(&self) -> Vec<Value> {
        self.cells().iter().map(Cell::to_json).collect()
    }
}

/// Feature record plus the model verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub features: FeatureRecord,
    /// 0.0 or 1.0
    pub classification: f64,
}

impl ClassifiedRecord {
    pub fn is_fraud_verdict(&self) -> bool {
        self.classification == 1.0
    }
}

/// Row of `public.transactions`.
///
/// `is_fraud` is the source's ground truth, `classification` the model's
/// verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersistedRow {
    pub cc_num: f64,
    pub merchant: String,
    pub category: String,
    pub amt: f64,
    pub first: String,
    pub last: String,
    pub gender: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: f64,
    pub lat: f64,
    pub long: f64,
    pub city_pop: f64,
    pub job: String,
    pub dob: String,
    pub trans_num: String,
    pub merch_lat: f64,
    pub merch_long: f64,
    pub is_fraud: f64,
    pub unix_time: f64,
    pub trans_date_trans_time: String,
    pub classification: f64,
}

impl PersistedRow {
    /// Combine a classified record with the ground-truth label.
    pub fn from_classified(record: &ClassifiedRecord, is_fraud: f64) -> Self {
        let f = &record.features;
        Self {
            cc_num: f.cc_num,
            merchant: f.merchant.clone(),
            category: f.category.clone(),
            amt: f.amt,
            first: f.first.clone(),
            last: f.last.clone(),
            gender: f.gender.clone(),
            street: f.street.clone(),
            city: f.city.clone(),
            state: f.state.clone(),
            zip: f.zip,
            lat: f.lat,
            long: f.long,
            city_pop: f.city_pop,
            job: f.job.clone(),
            dob: f.dob.clone(),
            trans_num: f.trans_num.clone(),
            merch_lat: f.merch_lat,
            merch_long: f.merch_long,
            is_fraud,
            unix_time: f.unix_time,
            trans_date_trans_time: f.trans_date_trans_time.clone(),
            classification: record.classification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_transaction_field_order() {
        let raw = RawTransaction {
            columns: vec!["amt".into()],
            data: vec![vec![json!(1.5)]],
            index: vec![json!(7)],
        };
        let text = serde_json::to_string(&raw).unwrap();
        assert_eq!(text, r#"{"columns":["amt"],"data":[[1.5]],"index":[7]}"#);
    }

    #[test]
    fn test_check_shape_rejects_ragged_rows() {
        let raw = RawTransaction {
            columns: vec!["a".into(), "b".into()],
            data: vec![vec![json!(1)]],
            index: vec![],
        };
        assert!(raw.check_shape().is_err());
        assert_eq!(raw.column_index("b"), Some(1));
        assert_eq!(raw.column_index("c"), None);
    }

    #[test]
    fn test_format_float_keeps_decimal_point() {
        assert_eq!(format_float(42171.0), "42171.0");
        assert_eq!(format_float(50.29), "50.29");
        assert_eq!(format_float(4653879239169997.0), "4653879239169997.0");
        assert_eq!(format_float(-86.1938), "-86.1938");
    }

    #[test]
    fn test_format_float_long_card_numbers_stay_fixed() {
        assert_eq!(format_float(4992346398065154184.0), "4992346398065154048.0");
        assert_eq!(format_float(-1e17), "-100000000000000000.0");
        assert_eq!(format_float(1e20), "1e20");
        assert_eq!(format_float(1765483867.831), "1765483867.831");
    }

    #[test]
    fn test_column_lists_agree() {
        let without_verdict: Vec<&str> = TABLE_COLUMNS
            .iter()
            .copied()
            .filter(|c| *c != LABEL_COLUMN && *c != VERDICT_COLUMN)
            .collect();
        assert_eq!(without_verdict, FEATURE_COLUMNS.to_vec());
    }
}
