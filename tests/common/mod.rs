//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};

pub const SOURCE_COLUMNS: [&str; 21] = [
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
    "current_time",
];

/// One-row source table with the given label
pub fn source_table(trans_num: &str, is_fraud: i64) -> Value {
    json!({
        "columns": SOURCE_COLUMNS,
        "index": [0],
        "data": [[
            999999_i64,
            "TEST_bidon",
            "kids_pets",
            100.01,
            "Jenna",
            "Brooks",
            "F",
            "South Park",
            "Baton Rouge",
            "LA",
            99999_i64,
            30.4066,
            -91.494831,
            795_i64,
            "Designer",
            "1977-02-22",
            trans_num,
            30.731498,
            -91.494831,
            is_fraud,
            1765483867831_i64
        ]]
    })
}

/// The table as the source serves it: a JSON string holding JSON
pub fn double_encoded(table: &Value) -> String {
    serde_json::to_string(&table.to_string()).unwrap()
}
