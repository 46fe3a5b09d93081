//! Filter expressions accepted by list endpoints.

use serde_json::json;

/// `equal(attribute, value)` serialized the way list endpoints expect it.
pub fn equal(attribute: &str, value: &str) -> String {
    json!({ "method": "equal", "attribute": attribute, "values": [value] }).to_string()
}

pub fn limit(n: u32) -> String {
    json!({ "method": "limit", "values": [n] }).to_string()
}

pub fn offset(n: u32) -> String {
    json!({ "method": "offset", "values": [n] }).to_string()
}
