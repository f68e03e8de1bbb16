//! Canonical JSON.
//!
//! The pre-image for every signature in this system is a canonical JSON
//! encoding: object keys sorted lexicographically, no whitespace, no
//! trailing newline. Signer and verifier both go through this single
//! function so a stray formatting difference (escaping `/`, key order)
//! can never silently break auth.

use serde::Serialize;

/// Canonicalize any serializable value to its JCS-style string form.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    Ok(canonicalize_value(&v))
}

/// Canonicalize a bare string the way a challenge is signed: the string
/// wrapped in JSON quoting, nothing else. Equivalent to
/// `canonicalize(&s)` but avoids a round-trip through `Value` for the
/// hot path (every auth `verify` call hits this).
pub fn canonicalize_str(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization is infallible")
}

fn canonicalize_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);

            let mut out = String::from("{");
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonicalize_str(k));
                out.push(':');
                out.push_str(&canonicalize_value(v));
            }
            out.push('}');
            out
        }
        serde_json::Value::Array(arr) => {
            let mut out = String::from("[");
            for (i, v) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonicalize_value(v));
            }
            out.push(']');
            out
        }
        // Numbers/bools/null/strings: serde_json's own encoding already
        // matches JCS for the value space this system signs (no floats).
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
