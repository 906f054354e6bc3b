use std::collections::BTreeMap;

/// Opaque key/value payload carried by a job record.
///
/// A `BTreeMap` keeps the JSON serialisation deterministic, so a payload
/// written to the store reads back byte-identical.
pub type JobPayload = BTreeMap<String, String>;

/// Build a [`JobPayload`] from `(key, value)` pairs.
///
/// Convenience for CLI argument plumbing and tests:
///
/// ```
/// let p = courier_core::types::payload([("to", "a@x.com"), ("subject", "S")]);
/// assert_eq!(p.get("to").map(String::as_str), Some("a@x.com"));
/// ```
pub fn payload<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> JobPayload {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
