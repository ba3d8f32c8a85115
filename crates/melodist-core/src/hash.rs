//! Canonical hashing.
//!
//! Request fingerprints and composition signatures are computed as
//! ```text
//! hex(BLAKE3(JCS(value)))
//! ```
//! where JCS is the JSON Canonicalization Scheme (RFC 8785): sorted object
//! keys, no insignificant whitespace, shortest number forms.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::note::Composition;
use crate::request::NormalizedRequest;

/// Stable digest of a normalized generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The 64-character lowercase hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a normalized request.
///
/// # Example
/// ```
/// use melodist_core::{fingerprint, GenerationRequest};
///
/// let a = GenerationRequest::new("dark  trap melody").normalize();
/// let b = GenerationRequest::new(" dark trap\tmelody ").normalize();
/// assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
/// ```
pub fn fingerprint(request: &NormalizedRequest) -> Result<Fingerprint, CoreError> {
    let value = request.to_canonical_value();
    canonical_value_hash(&value).map(Fingerprint)
}

/// Content signature of a full composition, used by negative feedback.
pub fn composition_signature(composition: &Composition) -> Result<String, CoreError> {
    let value = serde_json::to_value(composition)?;
    canonical_value_hash(&value)
}

/// Hex BLAKE3 digest of the canonical form of a JSON value.
pub fn canonical_value_hash(value: &serde_json::Value) -> Result<String, CoreError> {
    let canonical = canonicalize_json(value)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

/// Low 32 bits (little-endian) of the BLAKE3 digest of `seed|key`.
///
/// Used as the deterministic half of seeded-with-jitter selections.
pub fn seeded_u32(seed: &str, key: &str) -> u32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();
    let mut low = [0u8; 4];
    low.copy_from_slice(&hash.as_bytes()[..4]);
    u32::from_le_bytes(low)
}

/// Serializes a JSON value in canonical (JCS) form.
pub fn canonicalize_json(value: &serde_json::Value) -> Result<String, CoreError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &serde_json::Value, out: &mut String) -> Result<(), CoreError> {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => write_number(n, out)?,
        serde_json::Value::String(s) => write_string(s, out),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(k, out);
                out.push(':');
                write_canonical(v, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(n: &serde_json::Number, out: &mut String) -> Result<(), CoreError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
        return Ok(());
    }
    let f = n
        .as_f64()
        .ok_or_else(|| CoreError::Canonicalization(format!("unrepresentable number {n}")))?;
    if !f.is_finite() {
        return Err(CoreError::Canonicalization(format!(
            "non-finite number {f}"
        )));
    }
    if f == 0.0 {
        out.push('0');
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        let _ = write!(out, "{}", f as i64);
    } else {
        // Rust's Display for f64 is already the shortest round-tripping form.
        let _ = write!(out, "{f}");
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c < '\x20' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Note;

    #[test]
    fn test_canonicalize_object_ordering() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).unwrap();
        assert_eq!(canonicalize_json(&a).unwrap(), r#"{"a":2,"b":1}"#);
        assert_eq!(canonicalize_json(&a).unwrap(), canonicalize_json(&b).unwrap());
    }

    #[test]
    fn test_canonicalize_nested_and_numbers() {
        let v: serde_json::Value =
            serde_json::from_str(r#"{"z": [1.50, 2.0, -0.25], "a": {"c": true, "b": null}}"#)
                .unwrap();
        assert_eq!(
            canonicalize_json(&v).unwrap(),
            r#"{"a":{"b":null,"c":true},"z":[1.5,2,-0.25]}"#
        );
    }

    #[test]
    fn test_canonicalize_strings() {
        let v = serde_json::json!({"text": "tab\there \"q\""});
        assert_eq!(
            canonicalize_json(&v).unwrap(),
            r#"{"text":"tab\there \"q\""}"#
        );
    }

    #[test]
    fn test_value_hash_ignores_key_order() {
        let a = serde_json::json!({"tempo": 140, "prompt": "dark"});
        let b = serde_json::json!({"prompt": "dark", "tempo": 140});
        let digest = canonical_value_hash(&a).unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, canonical_value_hash(&b).unwrap());
    }

    #[test]
    fn test_float_number_form() {
        let n = serde_json::Number::from_f64(0.1).unwrap();
        let mut out = String::new();
        write_number(&n, &mut out).unwrap();
        assert_eq!(out, "0.1");
    }

    #[test]
    fn test_composition_signature_is_content_based() {
        let mut a = Composition::new(120);
        a.melody.push(Note::new("C4", 0.0, 1.0));
        let mut b = a.clone();
        assert_eq!(
            composition_signature(&a).unwrap(),
            composition_signature(&b).unwrap()
        );
        b.melody[0].velocity = 99;
        assert_ne!(
            composition_signature(&a).unwrap(),
            composition_signature(&b).unwrap()
        );
    }

    #[test]
    fn test_seeded_u32_deterministic() {
        assert_eq!(seeded_u32("dark trapA", "A minor"), seeded_u32("dark trapA", "A minor"));
        assert_ne!(seeded_u32("dark trapA", "A minor"), seeded_u32("dark trapB", "A minor"));
        assert_ne!(seeded_u32("x", "A minor"), seeded_u32("x", "C major"));
    }
}
