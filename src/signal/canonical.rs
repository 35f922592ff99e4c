//! Deterministic canonicalization of parameter sets
//!
//! Turns an unordered mapping of named signal values into one canonical
//! string. The same content always yields byte-identical output, so the
//! fingerprint hash is independent of how the mapping was constructed.
//!
//! Every value fragment carries a type tag (`b:`, `n:`, `s:`, ...) and
//! strings are length-prefixed, so `Bool(true)` can never collide with
//! `Text("true")` and list/map boundaries are unambiguous. Fingerprint
//! entropy must not be lost to stringification collisions.

use super::{ParameterSet, SignalValue};

/// Canonicalize a parameter set into one deterministic string.
///
/// Keys are emitted in lexicographic order (`ParameterSet` is a
/// `BTreeMap`, so iteration order is already sorted; nested maps sort
/// the same way). Pure function: no host state, no observer-order
/// dependence.
pub fn canonicalize(params: &ParameterSet) -> String {
    let mut out = String::new();
    out.push_str("v1{");
    for (key, value) in params {
        write_key(&mut out, key);
        out.push('=');
        write_value(&mut out, value);
        out.push(';');
    }
    out.push('}');
    out
}

fn write_key(out: &mut String, key: &str) {
    out.push_str(&key.len().to_string());
    out.push(':');
    out.push_str(key);
}

fn write_value(out: &mut String, value: &SignalValue) {
    match value {
        SignalValue::Absent => out.push('_'),
        SignalValue::Bool(b) => {
            out.push_str("b:");
            out.push_str(if *b { "true" } else { "false" });
        }
        SignalValue::Number(n) => {
            out.push_str("n:");
            write_number(out, *n);
        }
        SignalValue::Text(s) => {
            out.push_str("s:");
            out.push_str(&s.len().to_string());
            out.push(':');
            out.push_str(s);
        }
        SignalValue::List(items) => {
            out.push_str("l:[");
            for item in items {
                write_value(out, item);
                out.push(',');
            }
            out.push(']');
        }
        SignalValue::Map(entries) => {
            out.push_str("m:{");
            for (key, item) in entries {
                write_key(out, key);
                out.push('=');
                write_value(out, item);
                out.push(';');
            }
            out.push('}');
        }
    }
}

/// Stable decimal rendering of a signal number.
///
/// Rust's `f64` formatting is shortest-round-trip and locale-free, so
/// the same bits render the same text on every engine. The only values
/// needing care are the non-finite ones and negative zero, which is
/// collapsed to zero so `-0.0` and `0.0` fingerprint identically.
fn write_number(out: &mut String, n: f64) {
    if n.is_nan() {
        out.push_str("nan");
    } else if n.is_infinite() {
        out.push_str(if n > 0.0 { "inf" } else { "-inf" });
    } else if n == 0.0 {
        out.push('0');
    } else {
        out.push_str(&n.to_string());
    }
}
