//! Derivative-aware comparison of desired and observed objects
//!
//! The API server fills in a lot of fields on write (cluster IPs, protocols,
//! pull policies, strategies ...). A plain equality check between what the
//! builder produces and what the server returns would report drift on every
//! pass and the controller would fight the platform forever.
//!
//! [`is_derivative`] therefore only looks at what the desired tree actually
//! sets. Unset values on the desired side (`null`, `""`, `[]`, `{}`) match
//! anything, extra keys and trailing list entries on the observed side are
//! ignored, and everything the desired side does set must match exactly.

use serde_json::Value;

/// Whether `observed` can be derived from `desired` by filling in unset fields
pub fn is_derivative(desired: &Value, observed: &Value) -> bool {
    match desired {
        Value::Null => true,
        Value::Bool(want) => match observed {
            Value::Bool(have) => want == have,
            Value::Null => !want,
            _ => false,
        },
        Value::Number(want) => match observed {
            Value::Number(have) => want == have || want.as_f64() == have.as_f64(),
            Value::Null => want.as_f64() == Some(0.0),
            _ => false,
        },
        Value::String(want) => want.is_empty() || observed.as_str() == Some(want.as_str()),
        Value::Array(want) => {
            if want.is_empty() {
                return true;
            }
            match observed {
                Value::Array(have) => {
                    want.len() <= have.len()
                        && want.iter().zip(have).all(|(w, h)| is_derivative(w, h))
                }
                _ => false,
            }
        }
        Value::Object(want) => {
            if want.is_empty() {
                return true;
            }
            match observed {
                Value::Object(have) => want
                    .iter()
                    .all(|(key, w)| is_derivative(w, have.get(key).unwrap_or(&Value::Null))),
                // an unset observed object only matches a desired one that sets nothing
                Value::Null => want.values().all(|w| is_derivative(w, &Value::Null)),
                _ => false,
            }
        }
    }
}
