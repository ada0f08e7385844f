use insights_agent_value::Value;

/// Whether a witness's method tree payload has been zeroed, redacted
/// (i.e. left as `None` — redaction still happens, but primitives are
/// not blanket-zeroed), or left untouched. Spec.md §4.4 "Policy gate on
/// emit": non-repro-eligible exchanges get `ZeroValue`; everything else
/// goes through the Redactor with `obfuscation` left at `None`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObfuscationFlag {
    None,
    ZeroValue,
}

/// The typed representation of one side (request or response) of an
/// HTTP exchange: headers, query, cookies, auth, and body all normalize
/// into the nested `Value` tree (spec.md §3); structured JSON,
/// form-urlencoded, and multipart bodies all land in `body`.
#[derive(Clone, Debug)]
pub struct MethodTree {
    pub headers: Value,
    pub query: Value,
    pub cookies: Value,
    pub auth: Value,
    pub body: Option<Value>,
}

impl MethodTree {
    pub fn empty() -> Self {
        Self {
            headers: Value::Object(Default::default()),
            query: Value::Object(Default::default()),
            cookies: Value::Object(Default::default()),
            auth: Value::Object(Default::default()),
            body: None,
        }
    }
}

/// HTTP method metadata carried on a merged witness: method/host/path
/// are drawn from whichever partial arrived first and are never
/// overwritten by merge (spec.md §3 Witness invariant); processing
/// latency is set once both timestamps are known.
#[derive(Clone, Debug)]
pub struct MethodMeta {
    pub method: String,
    pub host: String,
    pub path_template: String,
    /// `responseStart - requestEnd`, in milliseconds, carried to four
    /// significant digits; may be negative or zero and is recorded
    /// verbatim rather than clamped (spec.md §3, §8 invariant 6).
    pub processing_latency_ms: Option<f64>,
    pub obfuscation: ObfuscationFlag,
}

/// Rounds `value` to four significant digits, matching spec.md §8
/// invariant 6's "carried to four significant digits". `0.0` rounds to
/// `0.0`.
pub fn round_to_significant_digits(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let shift = digits - 1 - magnitude;
    let factor = 10f64.powi(shift);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_four_significant_digits() {
        assert_eq!(round_to_significant_digits(8.0, 4), 8.0);
        assert_eq!(round_to_significant_digits(-1.0, 4), -1.0);
        assert_eq!(round_to_significant_digits(8.123456, 4), 8.123);
        assert_eq!(round_to_significant_digits(0.0, 4), 0.0);
    }
}
