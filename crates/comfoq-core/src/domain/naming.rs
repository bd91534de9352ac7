//! Identifier normalisation for sensor and command names.
//!
//! Gateway-side names look like `SENSOR_FAN_EXHAUST_DUTY` or
//! `SENSOR  Exhaust Fan Speed`.  Consumers get camelCase keys instead.

/// Collapses every run of non-alphanumeric characters into `_`, trims
/// leading and trailing separators, lowercases, then turns `_x` (where `x`
/// is an ASCII letter) into `X`.  Separators before digits survive.
///
/// ```rust
/// use comfoq_core::domain::naming::normalize_identifier;
///
/// assert_eq!(normalize_identifier("Fan boost 10m"), "fanBoost_10m");
/// ```
pub fn normalize_identifier(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if is_name_char(ch) {
            if pending_sep && !collapsed.is_empty() {
                collapsed.push('_');
            }
            pending_sep = false;
            collapsed.extend(ch.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    let mut out = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '_' {
            if let Some(next) = chars.peek().copied() {
                if next.is_ascii_lowercase() {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Lowercase letters, uppercase letters and decimal digits.
fn is_name_char(ch: char) -> bool {
    ch.is_lowercase() || ch.is_uppercase() || ch.to_digit(10).is_some()
}

/// Normalises a sensor label after removing its leading `SENSOR` marker.
pub fn sensor_identifier(label: &str) -> String {
    let stripped = label.trim_start().strip_prefix("SENSOR").unwrap_or(label);
    normalize_identifier(stripped)
}
