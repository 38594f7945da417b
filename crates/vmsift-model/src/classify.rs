use crate::FieldValue;

/// Decide whether one software-inventory field value indicates the target
/// engine is installed.
///
/// The field arrives in several encodings; the first matching rule wins:
/// 1. null, or a not-a-number numeric, is not installed
/// 2. text trimming to `""` or `"[]"` is not installed
/// 3. a native list is installed if any element contains `engine_name`
/// 4. text parsing as a JSON array of strings is installed if any decoded
///    element contains `engine_name`
/// 5. anything else is installed if `engine_name` occurs in the raw text
///    rendering of the value
///
/// Matching is a literal, case-sensitive substring test with no
/// normalization. Rule 5 is deliberately loose: an incidental mention inside
/// malformed text counts as a hit, which keeps literal encodings from ever
/// producing a false negative.
///
/// Only the software-inventory column is ever passed here; mentions of the
/// engine in other columns must not reach this predicate.
pub fn software_field_contains(value: &FieldValue, engine_name: &str) -> bool {
    match value {
        FieldValue::Null => false,
        FieldValue::Number(n) if n.is_nan() => false,
        FieldValue::List(items) => items.iter().any(|s| s.contains(engine_name)),
        FieldValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "[]" {
                return false;
            }
            // The decode is all-or-nothing: an array holding any non-string
            // element (or any non-array JSON value) takes the raw-text
            // fallback instead.
            match serde_json::from_str::<Vec<String>>(trimmed) {
                Ok(items) => items.iter().any(|s| s.contains(engine_name)),
                Err(_) => text.contains(engine_name),
            }
        }
        other => other.display_text().contains(engine_name),
    }
}
