/// A single inventory cell value.
///
/// CSV import resolves each field into one of these variants once, at parse
/// time; later stages match on the variant instead of re-inspecting raw text.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Absent cell (empty CSV field, or a short row padded to table width).
    Null,
    /// Integral numeric literal that fits `i64` and round-trips textually.
    Int(i64),
    /// Other numeric literal, including non-finite markers such as `NaN`.
    Number(f64),
    /// Any other text, preserved verbatim.
    Text(String),
    /// A native list of strings. CSV import never produces this variant;
    /// callers holding already-structured inventory data construct it
    /// directly.
    List(Vec<String>),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Null
    }
}

impl FieldValue {
    /// Returns true if the value is [`FieldValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Plain-text rendering used for display, column sizing and the
    /// classifier's raw-text fallback.
    ///
    /// Numbers render in plain decimal (Rust's shortest round-trip form,
    /// never exponent notation); lists render as a JSON array.
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => {
                serde_json::to_string(items).expect("string lists always serialize")
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}
