//! Reversible text encoding of SQL NULL
//!
//! NULL is written as the text `NULL`. Text that already looks like `NULL`
//! (optionally with leading underscores) gains one more underscore, so
//! decoding can tell the two apart.

use crate::value::Value;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Text form of SQL NULL
pub const NULL_TEXT: &str = "NULL";

static NEEDS_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_*NULL$").expect("valid null pattern"));

static HAS_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_(_*NULL)$").expect("valid escaped null pattern"));

/// Render a value as text for output
pub fn encode(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(NULL_TEXT),
        Value::Text(s) => encode_str(s),
        other => Cow::Owned(other.to_string_value()),
    }
}

/// Escape text that would otherwise read back as NULL
pub fn encode_str(text: &str) -> Cow<'_, str> {
    if NEEDS_UNDERSCORE.is_match(text) {
        Cow::Owned(format!("_{text}"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Read text written by [`encode`]
pub fn decode(text: &str) -> Value {
    if text == NULL_TEXT {
        return Value::Null;
    }
    match HAS_UNDERSCORE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => Value::from(inner.as_str()),
        None => Value::from(text),
    }
}
