//! Free-text sanitising and field validation.

/// Characters that make a spreadsheet treat a cell as a formula.
const FORMULA_PREFIXES: &[char] = &['=', '+', '-', '@'];

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Empty { field: &'static str },
    #[error("{field} exceeds {max} characters ({len})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} is not a valid ISIN: {value}")]
    InvalidIsin { field: &'static str, value: String },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Empty { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::InvalidIsin { field, .. } => field,
        }
    }
}

/// Length limits applied to free-text fields
#[derive(Debug, Clone, Copy)]
pub struct FieldLimits {
    pub product: usize,
    pub description: usize,
    pub order_id: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        FieldLimits {
            product: 255,
            description: 512,
            order_id: 64,
        }
    }
}

/// Remove non-printable characters, keeping tab, newline and carriage return.
pub fn strip_non_printable(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Prefix values that a spreadsheet would evaluate as a formula.
pub fn neutralize_formula(value: &str) -> String {
    if value.starts_with(FORMULA_PREFIXES) {
        format!("'{value}")
    } else {
        value.to_string()
    }
}

/// Sanitise a required free-text field.
pub fn required_text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let cleaned = strip_non_printable(value).trim().to_string();
    if cleaned.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    check_length(field, &cleaned, max)?;
    Ok(neutralize_formula(&cleaned))
}

/// Sanitise an optional free-text field; blank values become `None`.
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let cleaned = strip_non_printable(value).trim().to_string();
    if cleaned.is_empty() {
        return Ok(None);
    }
    check_length(field, &cleaned, max)?;
    Ok(Some(neutralize_formula(&cleaned)))
}

/// Validate an optional ISIN: 12 ASCII alphanumerics starting with two letters.
pub fn isin(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let cleaned = strip_non_printable(value).trim().to_uppercase();
    if cleaned.is_empty() {
        return Ok(None);
    }
    let valid = cleaned.len() == 12
        && cleaned.chars().all(|c| c.is_ascii_alphanumeric())
        && cleaned.chars().take(2).all(|c| c.is_ascii_alphabetic());
    if !valid {
        return Err(ValidationError::InvalidIsin {
            field: "isin",
            value: cleaned,
        });
    }
    Ok(Some(cleaned))
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_chars_but_keeps_whitespace() {
        assert_eq!(strip_non_printable("a\u{0}b\u{7}c"), "abc");
        assert_eq!(strip_non_printable("a\tb\nc\rd"), "a\tb\nc\rd");
    }

    #[test]
    fn formula_prefix_is_neutralized() {
        assert_eq!(neutralize_formula("=HYPERLINK(\"x\")"), "'=HYPERLINK(\"x\")");
        assert_eq!(neutralize_formula("@SUM(A1)"), "'@SUM(A1)");
        assert_eq!(neutralize_formula("Dividend"), "Dividend");
    }

    #[test]
    fn required_rejects_blank() {
        assert_eq!(
            required_text("product", " \u{1} ", 10),
            Err(ValidationError::Empty { field: "product" })
        );
    }

    #[test]
    fn required_rejects_oversized() {
        let err = required_text("description", "abcdef", 5).unwrap_err();
        assert_eq!(err.field(), "description");
        assert!(matches!(err, ValidationError::TooLong { len: 6, max: 5, .. }));
    }

    #[test]
    fn optional_blank_is_none() {
        assert_eq!(optional_text("order_id", Some("  "), 10), Ok(None));
        assert_eq!(optional_text("order_id", None, 10), Ok(None));
        assert_eq!(
            optional_text("order_id", Some(" abc "), 10),
            Ok(Some("abc".to_string()))
        );
    }

    #[test]
    fn isin_validation() {
        assert_eq!(
            isin(Some("us0378331005")),
            Ok(Some("US0378331005".to_string()))
        );
        assert_eq!(isin(Some("")), Ok(None));
        assert!(isin(Some("US03783")).is_err());
        assert!(isin(Some("1203783310051")).is_err());
    }
}
