use crate::error::{ReadingError, Result};

/// Parse the operator's typed reading. Blank input is "not yet provided".
/// A lone comma is accepted as the decimal separator.
pub fn parse_reading(text: &str) -> Result<Option<f64>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let normalized = if !trimmed.contains('.') && trimmed.matches(',').count() == 1 {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };

    let value: f64 = normalized
        .parse()
        .map_err(|_| ReadingError::InvalidValue(format!("'{trimmed}' is not a number")))?;

    if !value.is_finite() {
        return Err(ReadingError::InvalidValue(format!("'{trimmed}' is not finite")));
    }
    if value < 0.0 {
        return Err(ReadingError::InvalidValue("readings cannot be negative".into()));
    }

    Ok(Some(value))
}
