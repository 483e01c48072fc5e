//! Field checks shared by the write paths.

use crate::error::{Error, Result};

pub fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Invalid(format!("{field}: This field may not be blank.")));
    }
    Ok(())
}

pub fn max_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(Error::Invalid(format!(
            "{field}: Ensure this field has no more than {max} characters."
        )));
    }
    Ok(())
}

/// Blank is accepted; optional email fields are stored as empty strings.
pub fn email(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(Error::Invalid(format!("{field}: Enter a valid email address.")));
    }
    Ok(())
}

pub fn url(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !value.contains(char::is_whitespace) => Ok(()),
        _ => Err(Error::Invalid(format!("{field}: Enter a valid URL."))),
    }
}

pub fn range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(Error::Invalid(format!(
            "{field}: Ensure this value is between {min} and {max}."
        )));
    }
    Ok(())
}

pub fn non_negative(field: &str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(Error::Invalid(format!(
            "{field}: Ensure this value is greater than or equal to 0."
        )));
    }
    Ok(())
}
