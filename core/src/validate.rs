//! Local argument validation.
//!
//! Everything here runs before a request is built, so a malformed call
//! never reaches the network.

use crate::attributes::Attributes;
use crate::error::{Result, SdbError};

pub const MIN_DOMAIN_NAME_LEN: usize = 3;
pub const MAX_DOMAIN_NAME_LEN: usize = 255;

fn is_domain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Accepts a domain name iff it is non-blank, 3 to 255 characters long and
/// made only of `[A-Za-z0-9_.-]`.
pub fn validate_domain_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SdbError::invalid_parameter("domain name must not be blank"));
    }
    let len = name.chars().count();
    if !(MIN_DOMAIN_NAME_LEN..=MAX_DOMAIN_NAME_LEN).contains(&len) {
        return Err(SdbError::invalid_parameter(format!(
            "domain name length {len} is outside {MIN_DOMAIN_NAME_LEN}..={MAX_DOMAIN_NAME_LEN}"
        )));
    }
    if let Some(bad) = name.chars().find(|c| !is_domain_char(*c)) {
        return Err(SdbError::invalid_parameter(format!(
            "domain name contains disallowed character {bad:?}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_item_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SdbError::invalid_parameter("item name must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_attribute_values(attributes: &Attributes) -> Result<()> {
    match attributes.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, value)) => Err(SdbError::invalid_parameter(format!(
            "attribute {name:?} has non-finite value {value}"
        ))),
        None => Ok(()),
    }
}

pub(crate) fn validate_expression(expression: &str) -> Result<()> {
    if expression.trim().is_empty() {
        return Err(SdbError::invalid_parameter("expression must not be blank"));
    }
    Ok(())
}

pub(crate) fn validate_page_size(limit: Option<u32>) -> Result<()> {
    if limit == Some(0) {
        return Err(SdbError::invalid_parameter("page size must be at least 1"));
    }
    Ok(())
}
