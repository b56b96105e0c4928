//! Utilidades de validación
//!
//! Funciones helper usadas por los DTOs con `#[validate(custom = "...")]`.

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::services::totals::MAX_AMOUNT;

/// Validar que un string no esté vacío
pub fn validate_not_empty(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("not_empty");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar formato de email
pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    if !value.contains('@') || !value.contains('.') {
        let mut error = ValidationError::new("email");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar formato de teléfono (básico)
pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let clean_phone = value.chars().filter(|c| c.is_ascii_digit()).count();
    if !(7..=15).contains(&clean_phone) {
        let mut error = ValidationError::new("phone");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar que un monto o cantidad no sea negativo
pub fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut error = ValidationError::new("non_negative");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar un monto o cantidad: no negativo y dentro de NUMERIC(12,2)
pub fn validate_money(value: &Decimal) -> Result<(), ValidationError> {
    validate_non_negative(value)?;
    if *value > MAX_AMOUNT {
        let mut error = ValidationError::new("max_amount");
        error.add_param("value".into(), &value.to_string());
        error.add_param("max".into(), &MAX_AMOUNT.to_string());
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_validate_not_empty() {
        assert!(validate_not_empty("brake pads").is_ok());
        assert!(validate_not_empty("   ").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("ana-at-example").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("(555) 123-4567").is_ok());
        assert!(validate_phone("12").is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative(&Decimal::from_str("0.00").unwrap()).is_ok());
        assert!(validate_non_negative(&Decimal::from_str("25.50").unwrap()).is_ok());
        assert!(validate_non_negative(&Decimal::from_str("-0.01").unwrap()).is_err());
    }

    #[test]
    fn test_validate_money() {
        assert!(validate_money(&Decimal::from_str("9999999999.99").unwrap()).is_ok());
        assert!(validate_money(&Decimal::from_str("10000000000").unwrap()).is_err());
        assert!(validate_money(&Decimal::MAX).is_err());
        assert!(validate_money(&Decimal::from_str("-1").unwrap()).is_err());
    }
}
