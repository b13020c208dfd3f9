use crate::error::{AppError, Result};

/// Validates a CPF (11-digit national id).
///
/// # Arguments
///
/// * `cpf` - The national id to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the id is well-formed.
pub fn validate_cpf(cpf: &str) -> Result<()> {
    if cpf.len() != 11 || !cpf.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "CPF must be exactly 11 digits".to_string(),
        ));
    }

    Ok(())
}

/// Validates a user's display name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Name cannot be empty".to_string()));
    }

    if name.len() > 255 {
        return Err(AppError::Validation(
            "Name must be at most 255 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates the shape of an email address.
///
/// Deliberately loose: the unique index and the confirmation flow are the
/// real gatekeepers, this only rejects obvious garbage.
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();

    if email.is_empty() || email.len() > 255 {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::Validation("Invalid email address".to_string()));
    };

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpf_must_be_eleven_digits() {
        assert!(validate_cpf("12345678901").is_ok());
        assert!(validate_cpf("1234567890").is_err());
        assert!(validate_cpf("123456789012").is_err());
        assert!(validate_cpf("1234567890a").is_err());
    }

    #[test]
    fn name_must_be_non_blank() {
        assert!(validate_name("Ana Souza").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn email_shape_checks() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email(" a@x.com ").is_ok());
        assert!(validate_email("ax.com").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a@nodot").is_err());
    }
}
