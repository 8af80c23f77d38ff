use crate::error::{AppError, Result};

const MIN_PASSWORD_LEN: usize = 8;

pub fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_argument("Name is required"));
    }
    Ok(name.to_string())
}

/// Trimmed, lowercased address. Only the presence of a local part and a
/// domain around a single `@` is checked.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(AppError::invalid_argument("Invalid email")),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid_argument(
            "Password must be at least 8 characters",
        ));
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(AppError::invalid_argument(
            "Password must contain at least one letter and one number",
        ));
    }
    Ok(())
}
