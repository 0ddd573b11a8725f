use crate::error::{PrepError, Result};

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Basic email validation
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(PrepError::Validation("Email is required".to_string()));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(PrepError::Validation("Invalid email address".to_string()));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(PrepError::Validation("Invalid email address".to_string()));
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(PrepError::Validation(
            "Email domain must contain a dot".to_string(),
        ));
    }

    if email.chars().any(char::is_whitespace) {
        return Err(PrepError::Validation("Invalid email address".to_string()));
    }

    Ok(())
}

pub fn validate_name(name: &str) -> Result<()> {
    let len = name.trim().chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(PrepError::Validation(format!(
            "Name must be between {} and {} characters",
            MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PrepError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Validate a signup form, collecting every problem at once
pub fn validate_signup(
    name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> std::result::Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_name(name) {
        errors.push(message(e));
    }
    if let Err(e) = validate_email(email) {
        errors.push(message(e));
    }
    if let Err(e) = validate_password(password) {
        errors.push(message(e));
    }
    if password != confirm_password {
        errors.push("Passwords must match".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn message(err: PrepError) -> String {
    match err {
        PrepError::Validation(msg) => msg,
        other => other.to_string(),
    }
}

/// Normalize an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
