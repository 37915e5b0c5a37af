use lazy_static::lazy_static;
use regex::Regex;

use crate::error::AuthError;

lazy_static! {
    static ref MOBILE_RE: Regex = Regex::new(r"^\+?[0-9]{7,15}$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn is_valid_mobile(mobile: &str) -> bool {
    MOBILE_RE.is_match(mobile)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Trims and checks a mobile number.
pub fn mobile(raw: &str) -> Result<String, AuthError> {
    let mobile = raw.trim();
    if !is_valid_mobile(mobile) {
        return Err(AuthError::BadRequest("Invalid mobile number".into()));
    }
    Ok(mobile.to_string())
}

/// Trims and lowercases an email; blank means none.
pub fn email(raw: Option<&str>) -> Result<Option<String>, AuthError> {
    match raw.map(str::trim).filter(|e| !e.is_empty()) {
        None => Ok(None),
        Some(e) if is_valid_email(e) => Ok(Some(e.to_lowercase())),
        Some(_) => Err(AuthError::BadRequest("Invalid email".into())),
    }
}

pub fn name(raw: &str) -> Result<String, AuthError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AuthError::BadRequest("Name is required".into()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_numbers() {
        assert!(is_valid_mobile("9999999999"));
        assert!(is_valid_mobile("+919999999999"));
        assert!(!is_valid_mobile("99-99"));
        assert!(!is_valid_mobile("123"));
        assert!(!is_valid_mobile(""));
        assert_eq!(mobile("  1112223333 ").unwrap(), "1112223333");
        assert!(matches!(mobile("abc"), Err(AuthError::BadRequest(_))));
    }

    #[test]
    fn emails_are_optional() {
        assert_eq!(email(None).unwrap(), None);
        assert_eq!(email(Some("  ")).unwrap(), None);
        assert_eq!(email(Some("A@Example.com")).unwrap().as_deref(), Some("a@example.com"));
        assert!(email(Some("nope")).is_err());
    }

    #[test]
    fn names_must_not_be_blank() {
        assert_eq!(name(" Asha ").unwrap(), "Asha");
        assert!(name("   ").is_err());
    }
}
