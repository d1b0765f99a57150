//! Validation of what the user types into the auth screens.
//!
//! The session machine forwards credentials as-is; these checks decide
//! whether the submit buttons are enabled and which hints to show.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const SIGN_UP_CONFIRMATION_MESSAGE: &str =
    "Please confirm your email via the link in your inbox!";
pub const SIGN_IN_SUCCESS_MESSAGE: &str = "You have successfully signed in!";
pub const PASSWORD_RESET_MESSAGE: &str = "Check your email to reset your password.";

const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("email is required")]
    MissingEmail,

    #[error("email address is not valid")]
    InvalidEmail,

    #[error("password is required")]
    MissingPassword,

    #[error("passwords do not match")]
    PasswordMismatch,
}

/// Syntactically plausible email address, trimmed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(s: impl Into<String>) -> Result<Self, CredentialError> {
        let s = s.into();
        let s = s.trim();
        if s.is_empty() {
            return Err(CredentialError::MissingEmail);
        }
        if !is_valid_email(s) {
            return Err(CredentialError::InvalidEmail);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EmailAddress([REDACTED])")
    }
}

/// `local@domain.tld` with no whitespace and an alphabetic TLD of two or
/// more letters.
pub fn is_valid_email(s: &str) -> bool {
    if s.len() > MAX_EMAIL_LEN || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && !host.starts_with('.')
        && !host.ends_with('.')
        && !host.contains("..")
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}

pub struct SignInForm {
    pub email: String,
    pub password: SecretString,
}

impl SignInForm {
    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<EmailAddress, CredentialError> {
        let email = EmailAddress::new(self.email.as_str())?;
        if self.password.expose_secret().is_empty() {
            return Err(CredentialError::MissingPassword);
        }
        Ok(email)
    }
}

pub struct SignUpForm {
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

impl SignUpForm {
    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }

    /// Whether the "passwords match" hint should be shown at all.
    pub fn shows_password_hint(&self) -> bool {
        !self.password.expose_secret().is_empty()
            && !self.confirm_password.expose_secret().is_empty()
    }

    pub fn passwords_match(&self) -> bool {
        self.password.expose_secret() == self.confirm_password.expose_secret()
    }

    pub fn validate(&self) -> Result<EmailAddress, CredentialError> {
        let email = EmailAddress::new(self.email.as_str())?;
        if !self.shows_password_hint() {
            return Err(CredentialError::MissingPassword);
        }
        if !self.passwords_match() {
            return Err(CredentialError::PasswordMismatch);
        }
        Ok(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    #[test]
    fn email_validation() {
        for ok in ["a@b.co", "first.last+tag@mail.example.org", "  x@y.io  "] {
            assert!(EmailAddress::new(ok).is_ok(), "{ok}");
        }
        for bad in ["", "plain", "@b.co", "a@", "a@b", "a@b.c", "a@@b.co", "a b@c.io", "a@b..co", "a@.co"] {
            assert!(EmailAddress::new(bad).is_err(), "{bad}");
        }
        assert_eq!(EmailAddress::new("   "), Err(CredentialError::MissingEmail));
        assert_eq!(EmailAddress::new(" x@y.io ").unwrap().as_str(), "x@y.io");
    }

    #[test]
    fn email_debug_is_redacted() {
        let email = EmailAddress::new("secret@mail.com").unwrap();
        assert!(!format!("{email:?}").contains("secret"));
    }

    #[test]
    fn sign_in_needs_email_and_password() {
        let mut form = SignInForm {
            email: "a@b.co".into(),
            password: secret(""),
        };
        assert_eq!(form.validate().unwrap_err(), CredentialError::MissingPassword);

        form.password = secret("pw");
        assert!(form.can_submit());
    }

    #[test]
    fn sign_up_requires_matching_passwords() {
        let mut form = SignUpForm {
            email: "a@b.co".into(),
            password: secret("one"),
            confirm_password: secret("two"),
        };
        assert!(form.shows_password_hint());
        assert_eq!(form.validate().unwrap_err(), CredentialError::PasswordMismatch);

        form.confirm_password = secret("one");
        assert!(form.can_submit());

        form.email = "nope".into();
        assert_eq!(form.validate().unwrap_err(), CredentialError::InvalidEmail);
    }
}
