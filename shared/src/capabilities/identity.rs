use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::AppUser;

/// Failure reported by the email/password identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AuthError {
    #[error("Unknown error while trying to log in")]
    Unknown,

    #[error("User is not authenticated")]
    NotAuthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("This email is already in use")]
    EmailInUse,

    #[error("Password is too weak")]
    WeakPassword,

    /// Provider error passed through with its own message and numeric code.
    #[error("{message}")]
    Custom { message: String, code: Option<i64> },
}

impl AuthError {
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Unknown => 1001,
            Self::NotAuthenticated => 1002,
            Self::InvalidCredentials => 1003,
            Self::EmailInUse => 1004,
            Self::WeakPassword => 1005,
            Self::Custom { code, .. } => match code {
                Some(code) => *code,
                None => 0,
            },
        }
    }
}

/// Failure of the federated (Google) sign-in pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FederatedAuthError {
    #[error("Missing Google client ID in the app configuration")]
    MissingClientConfig,

    #[error("Google Sign-In failed: {cause}")]
    ProviderSignInFailed { cause: String },

    #[error("Failed to retrieve Google authentication tokens")]
    MissingTokens,

    #[error("Authentication with Google credentials failed: {cause}")]
    BackendSignInFailed { cause: String },

    #[error("An unknown error occurred during Google Sign-In")]
    Unknown,
}

/// Opaque handle to the screen that presents the federated sign-in sheet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresentationContext {
    pub screen_id: String,
}

impl PresentationContext {
    pub fn new(screen_id: impl Into<String>) -> Self {
        Self {
            screen_id: screen_id.into(),
        }
    }
}

/// Account operations backed by the platform identity SDK.
///
/// Implementations resolve every call exactly once. The session machine
/// never calls back into the provider from inside a completion.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AppUser, AuthError>;

    /// Creates the account. Providers leave the new account signed in.
    async fn sign_up(&self, email: &str, password: &SecretString) -> Result<AppUser, AuthError>;

    async fn reset_password(&self, email: &str) -> Result<(), AuthError>;

    /// Sends a verification email to the signed-in account.
    async fn send_verification_email(&self) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Whether a provider session exists right now.
    fn is_signed_in(&self) -> bool;

    /// Runs the whole federated flow: present the Google sheet from
    /// `context`, exchange tokens, then sign in to the backend.
    async fn sign_in_with_google(
        &self,
        context: &PresentationContext,
    ) -> Result<AppUser, FederatedAuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AuthError::Unknown.code(), 1001);
        assert_eq!(AuthError::NotAuthenticated.code(), 1002);
        assert_eq!(AuthError::WeakPassword.code(), 1005);
        let custom = AuthError::Custom {
            message: "quota".into(),
            code: None,
        };
        assert_eq!(custom.code(), 0);
        assert_eq!(custom.to_string(), "quota");
    }

    #[test]
    fn federated_messages_carry_cause() {
        let err = FederatedAuthError::ProviderSignInFailed {
            cause: "user cancelled".into(),
        };
        assert_eq!(err.to_string(), "Google Sign-In failed: user cancelled");
    }
}
