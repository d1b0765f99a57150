use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::{AuthError, FederatedAuthError, PresentationContext};
use crate::credentials::{
    PASSWORD_RESET_MESSAGE, SIGN_IN_SUCCESS_MESSAGE, SIGN_UP_CONFIRMATION_MESSAGE,
};
use crate::model::AppUser;
use crate::AppError;

/// Input to [`crate::SessionMachine::update`]. The command methods on the
/// machine are shorthands for sending one of these.
#[derive(Debug)]
pub enum SessionEvent {
    StatusCheckRequested,
    SignInRequested {
        email: String,
        password: SecretString,
    },
    SignInAcknowledged,
    SignUpRequested {
        email: String,
        password: SecretString,
    },
    SignUpAcknowledged,
    PasswordResetRequested {
        email: String,
    },
    VerificationEmailRequested,
    SignOutRequested,
    GoogleSignInRequested {
        context: Option<PresentationContext>,
    },
}

impl SessionEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StatusCheckRequested => "status_check_requested",
            Self::SignInRequested { .. } => "sign_in_requested",
            Self::SignInAcknowledged => "sign_in_acknowledged",
            Self::SignUpRequested { .. } => "sign_up_requested",
            Self::SignUpAcknowledged => "sign_up_acknowledged",
            Self::PasswordResetRequested { .. } => "password_reset_requested",
            Self::VerificationEmailRequested => "verification_email_requested",
            Self::SignOutRequested => "sign_out_requested",
            Self::GoogleSignInRequested { .. } => "google_sign_in_requested",
        }
    }
}

/// Edge-triggered session outcome, queued once per resolved operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionSignal {
    SignInSucceeded,
    SignUpSucceeded,
    PasswordResetSucceeded,
    VerificationEmailSent,
    SignedOut,
    GoogleSignInSucceeded,
    Failed(AppError),
}

impl SessionSignal {
    /// Alert text for the signal, if the auth screens show one.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::SignInSucceeded => Some(SIGN_IN_SUCCESS_MESSAGE.into()),
            Self::SignUpSucceeded | Self::VerificationEmailSent => {
                Some(SIGN_UP_CONFIRMATION_MESSAGE.into())
            }
            Self::PasswordResetSucceeded => Some(PASSWORD_RESET_MESSAGE.into()),
            Self::SignedOut | Self::GoogleSignInSucceeded => None,
            Self::Failed(error) => Some(error.user_facing_message()),
        }
    }
}

/// Stage of the sign-up pipeline that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignUpStage {
    Registration,
    Verification,
}

impl SignUpStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Verification => "verification",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SignUpFailure {
    pub stage: SignUpStage,
    pub error: AuthError,
}

impl fmt::Display for SignUpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sign-up {} failed: {}", self.stage.as_str(), self.error)
    }
}

/// Result of a provider call, carried back to the session's owner.
#[derive(Debug)]
pub(crate) enum Completion {
    SignIn(Result<AppUser, AuthError>),
    SignUp(Result<AppUser, SignUpFailure>),
    PasswordReset(Result<(), AuthError>),
    Verification(Result<(), AuthError>),
    SignOut(Result<(), AuthError>),
    Google(Result<AppUser, FederatedAuthError>),
}

impl Completion {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::SignIn(_) => "sign_in",
            Self::SignUp(_) => "sign_up",
            Self::PasswordReset(_) => "password_reset",
            Self::Verification(_) => "send_verification_email",
            Self::SignOut(_) => "sign_out",
            Self::Google(_) => "google_sign_in",
        }
    }

    pub(crate) const fn is_success(&self) -> bool {
        match self {
            Self::SignIn(r) => r.is_ok(),
            Self::SignUp(r) => r.is_ok(),
            Self::PasswordReset(r) | Self::Verification(r) | Self::SignOut(r) => r.is_ok(),
            Self::Google(r) => r.is_ok(),
        }
    }

    /// Whether the originating operation turned the loading indicator on.
    pub(crate) const fn ends_loading(&self) -> bool {
        !matches!(self, Self::Verification(_) | Self::SignOut(_))
    }
}
