#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use secrecy::SecretString;
use shared::capabilities::{AuthError, FederatedAuthError, IdentityProvider, PresentationContext};
use shared::AppUser;

/// Provider that accepts any credentials and records calls.
pub struct StubProvider {
    signed_in: AtomicBool,
    reject_sign_in: bool,
    reject_google: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            signed_in: AtomicBool::new(false),
            reject_sign_in: false,
            reject_google: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_sign_in(mut self) -> Self {
        self.reject_sign_in = true;
        self
    }

    pub fn rejecting_google(mut self) -> Self {
        self.reject_google = true;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn user(email: &str) -> AppUser {
        AppUser::new("uid-42", email)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StubProvider {
    async fn sign_in(&self, email: &str, _password: &SecretString) -> Result<AppUser, AuthError> {
        self.record("sign_in");
        if self.reject_sign_in {
            return Err(AuthError::InvalidCredentials);
        }
        self.signed_in.store(true, Ordering::SeqCst);
        Ok(Self::user(email))
    }

    async fn sign_up(&self, email: &str, _password: &SecretString) -> Result<AppUser, AuthError> {
        self.record("sign_up");
        self.signed_in.store(true, Ordering::SeqCst);
        Ok(Self::user(email))
    }

    async fn reset_password(&self, _email: &str) -> Result<(), AuthError> {
        self.record("reset_password");
        Ok(())
    }

    async fn send_verification_email(&self) -> Result<(), AuthError> {
        self.record("send_verification_email");
        if self.signed_in.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AuthError::NotAuthenticated)
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.record("sign_out");
        self.signed_in.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_signed_in(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    async fn sign_in_with_google(
        &self,
        _context: &PresentationContext,
    ) -> Result<AppUser, FederatedAuthError> {
        self.record("sign_in_with_google");
        if self.reject_google {
            return Err(FederatedAuthError::MissingTokens);
        }
        self.signed_in.store(true, Ordering::SeqCst);
        Ok(Self::user("google@example.com"))
    }
}

/// Bounding box of pixels equal to `color`: (min_x, min_y, max_x, max_y).
pub fn bounds_of(image: &image::RgbaImage, color: image::Rgba<u8>) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in image.enumerate_pixels() {
        if *p == color {
            let b = bounds.get_or_insert((x, y, x, y));
            b.0 = b.0.min(x);
            b.1 = b.1.min(y);
            b.2 = b.2.max(x);
            b.3 = b.3.max(y);
        }
    }
    bounds
}
