//! Scripted capability doubles for exercising session and export flows.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbaImage;
use secrecy::SecretString;
use tokio::sync::Semaphore;

use super::{
    AuthError, AuthorizationStatus, FederatedAuthError, IdentityProvider, PhotoLibrary,
    PresentationContext,
};
use crate::model::AppUser;

type Scripted<T, E> = Mutex<Result<T, E>>;

/// Identity provider answering every call from a script.
///
/// Successful sign-in, sign-up and Google sign-in leave a session behind;
/// sign-out always ends it. Verification emails need a session.
pub struct ScriptedIdentityProvider {
    signed_in: AtomicBool,
    sign_in: Scripted<AppUser, AuthError>,
    sign_up: Scripted<AppUser, AuthError>,
    reset: Scripted<(), AuthError>,
    verification: Scripted<(), AuthError>,
    sign_out: Scripted<(), AuthError>,
    google: Scripted<AppUser, FederatedAuthError>,
    calls: Mutex<Vec<&'static str>>,
    gate: Option<Arc<Semaphore>>,
    panic_on_sign_in: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedIdentityProvider {
    pub fn new() -> Self {
        let user = AppUser::new("user-1", "user@example.com");
        Self {
            signed_in: AtomicBool::new(false),
            sign_in: Mutex::new(Ok(user.clone())),
            sign_up: Mutex::new(Ok(user.clone())),
            reset: Mutex::new(Ok(())),
            verification: Mutex::new(Ok(())),
            sign_out: Mutex::new(Ok(())),
            google: Mutex::new(Ok(user)),
            calls: Mutex::new(Vec::new()),
            gate: None,
            panic_on_sign_in: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn signed_in(self) -> Self {
        self.signed_in.store(true, Ordering::SeqCst);
        self
    }

    /// Every call waits for a permit on the returned semaphore.
    #[must_use]
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// `sign_in` panics instead of answering.
    #[must_use]
    pub fn panicking_on_sign_in(self) -> Self {
        self.panic_on_sign_in.store(true, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn with_sign_in(self, result: Result<AppUser, AuthError>) -> Self {
        set(&self.sign_in, result);
        self
    }

    #[must_use]
    pub fn with_sign_up(self, result: Result<AppUser, AuthError>) -> Self {
        set(&self.sign_up, result);
        self
    }

    #[must_use]
    pub fn with_reset(self, result: Result<(), AuthError>) -> Self {
        set(&self.reset, result);
        self
    }

    #[must_use]
    pub fn with_verification(self, result: Result<(), AuthError>) -> Self {
        set(&self.verification, result);
        self
    }

    #[must_use]
    pub fn with_sign_out(self, result: Result<(), AuthError>) -> Self {
        set(&self.sign_out, result);
        self
    }

    #[must_use]
    pub fn with_google(self, result: Result<AppUser, FederatedAuthError>) -> Self {
        set(&self.google, result);
        self
    }

    /// Provider calls in the order they started.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn active_calls(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: &'static str) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ScriptedIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn set<T, E>(slot: &Scripted<T, E>, result: Result<T, E>) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = result;
}

fn get<T: Clone, E: Clone>(slot: &Scripted<T, E>) -> Result<T, E> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

#[async_trait::async_trait]
impl IdentityProvider for ScriptedIdentityProvider {
    async fn sign_in(&self, _email: &str, _password: &SecretString) -> Result<AppUser, AuthError> {
        self.enter("sign_in").await;
        if self.panic_on_sign_in.load(Ordering::SeqCst) {
            self.leave();
            panic!("scripted sign-in panic");
        }
        let result = get(&self.sign_in);
        if result.is_ok() {
            self.signed_in.store(true, Ordering::SeqCst);
        }
        self.leave();
        result
    }

    async fn sign_up(&self, _email: &str, _password: &SecretString) -> Result<AppUser, AuthError> {
        self.enter("sign_up").await;
        let result = get(&self.sign_up);
        if result.is_ok() {
            self.signed_in.store(true, Ordering::SeqCst);
        }
        self.leave();
        result
    }

    async fn reset_password(&self, _email: &str) -> Result<(), AuthError> {
        self.enter("reset_password").await;
        let result = get(&self.reset);
        self.leave();
        result
    }

    async fn send_verification_email(&self) -> Result<(), AuthError> {
        self.enter("send_verification_email").await;
        let result = if self.signed_in.load(Ordering::SeqCst) {
            get(&self.verification)
        } else {
            Err(AuthError::NotAuthenticated)
        };
        self.leave();
        result
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.enter("sign_out").await;
        let result = get(&self.sign_out);
        self.signed_in.store(false, Ordering::SeqCst);
        self.leave();
        result
    }

    fn is_signed_in(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    async fn sign_in_with_google(
        &self,
        _context: &PresentationContext,
    ) -> Result<AppUser, FederatedAuthError> {
        self.enter("sign_in_with_google").await;
        let result = get(&self.google);
        if result.is_ok() {
            self.signed_in.store(true, Ordering::SeqCst);
        }
        self.leave();
        result
    }
}

/// In-memory photo library with a scripted permission flow.
pub struct ScriptedPhotoLibrary {
    status: Mutex<AuthorizationStatus>,
    after_request: AuthorizationStatus,
    fail_saves: AtomicBool,
    requests: AtomicUsize,
    saved: Mutex<Vec<RgbaImage>>,
}

impl ScriptedPhotoLibrary {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self {
            status: Mutex::new(status),
            after_request: status,
            fail_saves: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            saved: Mutex::new(Vec::new()),
        }
    }

    /// Status the user "chooses" when prompted.
    #[must_use]
    pub fn answering(mut self, status: AuthorizationStatus) -> Self {
        self.after_request = status;
        self
    }

    #[must_use]
    pub fn failing_saves(self) -> Self {
        self.fail_saves.store(true, Ordering::SeqCst);
        self
    }

    pub fn authorization_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<RgbaImage> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait::async_trait]
impl PhotoLibrary for ScriptedPhotoLibrary {
    fn authorization_status(&self) -> AuthorizationStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request_authorization(&self) -> AuthorizationStatus {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.can_request() {
            *status = self.after_request;
        }
        *status
    }

    async fn save_image(&self, image: &RgbaImage) -> std::io::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("disk full"));
        }
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(image.clone());
        Ok(())
    }
}
