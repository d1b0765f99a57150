//! Authentication session state machine.
//!
//! The machine is owned and mutated by one context (the UI side). Input
//! arrives as [`SessionEvent`]s through [`SessionMachine::update`]. Provider
//! calls run on spawned tasks; each task reports back through a channel and
//! its result is applied only when the owner drains completions with
//! [`SessionMachine::process_pending`], [`SessionMachine::next_completion`]
//! or [`SessionMachine::run_until_idle`]. Tasks hold a weak sender, so a
//! result that arrives after the machine is gone is discarded.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::capabilities::{
    AuthError, FederatedAuthError, IdentityProvider, PresentationContext,
};
use crate::config::SessionConfig;
use crate::event::{Completion, SessionEvent, SessionSignal, SignUpFailure, SignUpStage};
use crate::model::{AppUser, SessionState};
use crate::AppError;

/// Observable view of the session, published on every change.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub is_loading: bool,
    pub sign_in_succeeded: bool,
    pub sign_up_succeeded: bool,
    pub password_reset_succeeded: bool,
    pub last_error: Option<AppError>,
    pub pending_operations: usize,
}

enum Operation {
    SignIn { email: String, password: SecretString },
    SignUp { email: String, password: SecretString },
    ResetPassword { email: String },
    SendVerification,
    SignOut,
    Google { context: PresentationContext },
}

impl Operation {
    const fn name(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "sign_in",
            Self::SignUp { .. } => "sign_up",
            Self::ResetPassword { .. } => "password_reset",
            Self::SendVerification => "send_verification_email",
            Self::SignOut => "sign_out",
            Self::Google { .. } => "google_sign_in",
        }
    }

    const fn shows_loading(&self) -> bool {
        !matches!(self, Self::SendVerification | Self::SignOut)
    }

    /// Failed completion reported when the provider call never returned.
    fn abandoned(&self) -> Completion {
        match self {
            Self::SignIn { .. } => Completion::SignIn(Err(AuthError::Unknown)),
            Self::SignUp { .. } => Completion::SignUp(Err(SignUpFailure {
                stage: SignUpStage::Registration,
                error: AuthError::Unknown,
            })),
            Self::ResetPassword { .. } => Completion::PasswordReset(Err(AuthError::Unknown)),
            Self::SendVerification => Completion::Verification(Err(AuthError::Unknown)),
            Self::SignOut => Completion::SignOut(Err(AuthError::Unknown)),
            Self::Google { .. } => Completion::Google(Err(FederatedAuthError::Unknown)),
        }
    }
}

pub struct SessionMachine {
    provider: Arc<dyn IdentityProvider>,
    config: SessionConfig,

    state: SessionState,
    is_loading: bool,
    sign_in_succeeded: bool,
    sign_up_succeeded: bool,
    password_reset_succeeded: bool,
    last_error: Option<AppError>,
    signals: VecDeque<SessionSignal>,

    queue: VecDeque<Operation>,
    in_flight: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    observers: watch::Sender<SessionSnapshot>,
}

impl SessionMachine {
    /// Creates a session whose initial state mirrors the provider's.
    ///
    /// # Panics
    ///
    /// Operations spawn Tokio tasks, so the machine must be driven from
    /// within a Tokio runtime.
    pub fn new(provider: Arc<dyn IdentityProvider>, config: SessionConfig) -> Self {
        let state = state_from(provider.as_ref());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (observers, _) = watch::channel(SessionSnapshot {
            state,
            ..SessionSnapshot::default()
        });
        debug!(%state, "session created");

        Self {
            provider,
            config,
            state,
            is_loading: false,
            sign_in_succeeded: false,
            sign_up_succeeded: false,
            password_reset_succeeded: false,
            last_error: None,
            signals: VecDeque::new(),
            queue: VecDeque::new(),
            in_flight: 0,
            completions_tx,
            completions_rx,
            observers,
        }
    }

    // --- Observation ---

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_error(&self) -> Option<&AppError> {
        self.last_error.as_ref()
    }

    /// Operations started or queued but not yet applied.
    pub fn pending_operations(&self) -> usize {
        self.in_flight + self.queue.len()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            is_loading: self.is_loading,
            sign_in_succeeded: self.sign_in_succeeded,
            sign_up_succeeded: self.sign_up_succeeded,
            password_reset_succeeded: self.password_reset_succeeded,
            last_error: self.last_error.clone(),
            pending_operations: self.pending_operations(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.observers.subscribe()
    }

    /// Takes every queued signal, oldest first.
    pub fn drain_signals(&mut self) -> Vec<SessionSignal> {
        self.signals.drain(..).collect()
    }

    pub fn take_sign_in_succeeded(&mut self) -> bool {
        let taken = std::mem::take(&mut self.sign_in_succeeded);
        self.publish();
        taken
    }

    pub fn take_sign_up_succeeded(&mut self) -> bool {
        let taken = std::mem::take(&mut self.sign_up_succeeded);
        self.publish();
        taken
    }

    pub fn take_password_reset_succeeded(&mut self) -> bool {
        let taken = std::mem::take(&mut self.password_reset_succeeded);
        self.publish();
        taken
    }

    pub fn take_error(&mut self) -> Option<AppError> {
        let taken = self.last_error.take();
        self.publish();
        taken
    }

    // --- Events ---

    /// Applies one event. Requests that need the provider start (or queue)
    /// a call whose result is applied later by the completion drivers.
    #[instrument(skip_all, fields(event = event.name()))]
    pub fn update(&mut self, event: SessionEvent) {
        counter!("session.event", "event" => event.name()).increment(1);

        match event {
            SessionEvent::StatusCheckRequested => {
                self.state = state_from(self.provider.as_ref());
                self.publish();
            }
            SessionEvent::SignInAcknowledged => {
                self.state = SessionState::Authenticated;
                self.sign_in_succeeded = false;
                self.publish();
            }
            SessionEvent::SignUpAcknowledged => {
                self.state = SessionState::Unauthenticated;
                self.sign_up_succeeded = false;
                self.publish();
            }
            SessionEvent::SignInRequested { email, password } => {
                self.begin_credential_operation();
                self.submit(Operation::SignIn { email, password });
            }
            SessionEvent::SignUpRequested { email, password } => {
                self.begin_credential_operation();
                self.submit(Operation::SignUp { email, password });
            }
            SessionEvent::PasswordResetRequested { email } => {
                self.begin_credential_operation();
                self.submit(Operation::ResetPassword { email });
            }
            SessionEvent::VerificationEmailRequested => self.submit(Operation::SendVerification),
            SessionEvent::SignOutRequested => self.submit(Operation::SignOut),
            SessionEvent::GoogleSignInRequested { context } => {
                let Some(context) = context else {
                    warn!("no presentation context for Google sign-in, ignoring request");
                    return;
                };
                self.is_loading = true;
                self.submit(Operation::Google { context });
            }
        }
    }

    /// Re-reads the provider's session. Safe to call any number of times.
    pub fn check_status(&mut self) {
        self.update(SessionEvent::StatusCheckRequested);
    }

    pub fn acknowledge_sign_in(&mut self) {
        self.update(SessionEvent::SignInAcknowledged);
    }

    pub fn acknowledge_sign_up(&mut self) {
        self.update(SessionEvent::SignUpAcknowledged);
    }

    pub fn sign_in(&mut self, email: impl Into<String>, password: impl Into<String>) {
        self.update(SessionEvent::SignInRequested {
            email: email.into(),
            password: SecretString::new(password.into()),
        });
    }

    /// Registers the account, then sends the verification email. Loading
    /// stays on until both steps resolve.
    pub fn sign_up(&mut self, email: impl Into<String>, password: impl Into<String>) {
        self.update(SessionEvent::SignUpRequested {
            email: email.into(),
            password: SecretString::new(password.into()),
        });
    }

    pub fn request_password_reset(&mut self, email: impl Into<String>) {
        self.update(SessionEvent::PasswordResetRequested {
            email: email.into(),
        });
    }

    /// Resends the verification email for the signed-in account.
    pub fn send_verification_email(&mut self) {
        self.update(SessionEvent::VerificationEmailRequested);
    }

    /// Ends the session. The state becomes unauthenticated even when the
    /// provider reports a failure.
    pub fn sign_out(&mut self) {
        self.update(SessionEvent::SignOutRequested);
    }

    /// Starts Google sign-in from the presenting screen. Without a screen
    /// there is nothing to present from and the call is ignored.
    pub fn authenticate_with_google(&mut self, context: Option<PresentationContext>) {
        self.update(SessionEvent::GoogleSignInRequested { context });
    }

    // --- Completion delivery ---

    /// Applies every completion that has already arrived. Never waits.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    /// Waits for the next completion and applies it. Returns `false` when
    /// nothing is in flight.
    pub async fn next_completion(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.completions_rx.recv().await {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Drives the machine until no operation is in flight or queued.
    pub async fn run_until_idle(&mut self) {
        while self.next_completion().await {}
    }

    // --- Internals ---

    fn begin_credential_operation(&mut self) {
        self.is_loading = true;
        self.last_error = None;
    }

    fn submit(&mut self, operation: Operation) {
        if self.config.serialize_operations && self.in_flight > 0 {
            debug!(
                operation = operation.name(),
                queued = self.queue.len() + 1,
                "operation queued behind in-flight call"
            );
            self.queue.push_back(operation);
        } else {
            self.start(operation);
        }
        self.publish();
    }

    #[instrument(skip_all, fields(operation = operation.name()))]
    fn start(&mut self, operation: Operation) {
        self.in_flight += 1;
        counter!("session.operation.started", "operation" => operation.name()).increment(1);

        let provider = Arc::clone(&self.provider);
        let completions = self.completions_tx.downgrade();
        let settle = self.config.google_settle_delay();
        let abandoned = operation.abandoned();

        // The call runs in its own task so a panicking provider still
        // produces exactly one completion.
        let call = tokio::spawn(async move {
            run_operation(provider.as_ref(), operation, settle).await
        });
        tokio::spawn(async move {
            let completion = match call.await {
                Ok(completion) => completion,
                Err(error) => {
                    warn!(error = %error, "provider call did not complete");
                    counter!("session.operation.aborted").increment(1);
                    abandoned
                }
            };
            match completions.upgrade() {
                Some(tx) => {
                    if tx.send(completion).is_err() {
                        debug!("session dropped before completion was delivered");
                    }
                }
                None => debug!("session dropped, discarding completion"),
            }
        });
    }

    fn apply(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);

        let name = completion.name();
        let outcome = if completion.is_success() { "success" } else { "failure" };
        let ends_loading = completion.ends_loading();
        counter!("session.operation.completed", "operation" => name, "outcome" => outcome)
            .increment(1);

        match completion {
            Completion::SignIn(Ok(user)) => {
                info!(user_id = %user.id, "sign in succeeded");
                self.sign_in_succeeded = true;
                self.signals.push_back(SessionSignal::SignInSucceeded);
            }
            Completion::SignIn(Err(error)) => self.fail(name, error.into()),
            Completion::SignUp(Ok(user)) => {
                info!(user_id = %user.id, "sign up succeeded, verification email sent");
                self.sign_up_succeeded = true;
                self.signals.push_back(SessionSignal::SignUpSucceeded);
            }
            Completion::SignUp(Err(SignUpFailure { stage, error })) => {
                let error = AppError::from(error).with_context("stage", stage.as_str());
                self.fail(name, error);
            }
            Completion::PasswordReset(Ok(())) => {
                info!("password reset email sent");
                self.password_reset_succeeded = true;
                self.signals.push_back(SessionSignal::PasswordResetSucceeded);
            }
            Completion::PasswordReset(Err(error)) => self.fail(name, error.into()),
            Completion::Verification(Ok(())) => {
                self.signals.push_back(SessionSignal::VerificationEmailSent);
            }
            Completion::Verification(Err(error)) => self.fail(name, error.into()),
            Completion::SignOut(result) => {
                self.state = SessionState::Unauthenticated;
                self.sign_in_succeeded = false;
                match result {
                    Ok(()) => {
                        info!("signed out");
                        self.signals.push_back(SessionSignal::SignedOut);
                    }
                    Err(error) => self.fail(name, error.into()),
                }
            }
            Completion::Google(Ok(user)) => {
                info!(user_id = %user.id, "google sign in succeeded");
                self.state = SessionState::Authenticated;
                self.signals.push_back(SessionSignal::GoogleSignInSucceeded);
            }
            Completion::Google(Err(error)) => self.fail(name, error.into()),
        }

        if ends_loading {
            self.finish_loading();
        }
        if self.in_flight == 0 {
            if let Some(next) = self.queue.pop_front() {
                self.start(next);
            }
        }
        self.publish();
    }

    fn fail(&mut self, operation: &'static str, error: AppError) {
        warn!(operation, error = %error, "session operation failed");
        self.signals.push_back(SessionSignal::Failed(error.clone()));
        self.last_error = Some(error);
    }

    fn finish_loading(&mut self) {
        // Overlapping calls: the last resolution wins. Serialized calls keep
        // the indicator on while a loading operation is still queued.
        let still_waiting = self.config.serialize_operations
            && self.queue.iter().any(Operation::shows_loading);
        if !still_waiting {
            self.is_loading = false;
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.observers.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

impl Drop for SessionMachine {
    fn drop(&mut self) {
        if self.pending_operations() > 0 {
            debug!(
                pending = self.pending_operations(),
                "session dropped with operations outstanding"
            );
        }
    }
}

fn state_from(provider: &dyn IdentityProvider) -> SessionState {
    if provider.is_signed_in() {
        SessionState::Authenticated
    } else {
        SessionState::Unauthenticated
    }
}

async fn run_operation(
    provider: &dyn IdentityProvider,
    operation: Operation,
    settle: Duration,
) -> Completion {
    match operation {
        Operation::SignIn { email, password } => {
            Completion::SignIn(provider.sign_in(&email, &password).await)
        }
        Operation::SignUp { email, password } => {
            Completion::SignUp(sign_up_pipeline(provider, &email, &password).await)
        }
        Operation::ResetPassword { email } => {
            Completion::PasswordReset(provider.reset_password(&email).await)
        }
        Operation::SendVerification => {
            Completion::Verification(provider.send_verification_email().await)
        }
        Operation::SignOut => Completion::SignOut(provider.sign_out().await),
        Operation::Google { context } => {
            let result = provider.sign_in_with_google(&context).await;
            if result.is_ok() && !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
            Completion::Google(result)
        }
    }
}

async fn sign_up_pipeline(
    provider: &dyn IdentityProvider,
    email: &str,
    password: &SecretString,
) -> Result<AppUser, SignUpFailure> {
    let user = provider
        .sign_up(email, password)
        .await
        .map_err(|error| SignUpFailure {
            stage: SignUpStage::Registration,
            error,
        })?;
    provider
        .send_verification_email()
        .await
        .map_err(|error| SignUpFailure {
            stage: SignUpStage::Verification,
            error,
        })?;
    Ok(user)
}
