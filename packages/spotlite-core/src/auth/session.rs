//! Auth session manager.
//!
//! Responsibilities:
//! - Drive the PKCE login handshake (begin/complete)
//! - Own the persisted credential under one canonical key schema
//! - Renew the access token ahead of expiry with a single-shot timer
//! - Expose login/logout as the only externally visible transitions
//!
//! The session holds exactly one credential. Every credential update
//! (login, scheduled refresh, out-of-band update) cancels and re-arms the
//! refresh timer, so at most one timer is ever pending.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AuthError, AuthResult};
use crate::events::{EventEmitter, SessionEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::storage::SessionStore;

use super::pkce;
use super::token_client::{TokenApi, TokenResponse};

// Canonical storage schema. One set of keys; earlier incarnations of this
// client drifted between several namings and left stale entries behind.
const KEY_ACCESS_TOKEN: &str = "auth.access_token";
const KEY_REFRESH_TOKEN: &str = "auth.refresh_token";
const KEY_EXPIRES_AT: &str = "auth.expires_at";
const KEY_LOGIN_STATE: &str = "auth.login_state";
const KEY_CODE_VERIFIER: &str = "auth.code_verifier";

/// Upper bound on the refresh delay (24 hours).
const MAX_REFRESH_DELAY_MS: u64 = 86_400_000;

/// Computes the refresh timer delay in milliseconds.
///
/// Refresh fires `margin_secs` before expiry, never before now, and never
/// more than 24 hours out.
#[must_use]
pub(crate) fn refresh_delay_ms(expires_in_secs: u64, margin_secs: u64) -> u64 {
    expires_in_secs
        .saturating_mul(1000)
        .saturating_sub(margin_secs.saturating_mul(1000))
        .min(MAX_REFRESH_DELAY_MS)
}

/// Observable phase of the auth session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// No credential and no login in progress.
    Unauthenticated,
    /// `begin_login` ran; a verifier/state pair is pending.
    LoggingIn,
    /// A valid credential is stored and the refresh timer is armed.
    Authenticated,
    /// The refresh timer fired; a renewal call is in flight.
    Refreshing,
}

/// Prepared authorization redirect.
///
/// The core cannot navigate a user agent; the embedding shell opens the
/// URL (browser tab, webview, or printed for the headless agent).
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Full authorization URL including challenge, scopes, and state.
    pub url: String,
    /// The state nonce embedded in the URL, exposed for diagnostics.
    pub state: String,
}

/// Seam through which the player obtains the bearer credential.
pub trait TokenSource: Send + Sync {
    /// Returns the current access token, or `None` when unauthenticated or
    /// expired. Never blocks and never triggers a refresh.
    fn bearer_token(&self) -> Option<String>;
}

/// Owns the OAuth credential for the lifetime of a user session.
pub struct AuthSession {
    config: Config,
    store: Arc<dyn SessionStore>,
    token_api: Arc<dyn TokenApi>,
    clock: Arc<dyn Clock>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    phase: Mutex<AuthPhase>,
    /// Cancellation handle of the currently armed refresh timer, if any.
    refresh_timer: Mutex<Option<CancellationToken>>,
    /// Parent token; cancelling it tears down every timer this session armed.
    cancel_token: CancellationToken,
}

impl AuthSession {
    /// Creates a new session over the given collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        token_api: Arc<dyn TokenApi>,
        clock: Arc<dyn Clock>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            config,
            store,
            token_api,
            clock,
            emitter,
            spawner,
            phase: Mutex::new(AuthPhase::Unauthenticated),
            refresh_timer: Mutex::new(None),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: AuthPhase) {
        *self.phase.lock() = phase;
    }

    /// Prepares a login: generates the verifier/state pair, persists it
    /// (overwriting any previous pending pair), and returns the
    /// authorization URL for the shell to navigate to.
    pub fn begin_login(&self) -> AuthorizeRequest {
        let verifier = pkce::generate_verifier();
        let state = pkce::generate_state();
        let challenge = pkce::code_challenge(&verifier);

        self.store.set(KEY_LOGIN_STATE, &state);
        self.store.set(KEY_CODE_VERIFIER, &verifier);
        self.set_phase(AuthPhase::LoggingIn);

        let scope = self.config.scopes.join(" ");
        let url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&code_challenge_method=S256&code_challenge={}&state={}",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&challenge),
            urlencoding::encode(&state),
        );

        log::info!("[AuthSession] Login initiated, state={}", state);

        AuthorizeRequest { url, state }
    }

    /// Completes a login from the redirect's query parameters.
    ///
    /// The pending verifier/state pair is consumed immediately - before the
    /// exchange - so a replayed callback can never reuse it. A missing
    /// code, missing pending pair, or state mismatch all surface as
    /// [`AuthError::AuthorizationMismatch`] and never reach the token
    /// endpoint.
    pub async fn complete_login(
        self: &Arc<Self>,
        params: &HashMap<String, String>,
    ) -> AuthResult<()> {
        let stored_state = self.store.get(KEY_LOGIN_STATE);
        let verifier = self.store.get(KEY_CODE_VERIFIER);

        // Single use: erase the pending pair no matter how validation goes.
        self.store.remove(KEY_LOGIN_STATE);
        self.store.remove(KEY_CODE_VERIFIER);

        let returned_state = params.get("state");
        let code = params.get("code");

        let (verifier, code) = match (stored_state, verifier, returned_state, code) {
            (Some(stored), Some(verifier), Some(returned), Some(code)) if *returned == stored => {
                (verifier, code)
            }
            _ => {
                log::warn!("[AuthSession] Callback state mismatch or missing code, discarding");
                self.set_phase(AuthPhase::Unauthenticated);
                return Err(AuthError::AuthorizationMismatch);
            }
        };

        match self.token_api.exchange_code(code, &verifier).await {
            Ok(response) => {
                self.apply_credential(&response);
                self.emitter.emit_session(SessionEvent::LoggedIn {
                    timestamp: self.clock.now_millis(),
                });
                log::info!("[AuthSession] Login completed");
                Ok(())
            }
            Err(e) => {
                self.set_phase(AuthPhase::Unauthenticated);
                Err(e)
            }
        }
    }

    /// Returns the current access token, or `None` if unauthenticated or
    /// expired. Never blocks; renewal is timer-driven.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        let expires_at = self.stored_expires_at()?;
        if expires_at <= self.clock.now_millis() {
            return None;
        }
        self.store.get(KEY_ACCESS_TOKEN)
    }

    fn stored_expires_at(&self) -> Option<u64> {
        self.store.get(KEY_EXPIRES_AT)?.parse().ok()
    }

    /// Resumes a persisted session after a restart.
    ///
    /// A still-valid credential re-arms the timer for the remaining
    /// lifetime; an expired one with a refresh token triggers an immediate
    /// renewal; anything else stays unauthenticated.
    pub fn resume(self: &Arc<Self>) {
        let Some(expires_at) = self.stored_expires_at() else {
            return;
        };
        let now = self.clock.now_millis();
        let has_refresh = self.store.get(KEY_REFRESH_TOKEN).is_some();

        if expires_at > now {
            self.set_phase(AuthPhase::Authenticated);
            let remaining_secs = (expires_at - now) / 1000;
            self.schedule_refresh(remaining_secs);
            log::info!(
                "[AuthSession] Resumed session, credential valid for {}s",
                remaining_secs
            );
        } else if has_refresh {
            log::info!("[AuthSession] Resumed session with expired credential, refreshing now");
            self.schedule_refresh(0);
        } else {
            self.store.remove(KEY_ACCESS_TOKEN);
            self.store.remove(KEY_EXPIRES_AT);
        }
    }

    /// Exchanges the stored refresh token for a renewed credential.
    ///
    /// On any failure both tokens are cleared and the session transitions
    /// to logged-out: surviving half-credentials caused inconsistent retry
    /// behavior in earlier incarnations of this client, so failure always
    /// means a full re-login.
    pub async fn refresh(self: &Arc<Self>) -> AuthResult<()> {
        let Some(refresh_token) = self.store.get(KEY_REFRESH_TOKEN) else {
            self.force_logout();
            return Err(AuthError::RefreshFailed("no refresh token stored".into()));
        };

        self.set_phase(AuthPhase::Refreshing);

        match self.token_api.refresh(&refresh_token).await {
            Ok(response) => {
                self.apply_credential(&response);
                self.emitter.emit_session(SessionEvent::TokenRefreshed {
                    expires_at: self
                        .clock
                        .now_millis()
                        .saturating_add(response.expires_in.saturating_mul(1000)),
                    timestamp: self.clock.now_millis(),
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("[AuthSession] Refresh failed, forcing re-login: {}", e);
                self.emitter.emit_session(SessionEvent::RefreshFailed {
                    reason: e.to_string(),
                    timestamp: self.clock.now_millis(),
                });
                self.force_logout();
                Err(e)
            }
        }
    }

    /// Applies an out-of-band credential update (e.g. from a settings
    /// screen) and re-arms the timer.
    pub fn set_credential(
        self: &Arc<Self>,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: u64,
    ) {
        let response = TokenResponse {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in: expires_in_secs,
        };
        self.apply_credential(&response);
    }

    /// Stores a credential and re-arms the refresh timer.
    fn apply_credential(self: &Arc<Self>, response: &TokenResponse) {
        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(response.expires_in.saturating_mul(1000));
        self.store.set(KEY_ACCESS_TOKEN, &response.access_token);
        self.store.set(KEY_EXPIRES_AT, &expires_at.to_string());
        if let Some(refresh_token) = &response.refresh_token {
            self.store.set(KEY_REFRESH_TOKEN, refresh_token);
        }
        self.set_phase(AuthPhase::Authenticated);
        self.schedule_refresh(response.expires_in);
    }

    /// Arms the single-shot refresh timer, cancelling any previous one.
    fn schedule_refresh(self: &Arc<Self>, expires_in_secs: u64) {
        let delay_ms = refresh_delay_ms(expires_in_secs, self.config.refresh_margin_secs);

        let token = self.cancel_token.child_token();
        {
            let mut slot = self.refresh_timer.lock();
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            *slot = Some(token.clone());
        }

        log::debug!("[AuthSession] Refresh scheduled in {}ms", delay_ms);

        // Weak reference: a disposed session must not be kept alive (or
        // mutated) by its own timer.
        let weak = Arc::downgrade(self);
        self.spawner.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                    if let Some(session) = weak.upgrade() {
                        if let Err(e) = session.refresh().await {
                            log::warn!("[AuthSession] Scheduled refresh failed: {}", e);
                        }
                    }
                }
            }
        });
    }

    fn cancel_refresh_timer(&self) {
        if let Some(token) = self.refresh_timer.lock().take() {
            token.cancel();
        }
    }

    /// Clears the credential after a failed refresh. No `LoggedOut` event
    /// is emitted by the timer path's caller, so it is emitted here.
    fn force_logout(&self) {
        self.cancel_refresh_timer();
        self.remove_credential();
        self.set_phase(AuthPhase::Unauthenticated);
        self.emitter.emit_session(SessionEvent::LoggedOut {
            timestamp: self.clock.now_millis(),
        });
    }

    fn remove_credential(&self) {
        self.store.remove(KEY_ACCESS_TOKEN);
        self.store.remove(KEY_REFRESH_TOKEN);
        self.store.remove(KEY_EXPIRES_AT);
        self.store.remove(KEY_LOGIN_STATE);
        self.store.remove(KEY_CODE_VERIFIER);
    }

    /// Signs out: cancels the pending timer and erases the credential and
    /// any login-in-progress artifacts.
    pub fn logout(&self) {
        log::info!("[AuthSession] Logging out");
        self.cancel_refresh_timer();
        self.remove_credential();
        self.set_phase(AuthPhase::Unauthenticated);
        self.emitter.emit_session(SessionEvent::LoggedOut {
            timestamp: self.clock.now_millis(),
        });
    }

    /// Factory reset: sign out and wipe all other persisted application
    /// state (recently-played cache included).
    pub fn clear_all(&self) {
        log::info!("[AuthSession] Clearing all persisted state");
        self.cancel_refresh_timer();
        self.store.clear();
        self.set_phase(AuthPhase::Unauthenticated);
        self.emitter.emit_session(SessionEvent::LoggedOut {
            timestamp: self.clock.now_millis(),
        });
    }

    /// Tears the session down, cancelling every timer it armed. A leaked
    /// timer firing after teardown would mutate dead state.
    pub fn dispose(&self) {
        self.cancel_refresh_timer();
        self.cancel_token.cancel();
    }
}

impl TokenSource for AuthSession {
    fn bearer_token(&self) -> Option<String> {
        self.access_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::storage::MemoryStore;
    use crate::test_support::{ManualClock, MockTokenApi};

    fn make_session(
        store: Arc<MemoryStore>,
        api: Arc<MockTokenApi>,
        clock: Arc<ManualClock>,
    ) -> Arc<AuthSession> {
        let config = Config {
            client_id: "client".into(),
            redirect_uri: "http://127.0.0.1:8888/callback".into(),
            refresh_url: "https://refresh.example.test/token".into(),
            ..Config::default()
        };
        Arc::new(AuthSession::new(
            config,
            store,
            api,
            clock,
            Arc::new(NoopEventEmitter),
            TokioSpawner::current(),
        ))
    }

    fn callback(state: &str, code: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("state".to_string(), state.to_string());
        params.insert("code".to_string(), code.to_string());
        params
    }

    #[test]
    fn refresh_delay_is_one_minute_early() {
        assert_eq!(refresh_delay_ms(3600, 60), 3_540_000);
        assert_eq!(refresh_delay_ms(120, 60), 60_000);
    }

    #[test]
    fn refresh_delay_never_negative() {
        assert_eq!(refresh_delay_ms(30, 60), 0);
        assert_eq!(refresh_delay_ms(0, 60), 0);
    }

    #[test]
    fn refresh_delay_capped_at_24_hours() {
        assert_eq!(refresh_delay_ms(1_000_000, 60), 86_400_000);
    }

    #[tokio::test]
    async fn begin_login_persists_state_and_verifier() {
        let store = Arc::new(MemoryStore::new());
        let session = make_session(store.clone(), Arc::new(MockTokenApi::new()), ManualClock::arc(0));

        let request = session.begin_login();

        let stored_state = store.get("auth.login_state").unwrap();
        let verifier = store.get("auth.code_verifier").unwrap();
        assert_eq!(stored_state, request.state);
        assert_eq!(verifier.len(), 128);
        assert_eq!(session.phase(), AuthPhase::LoggingIn);

        // URL carries the derived challenge, not the verifier.
        let challenge = pkce::code_challenge(&verifier);
        assert!(request.url.contains("code_challenge_method=S256"));
        assert!(request.url.contains(&challenge));
        assert!(!request.url.contains(&verifier));
        assert!(request.url.contains("response_type=code"));
    }

    #[tokio::test]
    async fn matching_state_attempts_exchange() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        let session = make_session(store.clone(), api.clone(), ManualClock::arc(1_000));

        let request = session.begin_login();
        session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap();

        assert_eq!(api.exchange_count(), 1);
        assert_eq!(session.phase(), AuthPhase::Authenticated);
        assert!(session.access_token().is_some());
    }

    #[tokio::test]
    async fn mismatched_state_never_exchanges() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        let session = make_session(store.clone(), api.clone(), ManualClock::arc(0));

        session.begin_login();
        let err = session
            .complete_login(&callback("wrong", "abc"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::AuthorizationMismatch));
        assert_eq!(api.exchange_count(), 0);
        assert_eq!(session.phase(), AuthPhase::Unauthenticated);
        // Artifacts are consumed even on mismatch.
        assert!(store.get("auth.login_state").is_none());
        assert!(store.get("auth.code_verifier").is_none());
    }

    #[tokio::test]
    async fn consumed_verifier_cannot_be_replayed() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        let session = make_session(store, api.clone(), ManualClock::arc(0));

        let request = session.begin_login();
        let params = callback(&request.state, "abc");
        session.complete_login(&params).await.unwrap();

        let err = session.complete_login(&params).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationMismatch));
        assert_eq!(api.exchange_count(), 1);
    }

    #[tokio::test]
    async fn exchange_failure_resets_to_unauthenticated() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        api.fail_exchange(true);
        let session = make_session(store.clone(), api, ManualClock::arc(0));

        let request = session.begin_login();
        let err = session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::TokenExchangeFailed { status: 400, .. }));
        assert_eq!(session.phase(), AuthPhase::Unauthenticated);
        assert!(session.access_token().is_none());
    }

    #[tokio::test]
    async fn access_token_expires_by_clock() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::arc(0);
        let session = make_session(store, Arc::new(MockTokenApi::new()), clock.clone());

        let request = session.begin_login();
        session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap();

        assert!(session.access_token().is_some());
        clock.advance(3601 * 1000);
        assert!(session.access_token().is_none());
    }

    #[tokio::test]
    async fn refresh_failure_clears_both_tokens() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        let session = make_session(store.clone(), api.clone(), ManualClock::arc(0));

        let request = session.begin_login();
        session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap();
        assert!(store.get("auth.refresh_token").is_some());

        api.fail_refresh(true);
        let err = session.refresh().await.unwrap_err();

        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert!(store.get("auth.access_token").is_none());
        assert!(store.get("auth.refresh_token").is_none());
        assert_eq!(session.phase(), AuthPhase::Unauthenticated);
        assert!(session.bearer_token().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_fires_once_one_minute_early() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        api.set_expires_in(120);
        let session = make_session(store, api.clone(), ManualClock::arc(0));

        let request = session.begin_login();
        session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap();

        // expires_in=120 -> delay 60s. Just before: nothing fired.
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(api.refresh_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.refresh_count(), 1);
        assert_eq!(session.phase(), AuthPhase::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn credential_update_rearms_a_single_timer() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        api.set_expires_in(120);
        let session = make_session(store, api.clone(), ManualClock::arc(0));

        let request = session.begin_login();
        session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap();

        // Two manual updates in a row; only the last timer may survive.
        session.set_credential("manual-1", None, 120);
        session.set_credential("manual-2", None, 120);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(api.refresh_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_cancels_pending_refresh() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        api.set_expires_in(120);
        let session = make_session(store.clone(), api.clone(), ManualClock::arc(0));

        let request = session.begin_login();
        session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap();
        session.logout();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(api.refresh_count(), 0);
        assert!(store.get("auth.access_token").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_stops_the_cycle() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockTokenApi::new());
        api.set_expires_in(120);
        let session = make_session(store, api.clone(), ManualClock::arc(0));

        let request = session.begin_login();
        session
            .complete_login(&callback(&request.state, "abc"))
            .await
            .unwrap();

        api.fail_refresh(true);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(api.refresh_count(), 1);
        assert_eq!(session.phase(), AuthPhase::Unauthenticated);

        // No further attempts with the cleared credential.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(api.refresh_count(), 1);
    }

    #[tokio::test]
    async fn resume_rearms_from_persisted_credential() {
        let store = Arc::new(MemoryStore::new());
        store.set("auth.access_token", "persisted");
        store.set("auth.refresh_token", "persisted-refresh");
        store.set("auth.expires_at", "7200000");

        let session = make_session(
            store,
            Arc::new(MockTokenApi::new()),
            ManualClock::arc(3_600_000),
        );
        session.resume();

        assert_eq!(session.phase(), AuthPhase::Authenticated);
        assert_eq!(session.access_token().as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn clear_all_wipes_unrelated_keys() {
        let store = Arc::new(MemoryStore::new());
        store.set("player.recently_played", "[]");
        let session = make_session(store.clone(), Arc::new(MockTokenApi::new()), ManualClock::arc(0));

        session.clear_all();
        assert!(store.get("player.recently_played").is_none());
    }
}
