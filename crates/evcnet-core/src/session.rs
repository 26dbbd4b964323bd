// ── Session management ──
//
// Owns the one portal session of the account. Logins are serialized
// behind a single async mutex, so concurrent callers that find no
// session wait for the login already in flight and share its outcome
// instead of starting their own. Every installed session gets a new
// generation number; a failure reported against an older generation
// cannot discard a newer session.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use evcnet_api::{Credentials, PortalClient, Reply, Session, SessionCookie, Transport};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CoreError;
use crate::store::{KeyValueStore, keys};

/// Authentication state, observable through [`SessionManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// A session handed to a caller, tagged with its generation.
#[derive(Debug, Clone)]
pub struct SessionLease {
    pub session: Session,
    generation: u64,
}

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    generation: u64,
    /// Outcome of the latest failed login, tagged with the number of
    /// logins finished when it failed.
    last_failure: Option<(u64, CoreError)>,
}

/// Logs in, keeps the session cookie, and re-logs in once on expiry.
pub struct SessionManager<T: Transport> {
    client: Arc<PortalClient<T>>,
    credentials: Credentials,
    base_url: Url,
    store: Arc<dyn KeyValueStore>,
    slot: Mutex<Slot>,
    login_attempts: AtomicU64,
    logins_finished: AtomicU64,
    state: watch::Sender<AuthState>,
}

impl<T: Transport> SessionManager<T> {
    /// Create the manager, restoring a persisted cookie if it belongs to
    /// the same account and portal. A restored cookie is used as-is and
    /// only validated by the first request that carries it.
    pub fn new(
        client: Arc<PortalClient<T>>,
        credentials: Credentials,
        base_url: Url,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let restored = restore(store.as_ref(), &credentials.email, &base_url);
        let initial = if restored.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        let (state, _) = watch::channel(initial);

        Self {
            client,
            credentials,
            base_url,
            store,
            slot: Mutex::new(Slot {
                generation: u64::from(restored.is_some()),
                session: restored,
                last_failure: None,
            }),
            login_attempts: AtomicU64::new(0),
            logins_finished: AtomicU64::new(0),
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn client(&self) -> &PortalClient<T> {
        &self.client
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Return the current session, logging in first if there is none.
    pub async fn ensure_session(&self) -> Result<SessionLease, CoreError> {
        // Counted before queueing, so a login already in flight when we
        // arrive finishes after `seen` and its failure is shared with us.
        let seen = self.logins_finished.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;
        if let Some(session) = &slot.session {
            return Ok(SessionLease {
                session: session.clone(),
                generation: slot.generation,
            });
        }
        // A login that finished after we arrived already failed: share it.
        if let Some((_, err)) = slot.last_failure.as_ref().filter(|(finished, _)| *finished > seen) {
            return Err(err.clone());
        }

        let attempt = self.login_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.send_replace(AuthState::Authenticating);
        let outcome = self.client.login(&self.credentials).await;
        let finished = self.logins_finished.fetch_add(1, Ordering::AcqRel) + 1;
        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                self.state.send_replace(AuthState::Unauthenticated);
                warn!(attempt, error = %e, "login failed");
                let err = CoreError::from(e);
                slot.last_failure = Some((finished, err.clone()));
                return Err(err);
            }
        };

        info!(attempt, "portal login succeeded");
        slot.last_failure = None;
        slot.generation += 1;
        slot.session = Some(session.clone());
        self.persist(&session);
        self.state.send_replace(AuthState::Authenticated);

        Ok(SessionLease {
            session,
            generation: slot.generation,
        })
    }

    /// Drop the session `lease` came from, unless it was already replaced.
    pub async fn invalidate(&self, lease: &SessionLease) {
        let mut slot = self.slot.lock().await;
        if slot.generation != lease.generation || slot.session.is_none() {
            return;
        }
        slot.session = None;
        self.state.send_replace(AuthState::Unauthenticated);
        if let Err(e) = self.store.remove(keys::SESSION_COOKIE) {
            warn!(error = %e, "failed to clear persisted session");
        }
        debug!("session invalidated");
    }

    /// Fold cookies from a response into the session the request used.
    async fn absorb(&self, lease: &SessionLease, cookies: Vec<SessionCookie>) {
        if cookies.is_empty() {
            return;
        }
        let mut slot = self.slot.lock().await;
        if slot.generation != lease.generation {
            return;
        }
        let changed = slot
            .session
            .as_mut()
            .is_some_and(|session| session.merge(cookies));
        if let Some(session) = slot.session.as_ref().filter(|_| changed) {
            debug!(cookies = ?session, "session cookies updated");
            self.persist(session);
        }
    }

    // ── Authenticated requests ───────────────────────────────────────

    /// Run `op` with a valid session.
    ///
    /// If the portal rejects the session, the session is dropped, one new
    /// login happens, and `op` runs once more. A second rejection is an
    /// [`CoreError::Auth`].
    pub async fn run_authenticated<R, F, Fut>(&self, op: F) -> Result<R, CoreError>
    where
        F: Fn(Session) -> Fut,
        Fut: Future<Output = Result<Reply<R>, evcnet_api::Error>>,
    {
        let lease = self.ensure_session().await?;
        match op(lease.session.clone()).await {
            Ok(reply) => {
                self.absorb(&lease, reply.cookies).await;
                return Ok(reply.data);
            }
            Err(e) if e.is_session_expired() => {
                info!("portal session expired, logging in again");
                self.invalidate(&lease).await;
            }
            Err(e) => return Err(e.into()),
        }

        let lease = self.ensure_session().await?;
        match op(lease.session.clone()).await {
            Ok(reply) => {
                self.absorb(&lease, reply.cookies).await;
                Ok(reply.data)
            }
            Err(e) if e.is_session_expired() => {
                self.invalidate(&lease).await;
                Err(CoreError::Auth {
                    message: "portal rejected the session again after a fresh login".into(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Persistence ──────────────────────────────────────────────────

    fn persist(&self, session: &Session) {
        let writes = [
            (keys::SESSION_COOKIE, session.to_persisted()),
            (keys::EMAIL, self.credentials.email.clone()),
            (keys::BASE_URL, self.base_url.to_string()),
        ];
        for (key, value) in writes {
            if let Err(e) = self.store.set(key, &value) {
                warn!(key, error = %e, "failed to persist session state");
            }
        }
    }
}

fn restore(store: &dyn KeyValueStore, email: &str, base_url: &Url) -> Option<Session> {
    let read = |key| match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "failed to read persisted session state");
            None
        }
    };

    let cookie = read(keys::SESSION_COOKIE)?;
    let same_account = read(keys::EMAIL).is_some_and(|stored| stored.eq_ignore_ascii_case(email))
        && read(keys::BASE_URL).is_some_and(|stored| stored == base_url.as_str());
    if !same_account {
        debug!("persisted session belongs to another account, ignoring it");
        return None;
    }

    let session = Session::from_persisted(&cookie);
    if session.is_some() {
        info!("restored persisted portal session");
    }
    session
}
