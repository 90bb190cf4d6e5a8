//! Single-flight coordination of token refreshes
//!
//! When several requests see `401 Unauthorized` at once, only one of them
//! may call the refresh endpoint. The first caller to arrive while no
//! refresh is running becomes the round's *leader* and performs the
//! refresh; every caller that arrives while the round is open becomes a
//! *follower*: its continuation is queued and it waits for the leader's
//! outcome.
//!
//! ```text
//!            first 401                      refresh ok / err
//!   Idle ──────────────────▶ Refreshing ─────────────────────▶ Idle
//!                              │   ▲
//!                  later 401s  └───┘ queued (FIFO)
//! ```
//!
//! When the round settles every queued follower receives the same outcome,
//! in arrival order. A failed round also clears the stored credentials and
//! emits [`SessionEvent::ForcedLogout`] once, whatever the queue size.
//!
//! The round state sits behind a `std::sync::Mutex` that is only held for
//! the synchronous transitions, never across an `.await`. The "refreshing"
//! flag is set before the leader awaits the refresh call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::auth::refresh::TokenRefresher;
use crate::auth::session::{SessionEvent, SessionSignal};
use crate::auth::token_store::TokenStore;
use crate::error::{AtelierError, Result};

/// Result handed to queued followers.
type RoundOutcome = std::result::Result<String, RoundFailure>;

/// Why a round ended without a token.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RoundFailure {
    /// The refresh call failed; credentials are gone.
    Rejected(String),
    /// The leader's future was dropped mid-round; credentials are untouched.
    Abandoned,
}

impl From<RoundFailure> for AtelierError {
    fn from(failure: RoundFailure) -> Self {
        match failure {
            RoundFailure::Rejected(reason) => AtelierError::RefreshFailed(reason),
            RoundFailure::Abandoned => AtelierError::RefreshAbandoned,
        }
    }
}

#[derive(Debug, Default)]
struct RoundState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<RoundOutcome>>,
}

enum Role {
    Leader,
    Follower(oneshot::Receiver<RoundOutcome>),
}

/// Ensures at most one refresh is in flight and fans its outcome out to
/// every caller that asked for one meanwhile.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use atelier::auth::coordinator::RefreshCoordinator;
/// use atelier::auth::refresh::TokenRefresher;
/// use atelier::auth::session::SessionSignal;
/// use atelier::auth::token_store::TokenStore;
///
/// struct Fixed;
///
/// #[async_trait::async_trait]
/// impl TokenRefresher for Fixed {
///     async fn refresh(&self) -> atelier::Result<String> {
///         Ok("A2".to_string())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let coordinator = RefreshCoordinator::new(
///     Arc::new(Fixed),
///     TokenStore::in_memory(),
///     SessionSignal::new(),
/// );
/// assert_eq!(coordinator.refresh().await.unwrap(), "A2");
/// assert!(!coordinator.is_refreshing());
/// # });
/// ```
pub struct RefreshCoordinator {
    state: Mutex<RoundState>,
    refresher: Arc<dyn TokenRefresher>,
    store: TokenStore,
    signal: SessionSignal,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("pending", &state.waiters.len())
            .finish()
    }
}

impl RefreshCoordinator {
    /// Creates an idle coordinator.
    ///
    /// # Arguments
    ///
    /// * `refresher` - Performs the actual refresh call.
    /// * `store` - Cleared when a round fails.
    /// * `signal` - Receives [`SessionEvent::ForcedLogout`] when a round
    ///   fails.
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        store: TokenStore,
        signal: SessionSignal,
    ) -> Self {
        Self {
            state: Mutex::new(RoundState::default()),
            refresher,
            store,
            signal,
        }
    }

    /// Returns a fresh access token, joining the open round if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::RefreshFailed`] when the round fails. Every
    /// caller of the round receives the same reason. Followers of a round
    /// whose leader was dropped get [`AtelierError::RefreshAbandoned`].
    pub async fn refresh(&self) -> Result<String> {
        let role = {
            let mut state = self.lock_state();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                tracing::debug!(position = state.waiters.len(), "queued behind refresh");
                Role::Follower(rx)
            } else {
                state.refreshing = true;
                Role::Leader
            }
        };

        match role {
            Role::Leader => self.lead().await,
            Role::Follower(rx) => match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(failure)) => Err(AtelierError::from(failure).into()),
                Err(_) => Err(AtelierError::RefreshAbandoned.into()),
            },
        }
    }

    /// `true` while a refresh round is open.
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// Number of followers waiting on the open round.
    pub fn pending(&self) -> usize {
        self.lock_state().waiters.len()
    }

    async fn lead(&self) -> Result<String> {
        let mut round = OpenRound {
            coordinator: self,
            settled: false,
        };

        match self.refresher.refresh().await {
            Ok(token) => {
                round.settle(Ok(token.clone()));
                Ok(token)
            }
            Err(e) => {
                let reason = match e.downcast_ref::<AtelierError>() {
                    Some(AtelierError::RefreshFailed(reason)) => reason.clone(),
                    _ => e.to_string(),
                };
                tracing::warn!(%reason, "token refresh failed, ending session");

                // Credentials go before anyone is released so no caller can
                // pick up the rejected access token afterwards.
                self.store.clear_all();
                round.settle(Err(RoundFailure::Rejected(reason.clone())));
                self.signal.emit(SessionEvent::ForcedLogout {
                    reason: reason.clone(),
                });

                Err(AtelierError::RefreshFailed(reason).into())
            }
        }
    }

    /// Closes the round and resolves every follower, oldest first.
    fn settle(&self, outcome: RoundOutcome) {
        let waiters = {
            let mut state = self.lock_state();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };

        tracing::debug!(
            followers = waiters.len(),
            success = outcome.is_ok(),
            "refresh round settled"
        );

        for waiter in waiters {
            // A follower that went away is simply skipped.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RoundState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Leader-side handle on the open round. Settles the round as failed if the
/// leader is dropped before it finishes.
struct OpenRound<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl OpenRound<'_> {
    fn settle(&mut self, outcome: RoundOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for OpenRound<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("refresh leader dropped, releasing followers");
            self.coordinator.settle(Err(RoundFailure::Abandoned));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token_store::TokenKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Refresher that blocks until released and counts its calls.
    struct GatedRefresher {
        calls: AtomicUsize,
        gate: Notify,
        outcome: std::result::Result<String, String>,
    }

    impl GatedRefresher {
        fn new(outcome: std::result::Result<String, String>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                outcome,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn release(&self) {
            self.gate.notify_one();
        }
    }

    #[async_trait::async_trait]
    impl TokenRefresher for GatedRefresher {
        async fn refresh(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.outcome
                .clone()
                .map_err(|reason| AtelierError::RefreshFailed(reason).into())
        }
    }

    fn seeded_store() -> TokenStore {
        let store = TokenStore::in_memory();
        store.save(TokenKey::AccessToken, "A1");
        store.save(TokenKey::RefreshToken, "R1");
        store
    }

    fn coordinator(
        refresher: Arc<GatedRefresher>,
        store: TokenStore,
        signal: SessionSignal,
    ) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(refresher, store, signal))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if cond() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_idle_coordinator_reports_no_round() {
        let refresher = GatedRefresher::new(Ok("A2".into()));
        let c = coordinator(refresher, TokenStore::in_memory(), SessionSignal::new());
        assert!(!c.is_refreshing());
        assert_eq!(c.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let refresher = GatedRefresher::new(Ok("A2".into()));
        let c = coordinator(refresher.clone(), seeded_store(), SessionSignal::new());

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let c = Arc::clone(&c);
                tokio::spawn(async move { c.refresh().await })
            })
            .collect();

        wait_until(|| c.pending() == 4).await;
        assert!(c.is_refreshing());
        refresher.release();

        for handle in handles {
            let token = handle.await.unwrap().expect("refresh should succeed");
            assert_eq!(token, "A2");
        }
        assert_eq!(refresher.calls(), 1);
        assert!(!c.is_refreshing());
        assert_eq!(c.pending(), 0);
    }

    #[tokio::test]
    async fn test_followers_resume_in_arrival_order() {
        let refresher = GatedRefresher::new(Ok("A2".into()));
        let c = coordinator(refresher.clone(), seeded_store(), SessionSignal::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (i, name) in ["A", "B", "C"].into_iter().enumerate() {
            let c2 = Arc::clone(&c);
            let order2 = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let result = c2.refresh().await;
                order2.lock().unwrap().push(name);
                result
            }));
            if i == 0 {
                wait_until(|| c.is_refreshing()).await;
            } else {
                wait_until(|| c.pending() == i).await;
            }
        }

        refresher.release();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_failed_round_rejects_everyone_and_clears_credentials() {
        let refresher = GatedRefresher::new(Err("refresh endpoint returned 400".into()));
        let store = seeded_store();
        let signal = SessionSignal::new();
        let mut events = signal.subscribe();
        let c = coordinator(refresher.clone(), store.clone(), signal);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let c = Arc::clone(&c);
                tokio::spawn(async move { c.refresh().await })
            })
            .collect();

        wait_until(|| c.pending() == 2).await;
        refresher.release();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            match err.downcast_ref::<AtelierError>() {
                Some(AtelierError::RefreshFailed(reason)) => {
                    assert_eq!(reason, "refresh endpoint returned 400")
                }
                other => panic!("expected RefreshFailed, got {other:?}"),
            }
        }

        assert_eq!(refresher.calls(), 1);
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::ForcedLogout {
                reason: "refresh endpoint returned 400".into()
            }
        );
        assert!(events.try_recv().is_err(), "logout must fire exactly once");
    }

    #[tokio::test]
    async fn test_successful_round_emits_no_session_event() {
        let refresher = GatedRefresher::new(Ok("A2".into()));
        let signal = SessionSignal::new();
        let mut events = signal.subscribe();
        let c = coordinator(refresher.clone(), seeded_store(), signal);

        refresher.release();
        c.refresh().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_each_settled_round_allows_a_new_one() {
        let refresher = GatedRefresher::new(Ok("A2".into()));
        let c = coordinator(refresher.clone(), seeded_store(), SessionSignal::new());

        refresher.release();
        c.refresh().await.unwrap();
        refresher.release();
        c.refresh().await.unwrap();

        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_followers() {
        let refresher = GatedRefresher::new(Ok("A2".into()));
        let store = seeded_store();
        let signal = SessionSignal::new();
        let mut events = signal.subscribe();
        let c = coordinator(refresher.clone(), store.clone(), signal);

        let leader = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.refresh().await })
        };
        wait_until(|| c.is_refreshing()).await;

        let follower = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.refresh().await })
        };
        wait_until(|| c.pending() == 1).await;

        leader.abort();
        let err = follower.await.unwrap().unwrap_err();
        let err = err.downcast_ref::<AtelierError>().unwrap();
        assert!(matches!(err, AtelierError::RefreshAbandoned), "got: {err}");
        assert!(!err.is_terminal_auth());
        assert!(!c.is_refreshing());

        // An abandoned round is not a rejected refresh token.
        assert_eq!(store.access_token().as_deref(), Some("A1"));
        assert!(events.try_recv().is_err());
    }
}
