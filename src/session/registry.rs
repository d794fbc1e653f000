//! Per-identity browser session registry.
//!
//! Each identity owns one slot: an async mutex around an optional session.
//! Holding the slot lock is what makes a caller the exclusive driver of the
//! page, so launch, drive and discard for one identity never interleave,
//! while slots of different identities are locked independently.
//!
//! A session is written into its slot only after the launch succeeded. A
//! caller cancelled mid-launch therefore leaves the slot empty, never half
//! built. Released slots are marked `retired` before they leave the map so a
//! waiter that cloned the slot earlier retries against the map instead of
//! launching into an orphan.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use super::engine::{BrowserEngine, ProviderPage, SessionLaunchError};
use super::identity::{SessionId, UserIdentity};

/// One launched browser page bound to an identity.
#[derive(Debug)]
pub struct BrowserSession<P> {
    identity: UserIdentity,
    id: SessionId,
    page: P,
    created_at: Instant,
    last_used: Instant,
}

impl<P> BrowserSession<P> {
    fn new(identity: UserIdentity, id: SessionId, page: P) -> Self {
        let now = Instant::now();
        Self {
            identity,
            id,
            page,
            created_at: now,
            last_used: now,
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            identity: self.identity,
            session_id: self.id,
            created_at: self.created_at,
            last_used: self.last_used,
        }
    }
}

/// Snapshot of a session, safe to hand out without granting page access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub identity: UserIdentity,
    pub session_id: SessionId,
    pub created_at: Instant,
    pub last_used: Instant,
}

/// What a presence check found for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPresence {
    /// A session exists and nobody is driving it.
    Idle(SessionInfo),
    /// The identity's slot is locked: an interaction, a launch or a release
    /// is in progress.
    Busy,
}

impl SessionPresence {
    /// Snapshot of the session, when it could be read without waiting.
    #[must_use]
    pub const fn info(&self) -> Option<SessionInfo> {
        match self {
            Self::Idle(info) => Some(*info),
            Self::Busy => None,
        }
    }
}

#[derive(Debug)]
struct Slot<P> {
    session: Option<BrowserSession<P>>,
    retired: bool,
}

impl<P> Default for Slot<P> {
    fn default() -> Self {
        Self {
            session: None,
            retired: false,
        }
    }
}

type SharedSlot<P> = Arc<Mutex<Slot<P>>>;

/// Exclusive hold on an identity's slot, taken before a browser exists.
///
/// Other callers for the same identity wait until it is dropped or opened.
pub struct SessionReservation<P: ProviderPage> {
    identity: UserIdentity,
    slot: SharedSlot<P>,
    guard: OwnedMutexGuard<Slot<P>>,
}

impl<P: ProviderPage> SessionReservation<P> {
    #[must_use]
    pub const fn identity(&self) -> UserIdentity {
        self.identity
    }

    /// Whether a session is already running for this identity.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.guard.session.is_some()
    }
}

impl<P: ProviderPage> std::fmt::Debug for SessionReservation<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReservation")
            .field("identity", &self.identity)
            .field("has_session", &self.has_session())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to an identity's session for the duration of one
/// interaction.
///
/// Other callers for the same identity wait until the lease is dropped.
pub struct SessionLease<P: ProviderPage> {
    guard: OwnedMutexGuard<Slot<P>>,
    reused: bool,
}

impl<P: ProviderPage> SessionLease<P> {
    fn session(&self) -> &BrowserSession<P> {
        match &self.guard.session {
            Some(session) => session,
            None => unreachable!("a lease is only handed out for a live session"),
        }
    }

    #[must_use]
    pub fn identity(&self) -> UserIdentity {
        self.session().identity
    }

    /// Identity of the underlying launch; changes only after release.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session().id
    }

    /// The page to drive.
    #[must_use]
    pub fn page(&self) -> &P {
        &self.session().page
    }

    /// Whether the session existed before this acquire.
    #[must_use]
    pub const fn is_reused(&self) -> bool {
        self.reused
    }

    /// Closes the session while still holding the identity lock.
    ///
    /// Used when the browser turned out to be dead; the next acquire for
    /// this identity launches a new one.
    pub async fn discard(mut self) {
        if let Some(session) = self.guard.session.take() {
            warn!(
                user = %session.identity,
                session = %session.id,
                "Discarding browser session"
            );
            session.page.close().await;
        }
    }
}

impl<P: ProviderPage> Drop for SessionLease<P> {
    fn drop(&mut self) {
        if let Some(session) = self.guard.session.as_mut() {
            session.last_used = Instant::now();
        }
    }
}

impl<P: ProviderPage> std::fmt::Debug for SessionLease<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

/// Maps each identity to its exclusively owned browser session.
pub struct SessionRegistry<E: BrowserEngine> {
    engine: E,
    slots: DashMap<UserIdentity, SharedSlot<E::Page>>,
    next_id: AtomicU64,
}

impl<E: BrowserEngine> SessionRegistry<E> {
    /// Creates an empty registry launching sessions through `engine`.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            slots: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the engine used for launches.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    fn slot(&self, identity: UserIdentity) -> SharedSlot<E::Page> {
        Arc::clone(
            self.slots
                .entry(identity)
                .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
                .value(),
        )
    }

    fn existing_slot(&self, identity: UserIdentity) -> Option<SharedSlot<E::Page>> {
        self.slots.get(&identity).map(|entry| Arc::clone(entry.value()))
    }

    /// Marks the slot dead, drops it from the map and hands back its session.
    fn retire(
        &self,
        identity: UserIdentity,
        slot: &SharedSlot<E::Page>,
        state: &mut Slot<E::Page>,
    ) -> Option<BrowserSession<E::Page>> {
        state.retired = true;
        self.slots
            .remove_if(&identity, |_, current| Arc::ptr_eq(current, slot));
        state.session.take()
    }

    /// Returns the identity's session, launching one if it has none.
    ///
    /// Concurrent callers for the same identity are serialized: exactly one
    /// of them launches, the others reuse its session once it is done.
    pub async fn acquire(
        &self,
        identity: UserIdentity,
    ) -> Result<SessionLease<E::Page>, SessionLaunchError> {
        let reservation = self.reserve(identity).await;
        self.open(reservation).await
    }

    /// Waits for exclusive use of the identity's slot without launching.
    ///
    /// The slot may still be empty; [`open`](Self::open) fills it.
    pub async fn reserve(&self, identity: UserIdentity) -> SessionReservation<E::Page> {
        loop {
            let slot = self.slot(identity);
            let guard = Arc::clone(&slot).lock_owned().await;

            if guard.retired {
                // Released while we were waiting; look the identity up again.
                continue;
            }
            return SessionReservation {
                identity,
                slot,
                guard,
            };
        }
    }

    /// Turns a reservation into a lease, launching a browser if the slot
    /// is empty.
    ///
    /// A failed launch leaves no entry behind.
    pub async fn open(
        &self,
        reservation: SessionReservation<E::Page>,
    ) -> Result<SessionLease<E::Page>, SessionLaunchError> {
        let SessionReservation {
            identity,
            slot,
            mut guard,
        } = reservation;

        if let Some(session) = guard.session.as_ref() {
            debug!(user = %identity, session = %session.id, "Reusing browser session");
            return Ok(SessionLease {
                guard,
                reused: true,
            });
        }

        info!(user = %identity, "Launching browser session");
        let page = match self.engine.launch().await {
            Ok(page) => page,
            Err(e) => {
                warn!(user = %identity, "Browser launch failed: {}", e);
                self.retire(identity, &slot, &mut guard);
                return Err(e);
            }
        };

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        guard.session = Some(BrowserSession::new(identity, id, page));
        info!(user = %identity, session = %id, "Browser session ready");

        Ok(SessionLease {
            guard,
            reused: false,
        })
    }

    /// Closes the identity's session and forgets it.
    ///
    /// A no-op when the identity has no session. Waits for an in-flight
    /// interaction of the same identity to finish first.
    pub async fn release(&self, identity: UserIdentity) {
        let Some(slot) = self.existing_slot(identity) else {
            debug!(user = %identity, "No browser session to release");
            return;
        };

        let mut guard = Arc::clone(&slot).lock_owned().await;
        if guard.retired {
            return;
        }
        let session = self.retire(identity, &slot, &mut guard);
        drop(guard);

        if let Some(session) = session {
            info!(user = %identity, session = %session.id, "Closing browser session");
            session.page.close().await;
        }
    }

    /// Non-creating presence check.
    ///
    /// Never waits: an identity whose slot is locked right now is reported
    /// as [`SessionPresence::Busy`].
    pub fn lookup(&self, identity: UserIdentity) -> Option<SessionPresence> {
        let slot = self.existing_slot(identity)?;
        let Ok(guard) = slot.try_lock() else {
            return Some(SessionPresence::Busy);
        };
        if guard.retired {
            return None;
        }
        guard
            .session
            .as_ref()
            .map(|session| SessionPresence::Idle(session.info()))
    }

    /// Identities that currently have a slot (possibly mid-launch).
    #[must_use]
    pub fn identities(&self) -> Vec<UserIdentity> {
        self.slots.iter().map(|entry| *entry.key()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Closes sessions unused for at least `max_idle`.
    ///
    /// Sessions that are being driven right now are skipped. Returns the
    /// number of sessions closed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let candidates: Vec<_> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut evicted = 0;
        for (identity, slot) in candidates {
            let Ok(mut guard) = Arc::clone(&slot).try_lock_owned() else {
                continue; // busy
            };
            if guard.retired {
                continue;
            }

            let idle = guard
                .session
                .as_ref()
                .is_none_or(|s| s.last_used.elapsed() >= max_idle);
            if !idle {
                continue;
            }

            if let Some(session) = self.retire(identity, &slot, &mut guard) {
                drop(guard);
                info!(
                    user = %identity,
                    session = %session.id,
                    "Evicting idle browser session"
                );
                session.page.close().await;
                evicted += 1;
            }
        }

        evicted
    }

    /// Attempts to release every known identity, concurrently.
    ///
    /// Identities still busy after `grace` are abandoned. Returns the number
    /// of identities released.
    pub async fn release_all(&self, grace: Duration) -> usize {
        let identities = self.identities();
        if identities.is_empty() {
            return 0;
        }
        info!("Releasing {} browser session(s)", identities.len());

        let results = join_all(identities.into_iter().map(|identity| async move {
            let released = timeout(grace, self.release(identity)).await.is_ok();
            if !released {
                warn!(user = %identity, "Session still busy at shutdown, abandoning it");
            }
            released
        }))
        .await;

        results.into_iter().filter(|released| *released).count()
    }
}

impl<E: BrowserEngine> std::fmt::Debug for SessionRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("identities", &self.slots.len())
            .finish_non_exhaustive()
    }
}
