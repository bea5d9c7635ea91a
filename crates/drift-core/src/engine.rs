use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use drift_types::error::EngineError;
use drift_types::events::ClientEvent;
use drift_types::models::{
    ChatMode, ClientState, Report, SessionState, SignalEnvelope, normalize_interests,
};

use crate::config::EngineConfig;
use crate::dispatcher::{DeliveryError, Dispatcher};
use crate::queue::{QueueEntry, find_pairs};
use crate::registry::ClientHandle;
use crate::reports::ReportLedger;
use crate::session::{EndCause, Session};

/// The pairing and relay engine. Cheap to clone; all state lives behind the
/// shared inner.
///
/// Lock order is always queue -> registry -> sessions, and no state lock is
/// ever held across an event delivery. Lifecycle events never wait for queue
/// capacity, so a stalled client can block at most a relay send aimed at it.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    queue: Mutex<Vec<QueueEntry>>,
    registry: RwLock<HashMap<Uuid, ClientHandle>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    reports: ReportLedger,
    dispatcher: Dispatcher,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let dispatcher = Dispatcher::new(config.delivery_capacity, config.blocking_sends);
        Self {
            inner: Arc::new(EngineInner {
                config,
                queue: Mutex::new(Vec::new()),
                registry: RwLock::new(HashMap::new()),
                sessions: RwLock::new(HashMap::new()),
                reports: ReportLedger::new(),
                dispatcher,
            }),
        }
    }

    /// Register a new anonymous client. Returns its id and the receiving
    /// half of its event channel.
    pub async fn connect<I, S>(
        &self,
        mode: ChatMode,
        interests: I,
    ) -> (Uuid, mpsc::Receiver<ClientEvent>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let id = Uuid::new_v4();
        let rx = self.inner.dispatcher.register(id).await;
        let handle = ClientHandle::new(id, mode, normalize_interests(interests));
        self.inner.registry.write().await.insert(id, handle);
        info!("client {} connected ({:?})", id, mode);
        (id, rx)
    }

    /// Change mode/interests. Only allowed while Idle or Queued; a queued
    /// client's waiting-pool snapshot is refreshed without losing its place.
    pub async fn set_preferences<I, S>(
        &self,
        client_id: Uuid,
        mode: ChatMode,
        interests: I,
    ) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let interests = normalize_interests(interests);

        let mut queue = self.inner.queue.lock().await;
        let mut registry = self.inner.registry.write().await;

        let handle = registry
            .get_mut(&client_id)
            .ok_or(EngineError::InvalidState("not connected"))?;
        if !handle.can_update_preferences() {
            return Err(EngineError::InvalidState(
                "preferences are locked while paired",
            ));
        }

        handle.mode = mode;
        handle.interests = interests.clone();
        debug!("client {} updated preferences ({:?})", handle.id, handle.mode);

        if handle.state == ClientState::Queued {
            if let Some(entry) = queue.iter_mut().find(|e| e.client_id == client_id) {
                entry.mode = mode;
                entry.interests = interests;
            }
        }

        Ok(())
    }

    /// Enter the waiting pool. No-op if already queued; rejected while
    /// paired. Triggers an immediate matching pass.
    pub async fn enqueue(&self, client_id: Uuid) -> Result<(), EngineError> {
        {
            let mut queue = self.inner.queue.lock().await;
            let mut registry = self.inner.registry.write().await;

            let handle = registry
                .get_mut(&client_id)
                .ok_or(EngineError::InvalidState("not connected"))?;
            match handle.state {
                ClientState::Queued => return Ok(()),
                ClientState::Paired { .. } => {
                    return Err(EngineError::InvalidState("already paired"));
                }
                ClientState::Idle => {}
                ClientState::Disconnected => {
                    return Err(EngineError::InvalidState("not connected"));
                }
            }

            handle.state = ClientState::Queued;
            queue.push(QueueEntry {
                client_id,
                mode: handle.mode,
                interests: handle.interests.clone(),
                enqueued_at: Instant::now(),
            });
            debug!("client {} queued ({:?})", client_id, handle.mode);
        }

        self.run_matching().await;
        Ok(())
    }

    /// Leave the waiting pool without disconnecting: Queued -> Idle.
    pub async fn cancel(&self, client_id: Uuid) -> Result<(), EngineError> {
        let mut queue = self.inner.queue.lock().await;
        let mut registry = self.inner.registry.write().await;

        let handle = registry
            .get_mut(&client_id)
            .ok_or(EngineError::InvalidState("not connected"))?;
        if handle.state != ClientState::Queued {
            return Err(EngineError::InvalidState("not queued"));
        }
        handle.state = ClientState::Idle;
        queue.retain(|e| e.client_id != client_id);
        debug!("client {} left the queue", client_id);
        Ok(())
    }

    /// One pass of the matching algorithm over the waiting pool. Invoked on
    /// every enqueue and by the background tick. Returns the number of pairs
    /// made.
    pub async fn run_matching(&self) -> usize {
        // Pair selection, state transitions and session creation happen in
        // one critical section so no entry can be matched twice; events go
        // out after the locks drop.
        let matched = {
            let mut queue = self.inner.queue.lock().await;
            let mut registry = self.inner.registry.write().await;
            let mut sessions = self.inner.sessions.write().await;

            // A client that disconnected (or got paired elsewhere) between
            // enqueue and now must not be selected: check live state, not
            // the snapshot.
            queue.retain(|e| {
                registry
                    .get(&e.client_id)
                    .is_some_and(|c| c.state == ClientState::Queued)
            });

            let pairs = find_pairs(
                &mut queue,
                Instant::now(),
                self.inner.config.fallback_match_after,
            );

            let mut matched = Vec::with_capacity(pairs.len());
            for (a, b) in pairs {
                let mut shared: Vec<String> =
                    a.interests.intersection(&b.interests).cloned().collect();
                shared.sort();

                let session = Session::new(a.client_id, b.client_id, a.mode, shared);
                for member in session.members {
                    if let Some(handle) = registry.get_mut(&member) {
                        handle.state = ClientState::Paired {
                            session_id: session.id,
                        };
                    }
                }

                info!(
                    "matched {} and {} into session {} ({:?}, {} shared interests)",
                    a.client_id,
                    b.client_id,
                    session.id,
                    session.mode,
                    session.shared_interests.len()
                );
                matched.push((
                    session.id,
                    session.mode,
                    session.members,
                    session.shared_interests.clone(),
                ));
                sessions.insert(session.id, session);
            }
            matched
        };

        let paired = matched.len();
        for (session_id, mode, members, shared_interests) in matched {
            for member in members {
                let event = ClientEvent::Matched {
                    session_id,
                    mode,
                    shared_interests: shared_interests.clone(),
                };
                if let Err(e) = self.inner.dispatcher.try_deliver(member, event).await {
                    debug!("matched event for {} not delivered: {:?}", member, e);
                }
            }

            // Video pairs that never finish signaling are promoted after the
            // connect timeout so neither side deadlocks in Connecting.
            if mode == ChatMode::Video {
                let engine = self.clone();
                let timeout = self.inner.config.connect_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    engine.promote_if_connecting(session_id).await;
                });
            }
        }

        paired
    }

    /// Spawn the periodic matching pass that catches entries left waiting
    /// when no new enqueue arrives.
    pub fn spawn_match_ticker(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(engine.inner.config.match_tick);
            tick.tick().await;
            loop {
                tick.tick().await;
                engine.run_matching().await;
            }
        })
    }

    pub(crate) async fn promote_if_connecting(&self, session_id: Uuid) {
        let mut sessions = self.inner.sessions.write().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            if session.promote() {
                debug!("session {} promoted to active on connect timeout", session_id);
            }
        }
    }

    /// Relay a chat message to the caller's current partner.
    pub async fn send_message(&self, client_id: Uuid, text: &str) -> Result<(), EngineError> {
        let session_id = self
            .paired_session(client_id)
            .await
            .ok_or(EngineError::SessionClosed)?;
        self.send_in_session(session_id, client_id, text).await
    }

    /// Relay channel send: sender must be a member, session must be Active,
    /// text must be non-empty after trimming. Delivery preserves the
    /// sender's FIFO order into the peer's queue.
    pub async fn send_in_session(
        &self,
        session_id: Uuid,
        sender_id: Uuid,
        text: &str,
    ) -> Result<(), EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidInput("empty message"));
        }

        let peer = {
            let sessions = self.inner.sessions.read().await;
            let session = sessions.get(&session_id).ok_or(EngineError::SessionClosed)?;
            if !session.is_member(sender_id) {
                return Err(EngineError::NotAuthorized);
            }
            if session.state != SessionState::Active {
                return Err(EngineError::SessionClosed);
            }
            session.peer_of(sender_id).ok_or(EngineError::NotAuthorized)?
        };

        let event = ClientEvent::MessageReceived {
            session_id,
            sender_id,
            text: text.to_string(),
            sent_at: Utc::now(),
        };
        self.deliver_relay(peer, event).await
    }

    /// Relay a signaling envelope to the caller's current partner.
    pub async fn send_signal(
        &self,
        client_id: Uuid,
        envelope: SignalEnvelope,
    ) -> Result<(), EngineError> {
        let session_id = self
            .paired_session(client_id)
            .await
            .ok_or(EngineError::SessionClosed)?;
        self.signal_in_session(session_id, client_id, envelope).await
    }

    /// Relay channel signaling: video sessions only, allowed while
    /// Connecting or Active. The envelope is forwarded verbatim; once both
    /// members have signaled, the session goes Active.
    pub async fn signal_in_session(
        &self,
        session_id: Uuid,
        sender_id: Uuid,
        envelope: SignalEnvelope,
    ) -> Result<(), EngineError> {
        let peer = {
            let mut sessions = self.inner.sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(EngineError::SessionClosed)?;
            if !session.is_member(sender_id) {
                return Err(EngineError::NotAuthorized);
            }
            if session.mode != ChatMode::Video {
                return Err(EngineError::InvalidState("signaling on a text session"));
            }
            if !session.is_open() {
                return Err(EngineError::SessionClosed);
            }
            if session.note_signal(sender_id) {
                debug!("session {} active after signaling exchange", session_id);
            }
            session.peer_of(sender_id).ok_or(EngineError::NotAuthorized)?
        };

        let event = ClientEvent::SignalReceived {
            session_id,
            envelope,
        };
        self.deliver_relay(peer, event).await
    }

    /// Leave the current session; both members are re-queued.
    pub async fn skip(&self, client_id: Uuid) -> Result<(), EngineError> {
        let session_id = self
            .paired_session(client_id)
            .await
            .ok_or(EngineError::NotPaired)?;
        self.teardown(session_id, EndCause::Skipped { by: client_id })
            .await;
        Ok(())
    }

    /// File an abuse report against the current partner, then end the
    /// session. The reporter is re-queued; the reported member is not.
    pub async fn report(&self, client_id: Uuid, reason: &str) -> Result<(), EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::InvalidInput("empty report reason"));
        }

        let session_id = self
            .paired_session(client_id)
            .await
            .ok_or(EngineError::NotPaired)?;
        let reported_id = {
            let sessions = self.inner.sessions.read().await;
            let session = sessions.get(&session_id).ok_or(EngineError::NotPaired)?;
            session.peer_of(client_id).ok_or(EngineError::NotAuthorized)?
        };

        let report = Report {
            id: Uuid::new_v4(),
            session_id,
            reporter_id: client_id,
            reported_id,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        info!(
            "report {} filed on session {} ({} reported {})",
            report.id, session_id, client_id, reported_id
        );
        self.inner.reports.append(report).await;

        self.teardown(session_id, EndCause::Reported { by: client_id })
            .await;
        Ok(())
    }

    /// Deregister a client. Idempotent: unknown or already-disconnected ids
    /// are a no-op. A paired partner is notified and returned to Idle.
    pub async fn disconnect(&self, client_id: Uuid) {
        let prior_session = {
            let mut queue = self.inner.queue.lock().await;
            let mut registry = self.inner.registry.write().await;
            let Some(handle) = registry.remove(&client_id) else {
                return;
            };
            if handle.state == ClientState::Queued {
                queue.retain(|e| e.client_id != client_id);
            }
            handle.session_id()
        };

        if let Some(session_id) = prior_session {
            self.teardown(session_id, EndCause::Disconnected { by: client_id })
                .await;
        }

        self.inner.dispatcher.remove(client_id).await;
        info!("client {} disconnected", client_id);
    }

    /// Shared teardown for skip, report, and disconnect. Re-entry while the
    /// session is already Ending/Ended is a no-op, which is what makes the
    /// unavoidable races (double skip, skip vs disconnect) harmless.
    async fn teardown(&self, session_id: Uuid, cause: EndCause) {
        let initiator = cause.initiator();

        let Some((members, peer)) = ({
            let mut sessions = self.inner.sessions.write().await;
            sessions.get_mut(&session_id).and_then(|session| {
                if !session.begin_ending() {
                    return None;
                }
                session
                    .peer_of(initiator)
                    .map(|peer| (session.members, peer))
            })
        }) else {
            return;
        };

        let left = ClientEvent::PartnerLeft {
            session_id,
            reason: cause.partner_left_reason(),
        };
        if let Err(e) = self.inner.dispatcher.try_deliver(peer, left).await {
            debug!("partner-left event for {} not delivered: {:?}", peer, e);
        }

        // Resolve both members' next state. Skipping re-queues both sides;
        // reporting re-queues only the reporter; a disconnect leaves the
        // remaining member Idle.
        let requeue: Vec<Uuid> = match cause {
            EndCause::Skipped { .. } => members.to_vec(),
            EndCause::Reported { by } => vec![by],
            EndCause::Disconnected { .. } => Vec::new(),
        };

        {
            let mut queue = self.inner.queue.lock().await;
            let mut registry = self.inner.registry.write().await;
            for member in members {
                let Some(handle) = registry.get_mut(&member) else {
                    continue;
                };
                if handle.session_id() != Some(session_id) {
                    continue;
                }
                if requeue.contains(&member) {
                    handle.state = ClientState::Queued;
                    queue.push(QueueEntry {
                        client_id: member,
                        mode: handle.mode,
                        interests: handle.interests.clone(),
                        enqueued_at: Instant::now(),
                    });
                } else {
                    handle.state = ClientState::Idle;
                }
            }
        }

        {
            let mut sessions = self.inner.sessions.write().await;
            if let Some(mut session) = sessions.remove(&session_id) {
                session.finalize();
                info!(
                    "session {} ended ({:?} by {})",
                    session_id,
                    cause.partner_left_reason(),
                    initiator
                );
            }
        }

        for member in members {
            let ended = ClientEvent::SessionEnded { session_id };
            if let Err(e) = self.inner.dispatcher.try_deliver(member, ended).await {
                debug!("session-ended event for {} not delivered: {:?}", member, e);
            }
        }

        if !requeue.is_empty() {
            self.run_matching().await;
        }
    }

    async fn deliver_relay(&self, peer: Uuid, event: ClientEvent) -> Result<(), EngineError> {
        self.inner.dispatcher.deliver(peer, event).await.map_err(|e| match e {
            DeliveryError::Closed => EngineError::SessionClosed,
            DeliveryError::Full => {
                warn!("delivery queue full for {}", peer);
                EngineError::Overflow
            }
        })
    }

    /// Surface a failed command on the client's own event channel. Used by
    /// the gateway, which reports errors in-band rather than closing the
    /// socket.
    pub async fn push_error(&self, client_id: Uuid, message: String) -> Result<(), EngineError> {
        self.deliver_relay(client_id, ClientEvent::Error { message }).await
    }

    async fn paired_session(&self, client_id: Uuid) -> Option<Uuid> {
        self.inner
            .registry
            .read()
            .await
            .get(&client_id)
            .and_then(|h| h.session_id())
    }

    // -- Inspection (moderation surface and tests) --

    pub async fn client_state(&self, client_id: Uuid) -> Option<ClientState> {
        self.inner.registry.read().await.get(&client_id).map(|h| h.state)
    }

    pub async fn session(&self, session_id: Uuid) -> Option<Session> {
        self.inner.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.inner.reports.all().await
    }

    pub async fn reports_for_session(&self, session_id: Uuid) -> Vec<Report> {
        self.inner.reports.for_session(session_id).await
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.queue.lock().await.len()
    }
}
