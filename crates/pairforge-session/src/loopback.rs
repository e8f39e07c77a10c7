//! In-process [`Protocol`] implementation.
//!
//! The loopback protocol behaves like a messaging backend without any
//! network: connecting issues a pairing code, [`LoopbackProtocol::scan`]
//! plays the part of a phone scanning it, and sent messages are recorded
//! instead of transmitted.
//!
//! It also exposes knobs for the awkward cases a real backend produces:
//! stale credentials that survive a restart ([`inject_ghosts`]), refused
//! connections ([`fail_next_connects`]), and backends that never produce a
//! code ([`withhold_codes`]).
//!
//! [`inject_ghosts`]: LoopbackProtocol::inject_ghosts
//! [`fail_next_connects`]: LoopbackProtocol::fail_next_connects
//! [`withhold_codes`]: LoopbackProtocol::withhold_codes

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;

use crate::{
    Device, Identity, PairingEvent, PairingEvents, Protocol, SessionError,
    SessionHandle,
};

/// Buffered pairing events per session.
const PAIRING_CHANNEL_SIZE: usize = 8;

/// Settings for the loopback backend.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// If set, every issued code is "scanned" automatically after this
    /// delay. Lets a locally running server be paired without a phone.
    pub auto_pair_after: Option<Duration>,

    /// Account used for automatic pairing.
    pub auto_pair_phone: String,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            auto_pair_after: None,
            auto_pair_phone: "5500000000000".to_string(),
        }
    }
}

/// A message recorded by [`LoopbackSession::send_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Protocol message id returned to the caller.
    pub id: String,
    /// Destination address.
    pub to: String,
    /// Message body.
    pub text: String,
}

struct Shared {
    config: LoopbackConfig,
    /// Sessions waiting for a scan, keyed by their current code.
    by_code: Mutex<HashMap<String, Arc<Inner>>>,
    /// Every handle still alive. Dead entries are pruned on access.
    opened: Mutex<Vec<Weak<Inner>>>,
    opened_total: AtomicUsize,
    sent: Mutex<Vec<SentMessage>>,
    ghosts: AtomicUsize,
    failing_connects: AtomicUsize,
    withhold_codes: AtomicBool,
    next_message: AtomicU64,
}

struct Inner {
    device: Device,
    connected: AtomicBool,
    authenticated: AtomicBool,
    events_tx: Mutex<Option<mpsc::Sender<PairingEvent>>>,
    events_rx: Mutex<Option<PairingEvents>>,
}

impl Inner {
    /// Pushes an event onto the pairing channel, if it's still open.
    fn emit(&self, event: PairingEvent) {
        if let Some(tx) = self.events_tx.lock().as_ref() {
            if tx.try_send(event).is_err() {
                tracing::warn!(
                    device_id = %self.device.id(),
                    "pairing channel full or closed, event dropped"
                );
            }
        }
    }

    /// Emits a final event and closes the pairing channel.
    fn finish(&self, event: PairingEvent) {
        if let Some(tx) = self.events_tx.lock().take() {
            if tx.try_send(event).is_err() {
                tracing::warn!(
                    device_id = %self.device.id(),
                    "pairing channel full or closed, final event dropped"
                );
            }
        }
    }
}

/// The loopback protocol. Cheap to clone; clones share all sessions.
#[derive(Clone)]
pub struct LoopbackProtocol {
    shared: Arc<Shared>,
}

impl LoopbackProtocol {
    /// Creates a loopback backend with default settings.
    pub fn new() -> Self {
        Self::with_config(LoopbackConfig::default())
    }

    /// Creates a loopback backend with the given settings.
    pub fn with_config(config: LoopbackConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                by_code: Mutex::new(HashMap::new()),
                opened: Mutex::new(Vec::new()),
                opened_total: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                ghosts: AtomicUsize::new(0),
                failing_connects: AtomicUsize::new(0),
                withhold_codes: AtomicBool::new(false),
                next_message: AtomicU64::new(1),
            }),
        }
    }

    /// The next `count` connections come up already authenticated with a
    /// stale identity and never issue a code.
    pub fn inject_ghosts(&self, count: usize) {
        self.shared.ghosts.store(count, Ordering::SeqCst);
    }

    /// The next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.shared.failing_connects.store(count, Ordering::SeqCst);
    }

    /// While `true`, connections succeed but no pairing code is issued.
    pub fn withhold_codes(&self, withhold: bool) {
        self.shared.withhold_codes.store(withhold, Ordering::SeqCst);
    }

    /// Simulates a phone scanning `code` and linking as `phone`.
    ///
    /// The session becomes authenticated, the identity is written to its
    /// device, and `Success` is emitted before the channel closes.
    pub async fn scan(&self, code: &str, phone: &str) -> Result<(), SessionError> {
        complete_pairing(&self.shared, code, phone).await
    }

    /// Replaces `code` with a fresh one, like a backend refreshing its QR.
    pub fn rotate(&self, code: &str) -> Result<String, SessionError> {
        let mut by_code = self.shared.by_code.lock();
        let inner = by_code.remove(code).ok_or(SessionError::UnknownCode)?;
        let next = generate_code();
        by_code.insert(next.clone(), Arc::clone(&inner));
        inner.emit(PairingEvent::Code(next.clone()));
        Ok(next)
    }

    /// Ends the pairing window for `code` without a scan.
    pub fn expire(&self, code: &str) -> Result<(), SessionError> {
        let inner = self
            .shared
            .by_code
            .lock()
            .remove(code)
            .ok_or(SessionError::UnknownCode)?;
        inner.finish(PairingEvent::Timeout);
        Ok(())
    }

    /// How many handles have been opened in total.
    pub fn sessions_opened(&self) -> usize {
        self.shared.opened_total.load(Ordering::SeqCst)
    }

    /// How many opened handles are still alive, connected or not.
    pub fn retained_sessions(&self) -> usize {
        self.shared.retained().len()
    }

    /// How many live handles still have their transport up.
    pub fn live_sessions(&self) -> usize {
        self.shared
            .retained()
            .iter()
            .filter(|s| s.connected.load(Ordering::SeqCst))
            .count()
    }

    /// Every message accepted so far, oldest first.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.shared.sent.lock().clone()
    }
}

impl Shared {
    /// Drops entries for handles that no longer exist and returns the rest.
    fn retained(&self) -> Vec<Arc<Inner>> {
        let mut opened = self.opened.lock();
        opened.retain(|weak| weak.strong_count() > 0);
        opened.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for LoopbackProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for LoopbackProtocol {
    type Handle = LoopbackSession;

    fn open(&self, device: Device) -> LoopbackSession {
        let (tx, rx) = mpsc::channel(PAIRING_CHANNEL_SIZE);
        let inner = Arc::new(Inner {
            device,
            connected: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
        });
        let mut opened = self.shared.opened.lock();
        opened.retain(|weak| weak.strong_count() > 0);
        opened.push(Arc::downgrade(&inner));
        drop(opened);
        self.shared.opened_total.fetch_add(1, Ordering::SeqCst);
        LoopbackSession {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A session handle produced by [`LoopbackProtocol`].
pub struct LoopbackSession {
    inner: Arc<Inner>,
    shared: Arc<Shared>,
}

impl SessionHandle for LoopbackSession {
    fn pairing_events(&self) -> Result<PairingEvents, SessionError> {
        self.inner.events_rx.lock().take().ok_or_else(|| {
            SessionError::PairingUnavailable("already subscribed".into())
        })
    }

    async fn connect(&self) -> Result<(), SessionError> {
        if take_one(&self.shared.failing_connects) {
            return Err(SessionError::ConnectFailed(
                "loopback: connection refused".into(),
            ));
        }
        self.inner.connected.store(true, Ordering::SeqCst);

        if take_one(&self.shared.ghosts) {
            // Credentials retained from an earlier run: the handshake
            // succeeds on its own and no code is ever issued.
            self.inner
                .device
                .store_identity(Identity::primary("stale"))
                .await?;
            self.inner.authenticated.store(true, Ordering::SeqCst);
            return Ok(());
        }

        if self.shared.withhold_codes.load(Ordering::SeqCst) {
            return Ok(());
        }

        let code = generate_code();
        self.shared
            .by_code
            .lock()
            .insert(code.clone(), Arc::clone(&self.inner));
        self.inner.emit(PairingEvent::Code(code.clone()));

        if let Some(delay) = self.shared.config.auto_pair_after {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let phone = shared.config.auto_pair_phone.clone();
                if let Err(e) = complete_pairing(&shared, &code, &phone).await {
                    tracing::debug!(error = %e, "auto-pair skipped");
                }
            });
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.events_tx.lock().take();
        self.shared
            .by_code
            .lock()
            .retain(|_, s| !Arc::ptr_eq(s, &self.inner));
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    fn identity(&self) -> Option<Identity> {
        self.inner.device.identity()
    }

    async fn logout(&self) -> Result<(), SessionError> {
        self.inner.authenticated.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_identity(&self) -> Result<(), SessionError> {
        self.inner.device.delete_identity().await
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<String, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if !self.is_authenticated() {
            return Err(SessionError::SendFailed("device is not paired".into()));
        }
        let seq = self.shared.next_message.fetch_add(1, Ordering::Relaxed);
        let id = format!("LB{seq:016X}");
        self.shared.sent.lock().push(SentMessage {
            id: id.clone(),
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(id)
    }
}

async fn complete_pairing(
    shared: &Shared,
    code: &str,
    phone: &str,
) -> Result<(), SessionError> {
    let inner = shared
        .by_code
        .lock()
        .remove(code)
        .ok_or(SessionError::UnknownCode)?;
    // Flags and identity land before Success so a listener reacting to
    // the event sees the paired state.
    inner.authenticated.store(true, Ordering::SeqCst);
    inner.device.store_identity(Identity::primary(phone)).await?;
    inner.finish(PairingEvent::Success);
    tracing::debug!(device_id = %inner.device.id(), %phone, "loopback pairing complete");
    Ok(())
}

/// Decrements `counter` if it's positive. Returns whether it did.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Generates a QR-style payload: `2@` followed by 24 hex characters.
fn generate_code() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 12] = rng.random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("2@{hex}")
}
