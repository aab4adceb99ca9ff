//! Exchange correlator: matches incoming answers to outstanding requests.
//!
//! Every request sent on a connection registers a pending exchange keyed by
//! its hop-by-hop id. The connection's read loop resolves pending exchanges
//! as answers arrive; the sending side awaits resolution with a
//! caller-specified timeout. An answer matching no pending exchange is a
//! `CorrelationMiss`: non-fatal, the message is discarded and other pending
//! exchanges are unaffected.
//!
//! The pending table is shared between the sending context and the read
//! loop, so insert/resolve/remove go through a mutex. No retransmission is
//! attempted on timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::{DiameterError, Result};
use crate::protocol::Message;

/// A pending exchange owned by the correlator.
struct PendingExchange {
    tx: oneshot::Sender<Message>,
    issued_at: Instant,
}

/// Handle for one outstanding request, returned by [`Correlator::register`].
pub struct PendingAnswer {
    hop_by_hop_id: u32,
    rx: oneshot::Receiver<Message>,
}

impl PendingAnswer {
    /// The hop-by-hop id this handle is waiting on.
    #[inline]
    pub fn hop_by_hop_id(&self) -> u32 {
        self.hop_by_hop_id
    }
}

/// Tracks outstanding requests by hop-by-hop id.
pub struct Correlator {
    pending: Mutex<HashMap<u32, PendingExchange>>,
    next_hop_by_hop: AtomicU32,
}

impl Correlator {
    /// Create a correlator with a time-seeded hop-by-hop id space.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_hop_by_hop: AtomicU32::new(seed_u32()),
        }
    }

    /// Assign the next hop-by-hop id.
    pub fn next_hop_by_hop(&self) -> u32 {
        self.next_hop_by_hop.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a pending exchange for a hop-by-hop id.
    ///
    /// The returned handle resolves when a matching answer arrives; pass it
    /// to [`await_answer`](Correlator::await_answer).
    pub fn register(&self, hop_by_hop_id: u32) -> PendingAnswer {
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(
            hop_by_hop_id,
            PendingExchange {
                tx,
                issued_at: Instant::now(),
            },
        );
        PendingAnswer { hop_by_hop_id, rx }
    }

    /// Resolve a pending exchange with an incoming answer.
    ///
    /// On a match the waiting caller is woken and the entry removed. A miss
    /// returns `CorrelationMiss` and drops the message; other entries are
    /// untouched.
    pub fn resolve(&self, answer: Message) -> Result<()> {
        let hop_by_hop_id = answer.hop_by_hop_id();
        let exchange = self
            .lock_pending()
            .remove(&hop_by_hop_id)
            .ok_or(DiameterError::CorrelationMiss(hop_by_hop_id))?;

        tracing::debug!(
            hop_by_hop_id,
            elapsed = ?exchange.issued_at.elapsed(),
            "answer correlated"
        );
        // The receiver may have gone away between timeout and removal; the
        // answer is discarded either way.
        let _ = exchange.tx.send(answer);
        Ok(())
    }

    /// Wait for the answer to a registered exchange.
    ///
    /// On timeout the pending entry is removed and `Timeout` returned; no
    /// retransmission is attempted. If the connection closes while waiting,
    /// the wait fails with `ConnectionClosed`.
    pub async fn await_answer(
        &self,
        pending: PendingAnswer,
        timeout: Duration,
    ) -> Result<Message> {
        match tokio::time::timeout(timeout, pending.rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(DiameterError::ConnectionClosed),
            Err(_) => {
                self.lock_pending().remove(&pending.hop_by_hop_id);
                Err(DiameterError::Timeout)
            }
        }
    }

    /// Drop a registered exchange without waiting, for example when the
    /// request could not be transmitted.
    pub fn abandon(&self, pending: PendingAnswer) {
        self.lock_pending().remove(&pending.hop_by_hop_id);
    }

    /// Fail every pending exchange with `ConnectionClosed`.
    ///
    /// Called when the connection's framing loop terminates so no exchange
    /// is left pending forever.
    pub fn fail_all(&self) {
        let dropped = {
            let mut pending = self.lock_pending();
            pending.drain().count()
        };
        if dropped > 0 {
            tracing::debug!(dropped, "failed pending exchanges on close");
        }
    }

    /// Number of outstanding exchanges.
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u32, PendingExchange>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Seed for the hop-by-hop id space, mixed from system time and process id.
fn seed_u32() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;
    (nanos.wrapping_mul(0x517c_c1b7_2722_0a95) ^ pid) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::command;

    fn answer(hop_by_hop_id: u32) -> Message {
        let mut msg = Message::request(command::DEVICE_WATCHDOG, 0);
        msg.header.flags = 0;
        msg.header.hop_by_hop_id = hop_by_hop_id;
        msg
    }

    #[tokio::test]
    async fn test_answer_resolves_pending_exchange() {
        let correlator = Correlator::new();
        let pending = correlator.register(7);

        correlator.resolve(answer(7)).unwrap();

        let got = correlator
            .await_answer(pending, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(got.hop_by_hop_id(), 7);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_answer_is_a_miss() {
        let correlator = Correlator::new();
        let _pending = correlator.register(1);

        let result = correlator.resolve(answer(99));
        assert!(matches!(result, Err(DiameterError::CorrelationMiss(99))));
        // The unrelated exchange is unaffected.
        assert_eq!(correlator.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let correlator = Correlator::new();
        let pending = correlator.register(5);

        let result = correlator
            .await_answer(pending, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(DiameterError::Timeout)));
        assert_eq!(correlator.pending_count(), 0);

        // A late answer after timeout is a plain miss.
        assert!(correlator.resolve(answer(5)).is_err());
    }

    #[tokio::test]
    async fn test_fail_all_propagates_connection_closed() {
        let correlator = Correlator::new();
        let first = correlator.register(1);
        let second = correlator.register(2);

        correlator.fail_all();

        for pending in [first, second] {
            let result = correlator
                .await_answer(pending, Duration::from_secs(1))
                .await;
            assert!(matches!(result, Err(DiameterError::ConnectionClosed)));
        }
    }

    #[test]
    fn test_hop_by_hop_ids_are_distinct() {
        let correlator = Correlator::new();
        let first = correlator.next_hop_by_hop();
        let second = correlator.next_hop_by_hop();
        assert_ne!(first, second);
    }
}
