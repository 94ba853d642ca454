//! Pending call table
//!
//! Every call in flight is registered under two fresh ids: the result id,
//! which a successful reply carries, and the error id, which a failed reply
//! carries. A reply may name either; the entry answers to both until it is
//! removed, and removing it through either id removes both.
//!
//! # Call Lifecycle
//!
//! 1. **Register**: draw two random ids unused by any live entry, store a
//!    oneshot sender under them
//! 2. **Send**: the caller writes the request frame
//! 3. **Wait**: the caller awaits the oneshot receiver
//! 4. **Complete**: a reply, a timeout or a disconnect removes the entry,
//!    then sends the outcome
//!
//! Removal always happens before the outcome is delivered, under the table
//! lock, so an entry settles at most once even when a reply races a
//! disconnect.

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use wsbridge_core::{Error, Result};

/// The two correlation ids of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallIds {
    pub result_id: u32,
    pub error_id: u32,
}

pub(crate) type Outcome = Result<Value>;

struct PendingCall {
    error_id: u32,
    tx: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct Table {
    /// Keyed by result id
    calls: HashMap<u32, PendingCall>,
    /// Error id → result id
    by_error_id: HashMap<u32, u32>,
}

impl Table {
    fn is_live(&self, id: u32) -> bool {
        self.calls.contains_key(&id) || self.by_error_id.contains_key(&id)
    }

    fn remove(&mut self, result_id: u32) -> Option<PendingCall> {
        let call = self.calls.remove(&result_id)?;
        self.by_error_id.remove(&call.error_id);
        Some(call)
    }
}

/// Table of calls awaiting a reply
#[derive(Clone, Default)]
pub struct PendingCalls {
    table: Arc<Mutex<Table>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call under two fresh ids from the OS random source
    pub fn register(&self) -> (CallIds, oneshot::Receiver<Outcome>) {
        self.register_with(|| OsRng.next_u32())
    }

    /// Register a call drawing ids from `draw`
    ///
    /// Draws are repeated until each id is unused by any live entry and the
    /// two ids differ.
    pub(crate) fn register_with(
        &self,
        mut draw: impl FnMut() -> u32,
    ) -> (CallIds, oneshot::Receiver<Outcome>) {
        let mut table = self.table.lock();

        let result_id = loop {
            let id = draw();
            if !table.is_live(id) {
                break id;
            }
        };
        let error_id = loop {
            let id = draw();
            if id != result_id && !table.is_live(id) {
                break id;
            }
        };

        let (tx, rx) = oneshot::channel();
        table.calls.insert(result_id, PendingCall { error_id, tx });
        table.by_error_id.insert(error_id, result_id);

        (CallIds { result_id, error_id }, rx)
    }

    /// Settle the call whose result id is `result_id` with a success
    ///
    /// Returns false when no live call has that result id.
    pub fn complete_result(&self, result_id: u32, value: Value) -> bool {
        let call = self.table.lock().remove(result_id);
        match call {
            Some(call) => {
                let _ = call.tx.send(Ok(value));
                true
            }
            None => false,
        }
    }

    /// Settle the call whose error id is `error_id` with a backend error
    ///
    /// Returns false when no live call has that error id.
    pub fn complete_error(&self, error_id: u32, error: Value) -> bool {
        let call = {
            let mut table = self.table.lock();
            match table.by_error_id.get(&error_id).copied() {
                Some(result_id) => table.remove(result_id),
                None => None,
            }
        };
        match call {
            Some(call) => {
                let _ = call.tx.send(Err(Error::Backend(error)));
                true
            }
            None => false,
        }
    }

    /// Settle one call with a local failure
    pub fn fail(&self, result_id: u32, error: Error) -> bool {
        let call = self.table.lock().remove(result_id);
        match call {
            Some(call) => {
                let _ = call.tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Remove a call without settling it
    pub fn evict(&self, result_id: u32) -> bool {
        self.table.lock().remove(result_id).is_some()
    }

    /// Settle every live call with `error`, returning how many there were
    pub fn fail_all(&self, error: Error) -> usize {
        let drained: Vec<PendingCall> = {
            let mut table = self.table.lock();
            table.by_error_id.clear();
            table.calls.drain().map(|(_, call)| call).collect()
        };

        let count = drained.len();
        for call in drained {
            let _ = call.tx.send(Err(error.clone()));
        }
        count
    }

    /// Number of live calls
    pub fn len(&self) -> usize {
        self.table.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is either id of a live call
    pub fn contains(&self, id: u32) -> bool {
        self.table.lock().is_live(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_complete_result() {
        let pending = PendingCalls::new();
        let (ids, rx) = pending.register();

        assert_ne!(ids.result_id, ids.error_id);
        assert!(pending.contains(ids.result_id));
        assert!(pending.contains(ids.error_id));
        assert_eq!(pending.len(), 1);

        assert!(pending.complete_result(ids.result_id, json!(42)));
        assert_eq!(rx.await.unwrap().unwrap(), json!(42));

        assert!(pending.is_empty());
        assert!(!pending.contains(ids.result_id));
        assert!(!pending.contains(ids.error_id));
    }

    #[tokio::test]
    async fn test_complete_error_removes_both_keys() {
        let pending = PendingCalls::new();
        let (ids, rx) = pending.register();

        assert!(pending.complete_error(ids.error_id, json!("nope")));
        match rx.await.unwrap() {
            Err(Error::Backend(value)) => assert_eq!(value, json!("nope")),
            other => panic!("expected backend error, got {other:?}"),
        }

        assert!(!pending.complete_result(ids.result_id, json!(1)));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_ids_only_answer_in_their_role() {
        let pending = PendingCalls::new();
        let (ids, _rx) = pending.register();

        assert!(!pending.complete_result(ids.error_id, json!(1)));
        assert!(!pending.complete_error(ids.result_id, json!(1)));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_settles_at_most_once() {
        let pending = PendingCalls::new();
        let (ids, rx) = pending.register();

        assert!(pending.complete_result(ids.result_id, json!("first")));
        assert!(!pending.complete_result(ids.result_id, json!("second")));
        assert!(!pending.complete_error(ids.error_id, json!("third")));
        assert_eq!(pending.fail_all(Error::Disconnected), 0);

        assert_eq!(rx.await.unwrap().unwrap(), json!("first"));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let pending = PendingCalls::new();
        let (_, rx1) = pending.register();
        let (_, rx2) = pending.register();

        assert_eq!(pending.fail_all(Error::Disconnected), 2);
        assert!(pending.is_empty());
        assert!(matches!(rx1.await.unwrap(), Err(Error::Disconnected)));
        assert!(matches!(rx2.await.unwrap(), Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_fail_and_evict() {
        let pending = PendingCalls::new();
        let (a, rx_a) = pending.register();
        let (b, rx_b) = pending.register();

        assert!(pending.fail(a.result_id, Error::Timeout));
        assert!(matches!(rx_a.await.unwrap(), Err(Error::Timeout)));

        assert!(pending.evict(b.result_id));
        assert!(!pending.evict(b.result_id));
        assert!(rx_b.await.is_err());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_redraws_on_collision() {
        let pending = PendingCalls::new();

        // The error id must differ from the result id
        let mut script = vec![7, 7, 7, 8].into_iter();
        let (first, _rx1) = pending.register_with(|| script.next().unwrap());
        assert_eq!(first, CallIds { result_id: 7, error_id: 8 });

        // Ids live in either role are skipped
        let mut script = vec![7, 8, 9, 8, 7, 10].into_iter();
        let (second, _rx2) = pending.register_with(|| script.next().unwrap());
        assert_eq!(second, CallIds { result_id: 9, error_id: 10 });

        assert_eq!(pending.len(), 2);
    }
}
