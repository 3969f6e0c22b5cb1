// ── Sequenced projections ──
//
// Each store field is a `watch` channel plus a monotonic request counter.
// A request takes a ticket before it is sent; its response is applied
// only if no later-issued request has already landed. Concurrent writers
// still race, but the winner is always the most recently *issued*
// request rather than whichever response happened to arrive last.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Position of a request in its projection's issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Ticket(u64);

/// Issues tickets and remembers the newest applied one.
#[derive(Debug, Default)]
pub(crate) struct RequestSequencer {
    issued: AtomicU64,
    applied: AtomicU64,
}

impl RequestSequencer {
    pub(crate) fn ticket(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Mark `ticket` applied if it is newer than anything applied so far.
    pub(crate) fn try_advance(&self, ticket: Ticket) -> bool {
        self.applied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (ticket.0 > current).then_some(ticket.0)
            })
            .is_ok()
    }

    pub(crate) fn last_applied(&self) -> u64 {
        self.applied.load(Ordering::Acquire)
    }
}

/// A watch-backed store field with last-issued-wins updates.
///
/// Also keeps the last *confirmed* value (set only by sequenced
/// applies) so optimistic local edits can be rolled back.
pub(crate) struct Projection<T: Clone + Send + Sync + 'static> {
    current: watch::Sender<T>,
    confirmed: watch::Sender<T>,
    sequencer: RequestSequencer,
    name: &'static str,
}

impl<T: Clone + Send + Sync + 'static> Projection<T> {
    pub(crate) fn new(name: &'static str, initial: T) -> Self {
        let (current, _) = watch::channel(initial.clone());
        let (confirmed, _) = watch::channel(initial);
        Self {
            current,
            confirmed,
            sequencer: RequestSequencer::default(),
            name,
        }
    }

    pub(crate) fn ticket(&self) -> Ticket {
        self.sequencer.ticket()
    }

    pub(crate) fn get(&self) -> T {
        self.current.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<T> {
        self.current.subscribe()
    }

    /// Replace the value with a response for `ticket`. Stale responses
    /// are dropped and `false` is returned.
    pub(crate) fn apply(&self, ticket: Ticket, value: T) -> bool {
        self.apply_with(ticket, |slot| *slot = value)
    }

    /// Edit the value in place on behalf of `ticket`.
    pub(crate) fn apply_with(&self, ticket: Ticket, edit: impl FnOnce(&mut T)) -> bool {
        let applied = self.current.send_if_modified(|slot| {
            if !self.sequencer.try_advance(ticket) {
                return false;
            }
            edit(slot);
            true
        });
        if applied {
            self.confirmed.send_replace(self.current.borrow().clone());
        } else {
            tracing::debug!(
                projection = self.name,
                ticket = ticket.0,
                last_applied = self.sequencer.last_applied(),
                "discarding stale response"
            );
        }
        applied
    }

    /// Unsequenced local edit (optimistic update).
    pub(crate) fn modify(&self, edit: impl FnOnce(&mut T)) {
        self.current.send_modify(edit);
    }

    /// Restore the last confirmed value.
    pub(crate) fn rollback(&self) {
        let confirmed = self.confirmed.borrow().clone();
        self.current.send_replace(confirmed);
    }
}
