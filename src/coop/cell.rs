//! Single-assignment result slot with broadcast fan-out.

use tokio::sync::watch;

/// Terminal state of a shared flight.
#[derive(Debug, Clone)]
enum Slot<T, E> {
    Pending,
    Done(Result<T, E>),
    Abandoned,
}

/// One-shot settable result shared by every task interested in a flight.
///
/// The pending → terminal transition happens at most once; once settled the
/// value is immutable and every waiter, current or future, observes the
/// identical clone. Built on `tokio::sync::watch` so the winning write and
/// the wake-up of all parked waiters are a single atomic step.
#[derive(Debug)]
pub struct ResultCell<T, E> {
    tx: watch::Sender<Slot<T, E>>,
}

impl<T: Clone, E: Clone> ResultCell<T, E> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Slot::Pending);
        Self { tx }
    }

    /// Publish a terminal result if the cell is still pending.
    ///
    /// Returns true when this call won the write; a false return means some
    /// other publisher (or an abandonment) got there first and `result` was
    /// discarded.
    pub fn complete(&self, result: Result<T, E>) -> bool {
        self.tx.send_if_modified(|slot| {
            if matches!(slot, Slot::Pending) {
                *slot = Slot::Done(result);
                true
            } else {
                false
            }
        })
    }

    /// Move a pending cell to the abandoned state, waking every waiter with
    /// "no result will ever come". Settled cells are left untouched.
    pub fn abandon(&self) -> bool {
        self.tx.send_if_modified(|slot| {
            if matches!(slot, Slot::Pending) {
                *slot = Slot::Abandoned;
                true
            } else {
                false
            }
        })
    }

    /// Current terminal result, if one has been published.
    pub fn peek(&self) -> Option<Result<T, E>> {
        match &*self.tx.borrow() {
            Slot::Done(result) => Some(result.clone()),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(&*self.tx.borrow(), Slot::Pending)
    }

    /// Wait until the cell settles. Resolves with the published result, or
    /// `None` if the flight was abandoned before any result arrived.
    pub async fn wait(&self) -> Option<Result<T, E>> {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let slot = rx.borrow_and_update();
                match &*slot {
                    Slot::Done(result) => return Some(result.clone()),
                    Slot::Abandoned => return None,
                    Slot::Pending => {}
                }
            }
            if rx.changed().await.is_err() {
                // Sender lives inside this cell, so a closed channel means
                // the cell itself was dropped mid-wait.
                return None;
            }
        }
    }
}

impl<T: Clone, E: Clone> Default for ResultCell<T, E> {
    fn default() -> Self {
        Self::new()
    }
}
