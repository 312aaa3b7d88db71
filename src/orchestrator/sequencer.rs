//! The process-wide `delay.sequence` gate (spec §4.6 "Timer states",
//! Design Notes §9 "Global sequencer for `delay.sequence`"): "a process-wide
//! sequencer is a mapping from component name to a queue of pending
//! continuations; enqueuing runs the head immediately if the queue was
//! empty, and on removal the next continuation runs." Shared across every
//! cluster (spec §5 "Shared resources") and guarded by a single mutex that
//! is never held across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::oneshot;

#[derive(Default)]
struct Lane {
    /// `true` while some caller holds the slot for this name.
    occupied: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// A name -> FIFO-queue mapping; at most one holder per name at a time
/// (spec testable property 5: "For any name N and any instant, at most one
/// component named N is inside its `delay.sequence` window").
#[derive(Default)]
pub struct Sequencer {
    lanes: Mutex<HashMap<String, Lane>>,
}

/// A held slot; dropping it (or calling [`Ticket::release`] explicitly)
/// hands the lane off to the next waiter, if any.
pub struct Ticket<'a> {
    sequencer: &'a Sequencer,
    name: String,
    released: bool,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `name`'s lane is free, then holds it until the returned
    /// [`Ticket`] is released.
    pub async fn acquire(&self, name: &str) -> Ticket<'_> {
        let rx = {
            let mut lanes = self.lanes.lock().expect("sequencer mutex poisoned");
            let lane = lanes.entry(name.to_string()).or_default();
            if !lane.occupied {
                lane.occupied = true;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                lane.waiters.push_back(tx);
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            // The previous holder's release() fires this directly; a
            // dropped sender (holder's ticket dropped without releasing,
            // which never happens on the success path) just grants the
            // slot as well since recv() errors out.
            let _ = rx.await;
        }

        Ticket {
            sequencer: self,
            name: name.to_string(),
            released: false,
        }
    }

    fn release(&self, name: &str) {
        let mut lanes = self.lanes.lock().expect("sequencer mutex poisoned");
        if let Some(lane) = lanes.get_mut(name) {
            match lane.waiters.pop_front() {
                Some(next) => {
                    // Hand the slot directly to the next waiter; `occupied`
                    // stays true throughout.
                    let _ = next.send(());
                }
                None => lane.occupied = false,
            }
        }
    }
}

impl Ticket<'_> {
    pub fn release(mut self) {
        self.sequencer.release(&self.name);
        self.released = true;
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.sequencer.release(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn second_acquire_waits_for_first_release() {
        let sequencer = Arc::new(Sequencer::new());
        let first = sequencer.acquire("migrate").await;

        let seq2 = sequencer.clone();
        let handle = tokio::spawn(async move {
            let _second = seq2.acquire("migrate").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        first.release();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn distinct_names_do_not_contend() {
        let sequencer = Sequencer::new();
        let a = sequencer.acquire("a").await;
        let b = sequencer.acquire("b").await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn dropping_a_ticket_without_explicit_release_still_hands_off() {
        let sequencer = Arc::new(Sequencer::new());
        {
            let _first = sequencer.acquire("migrate").await;
        }
        let second = sequencer.acquire("migrate").await;
        drop(second);
    }
}
