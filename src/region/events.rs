//! Change records published by a region after structural edits.

use std::sync::mpsc::{self, Receiver, Sender};

/// A structural change, sent once the edit is fully applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionChange {
    Added { x: u8, z: u8 },
    Removed { x: u8, z: u8 },
}

/// Fan-out of change records to every live subscriber, in order.
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Vec<Sender<RegionChange>>,
}

impl Subscribers {
    pub fn subscribe(&mut self) -> Receiver<RegionChange> {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        rx
    }

    /// Deliver `change`; receivers that were dropped are forgotten.
    pub fn publish(&mut self, change: RegionChange) {
        self.senders.retain(|tx| tx.send(change).is_ok());
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_in_order() {
        let mut subs = Subscribers::default();
        let rx = subs.subscribe();
        subs.publish(RegionChange::Added { x: 1, z: 2 });
        subs.publish(RegionChange::Removed { x: 1, z: 2 });

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                RegionChange::Added { x: 1, z: 2 },
                RegionChange::Removed { x: 1, z: 2 }
            ]
        );
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let mut subs = Subscribers::default();
        let kept = subs.subscribe();
        drop(subs.subscribe());
        assert_eq!(subs.len(), 2);

        subs.publish(RegionChange::Added { x: 0, z: 0 });
        assert_eq!(subs.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), RegionChange::Added { x: 0, z: 0 });
    }
}
