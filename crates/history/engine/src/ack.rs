//! Contiguous ack tracking for the queue processors.

use std::collections::BTreeMap;

/// Tracks outstanding tasks by level and computes how far the ack level may move.
///
/// The ack level only passes a task once every task at or below it has
/// completed; one slow task holds back everything read after it.
#[derive(Debug, Clone)]
pub struct AckManager<L: Ord + Copy> {
    ack_level: L,
    read_level: L,
    outstanding: BTreeMap<L, bool>,
}

impl<L: Ord + Copy> AckManager<L> {
    pub fn new(ack_level: L) -> Self {
        Self {
            ack_level,
            read_level: ack_level,
            outstanding: BTreeMap::new(),
        }
    }

    pub fn ack_level(&self) -> L {
        self.ack_level
    }

    pub fn read_level(&self) -> L {
        self.read_level
    }

    /// Record a task read from persistence.
    pub fn add(&mut self, level: L) {
        if level <= self.ack_level {
            return;
        }
        self.outstanding.entry(level).or_insert(false);
        if level > self.read_level {
            self.read_level = level;
        }
    }

    /// Whether a re-read task already finished and can be skipped.
    pub fn is_completed(&self, level: L) -> bool {
        level <= self.ack_level || self.outstanding.get(&level).copied().unwrap_or(false)
    }

    pub fn complete(&mut self, level: L) {
        if let Some(done) = self.outstanding.get_mut(&level) {
            *done = true;
        }
    }

    /// Advance past the completed prefix. Returns the new level if it moved.
    pub fn update_ack_level(&mut self) -> Option<L> {
        let mut moved = None;
        while let Some((level, done)) = self.outstanding.first_key_value().map(|(l, d)| (*l, *d)) {
            if !done {
                break;
            }
            self.outstanding.remove(&level);
            self.ack_level = level;
            moved = Some(level);
        }
        moved
    }

    /// Forget uncompleted reads so everything past the ack level is fetched
    /// again. Completed entries stay completed when they are re-read.
    pub fn reset_read_level(&mut self) {
        self.outstanding.retain(|_, done| *done);
        self.read_level = self.ack_level;
    }

    pub fn pending(&self) -> usize {
        self.outstanding.values().filter(|done| !**done).count()
    }
}
