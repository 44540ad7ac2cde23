//! Linear snapshot history
//!
//! Each entry is a full copy of the tracked value. Pushing after an undo
//! discards the undone entries; there is no redo.

#[derive(Debug, Clone, PartialEq)]
pub struct History<T> {
    snapshots: Vec<T>,
    index: usize,
}

impl<T: Clone + PartialEq + Default> Default for History<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq> History<T> {
    pub fn new(initial: T) -> Self {
        Self {
            snapshots: vec![initial],
            index: 0,
        }
    }

    pub fn current(&self) -> &T {
        &self.snapshots[self.index]
    }

    /// Record `state` unless it equals the current snapshot.
    /// Returns true if a snapshot was appended.
    pub fn push(&mut self, state: &T) -> bool {
        if self.current() == state {
            return false;
        }
        self.snapshots.truncate(self.index + 1);
        self.snapshots.push(state.clone());
        self.index = self.snapshots.len() - 1;
        true
    }

    /// Step back one snapshot. `None` at the first snapshot.
    pub fn undo(&mut self) -> Option<&T> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(self.current())
    }

    pub fn reset(&mut self, initial: T) {
        self.snapshots.clear();
        self.snapshots.push(initial);
        self.index = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}
