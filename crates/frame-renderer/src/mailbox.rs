/// Single pending frame, last write wins.
///
/// Posting over an occupied slot hands the superseded frame back to the
/// caller so it can be recycled. The slot carries no lock of its own; the
/// renderer keeps it behind the same mutex as the rest of its state.
#[derive(Debug)]
pub struct FrameMailbox<T> {
    slot: Option<T>,
    superseded: u64,
}

impl<T> Default for FrameMailbox<T> {
    fn default() -> Self {
        Self {
            slot: None,
            superseded: 0,
        }
    }
}

impl<T> FrameMailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, frame: T) -> Option<T> {
        let previous = self.slot.replace(frame);
        if previous.is_some() {
            self.superseded += 1;
        }
        previous
    }

    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    /// Frames replaced before they were taken.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    pub fn clear(&mut self) -> Option<T> {
        self.slot.take()
    }
}
