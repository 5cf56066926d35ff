use crate::triggers::{EngineEvent, Trigger};

/// "Select one of N" state with a single running notification.
///
/// Selecting a new value stops the previously fired port before firing the
/// new one. Until the first selection nothing is running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latch<T> {
    value: Option<T>,
    active: Option<Trigger>,
}

impl<T> Default for Latch<T> {
    fn default() -> Self {
        Self {
            value: None,
            active: None,
        }
    }
}

impl<T: Copy + PartialEq> Latch<T> {
    pub fn value(&self) -> Option<T> {
        self.value
    }

    pub fn is(&self, value: T) -> bool {
        self.value == Some(value)
    }

    /// Latches `value`, emitting stop/fire events. Returns false when nothing changed.
    pub fn select(&mut self, value: T, trigger: Trigger, events: &mut Vec<EngineEvent>) -> bool {
        if self.is(value) {
            return false;
        }
        if let Some(previous) = self.active.take() {
            events.push(EngineEvent::Stop(previous));
        }
        self.value = Some(value);
        self.active = Some(trigger);
        events.push(EngineEvent::Fire(trigger));
        true
    }

    /// Updates the value without touching the running notification.
    pub fn relabel(&mut self, value: T) {
        self.value = Some(value);
    }
}
