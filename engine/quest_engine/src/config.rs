//! Engine configuration.

use crate::events::DEFAULT_EVENT_BUFFER;
use crate::lifecycle::CompletionPolicy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// When a quest at 100% moves to `completed`.
    pub completion_policy: CompletionPolicy,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_policy: CompletionPolicy::Automatic,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}
