use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::ReminderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ReminderMap) + Send + Sync>;

/// Observers interested in "reminders updated".
#[derive(Default)]
pub struct ReminderEvents {
    inner: RwLock<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl ReminderEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&ReminderMap) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut registry = self.inner.write();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.inner.write();
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().listeners.len()
    }

    pub(crate) fn emit(&self, reminders: &ReminderMap) {
        // Listeners may subscribe or unsubscribe from inside the callback.
        let listeners: Vec<Listener> = self
            .inner
            .read()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        tracing::debug!(listeners = listeners.len(), "reminders updated");
        for listener in listeners {
            listener(reminders);
        }
    }
}
