use super::ModelEvent;

pub type SubscriptionId = u64;

type Callback = Box<dyn Fn(&ModelEvent) + Send>;

/// Registered change listeners.
///
/// Callbacks run synchronously on the thread that mutated the model, in
/// subscription order.
#[derive(Default)]
pub struct Observers {
    next_id: SubscriptionId,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

impl Observers {
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ModelEvent) + Send + 'static,
    {
        self.next_id += 1;
        self.callbacks.push((self.next_id, Box::new(callback)));
        self.next_id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    pub fn notify(&self, event: &ModelEvent) {
        for (_, callback) in &self.callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}
