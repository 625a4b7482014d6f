//! Per-session progress pub/sub

use super::events::{CompletionEvent, ExpertStatusEvent, ProgressEvent, ThinkingEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle returned by `add_*_listener`, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered listener lists for one event channel, keyed by session
struct ListenerMap<E> {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Callback<E>)>>>,
}

impl<E> ListenerMap<E> {
    fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn add(&self, session_id: &str, id: ListenerId, callback: Callback<E>) {
        self.listeners
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push((id, callback));
    }

    fn remove(&self, session_id: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(session_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(session_id);
        }
        removed
    }

    /// Invoke every listener of `session_id` in registration order.
    ///
    /// The list is snapshotted first and the lock released, so callbacks may
    /// add or remove listeners without deadlocking; such changes take effect
    /// from the next emit.
    fn emit(&self, session_id: &str, event: &E) -> usize {
        let snapshot: Vec<Callback<E>> = match self.listeners.lock().get(session_id) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };
        for callback in &snapshot {
            callback(event);
        }
        snapshot.len()
    }

    fn clear(&self, session_id: &str) {
        self.listeners.lock().remove(session_id);
    }

    fn count(&self, session_id: &str) -> usize {
        self.listeners
            .lock()
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Delivers thinking, expert-status and completion events to per-session
/// listeners.
///
/// Emission is synchronous: a listener that blocks stalls the round that
/// emitted the event. Listeners wanting to do async work should use
/// [`ProgressBroadcaster::subscribe`] and drain the receiver elsewhere.
pub struct ProgressBroadcaster {
    next_id: AtomicU64,
    thinking: ListenerMap<ThinkingEvent>,
    expert_status: ListenerMap<ExpertStatusEvent>,
    completion: ListenerMap<CompletionEvent>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            thinking: ListenerMap::new(),
            expert_status: ListenerMap::new(),
            completion: ListenerMap::new(),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_thinking_listener<F>(&self, session_id: &str, callback: F) -> ListenerId
    where
        F: Fn(&ThinkingEvent) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.thinking.add(session_id, id, Arc::new(callback));
        id
    }

    pub fn add_expert_status_listener<F>(&self, session_id: &str, callback: F) -> ListenerId
    where
        F: Fn(&ExpertStatusEvent) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.expert_status.add(session_id, id, Arc::new(callback));
        id
    }

    pub fn add_completion_listener<F>(&self, session_id: &str, callback: F) -> ListenerId
    where
        F: Fn(&CompletionEvent) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.completion.add(session_id, id, Arc::new(callback));
        id
    }

    pub fn remove_thinking_listener(&self, session_id: &str, id: ListenerId) -> bool {
        self.thinking.remove(session_id, id)
    }

    pub fn remove_expert_status_listener(&self, session_id: &str, id: ListenerId) -> bool {
        self.expert_status.remove(session_id, id)
    }

    pub fn remove_completion_listener(&self, session_id: &str, id: ListenerId) -> bool {
        self.completion.remove(session_id, id)
    }

    pub fn emit_thinking(&self, event: ThinkingEvent) {
        let delivered = self.thinking.emit(&event.session_id, &event);
        debug!(
            session_id = %event.session_id,
            step = event.step.as_str(),
            progress = event.progress,
            delivered,
            "thinking event"
        );
    }

    pub fn emit_expert_status(&self, event: ExpertStatusEvent) {
        let delivered = self.expert_status.emit(&event.session_id, &event);
        debug!(
            session_id = %event.session_id,
            function = %event.function_name,
            status = ?event.status,
            delivered,
            "expert status event"
        );
    }

    pub fn emit_completion(&self, event: CompletionEvent) {
        let delivered = self.completion.emit(&event.session_id, &event);
        debug!(session_id = %event.session_id, delivered, "completion event");
    }

    /// Receive every event of a session on one channel.
    ///
    /// Registers one listener per event kind; they stay registered until
    /// [`ProgressBroadcaster::clear_session`] runs, sending into a closed
    /// receiver is silently ignored.
    pub fn subscribe(&self, session_id: &str) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let sender = tx.clone();
        self.add_thinking_listener(session_id, move |e| {
            let _ = sender.send(ProgressEvent::Thinking(e.clone()));
        });
        let sender = tx.clone();
        self.add_expert_status_listener(session_id, move |e| {
            let _ = sender.send(ProgressEvent::ExpertStatus(e.clone()));
        });
        self.add_completion_listener(session_id, move |e| {
            let _ = tx.send(ProgressEvent::Completion(e.clone()));
        });

        rx
    }

    /// Drop every listener registered for a session
    pub fn clear_session(&self, session_id: &str) {
        self.thinking.clear(session_id);
        self.expert_status.clear(session_id);
        self.completion.clear(session_id);
    }

    /// Number of listeners across all channels for a session
    pub fn listener_count(&self, session_id: &str) -> usize {
        self.thinking.count(session_id)
            + self.expert_status.count(session_id)
            + self.completion.count(session_id)
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBroadcaster")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
