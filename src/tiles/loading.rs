use std::fmt;

/// Aggregate loading signal of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadingState {
    #[default]
    Idle,
    Loading,
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
        }
    }
}

/// Handle returned by [`LoadingStateTracker::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(LoadingState) + Send>;

/// Turns a count of outstanding requests into binary loading edges.
///
/// Subscribers hear about `Idle -> Loading` when the count leaves zero and
/// `Loading -> Idle` when it returns to zero; nothing in between.
pub struct LoadingStateTracker {
    outstanding: usize,
    state: LoadingState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl LoadingStateTracker {
    pub fn new() -> Self {
        Self {
            outstanding: 0,
            state: LoadingState::Idle,
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn on_request_started(&mut self) {
        self.outstanding += 1;
        if self.outstanding == 1 {
            self.set_state(LoadingState::Loading);
        }
    }

    /// Called once per request that reached Loaded, Failed or Cancelled
    pub fn on_request_settled(&mut self) {
        if self.outstanding == 0 {
            log::warn!("request settled with no outstanding requests; ignoring");
            return;
        }
        self.outstanding -= 1;
        if self.outstanding == 0 {
            self.set_state(LoadingState::Idle);
        }
    }

    pub fn current_state(&self) -> LoadingState {
        self.state
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn subscribe(&mut self, listener: impl FnMut(LoadingState) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    fn set_state(&mut self, state: LoadingState) {
        if self.state == state {
            return;
        }
        self.state = state;
        log::info!("tile loading state -> {}", state);
        for (_, listener) in &mut self.listeners {
            listener(state);
        }
    }
}

impl Default for LoadingStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadingStateTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingStateTracker")
            .field("outstanding", &self.outstanding)
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorded(tracker: &mut LoadingStateTracker) -> Arc<Mutex<Vec<LoadingState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tracker.subscribe(move |state| sink.lock().unwrap().push(state));
        seen
    }

    #[test]
    fn test_binary_edges_only() {
        let mut tracker = LoadingStateTracker::new();
        let seen = recorded(&mut tracker);

        for _ in 0..3 {
            tracker.on_request_started();
        }
        tracker.on_request_settled();
        tracker.on_request_started();
        for _ in 0..3 {
            tracker.on_request_settled();
        }
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![LoadingState::Loading, LoadingState::Idle]
        );
    }

    #[test]
    fn test_any_interleaving_gives_two_edges() {
        // start/settle patterns that never let the count hit zero midway
        let patterns: [&[bool]; 3] = [
            &[true, true, true, false, false, false],
            &[true, true, false, true, false, false],
            &[true, true, false, true, false, true, false, false],
        ];
        for pattern in patterns {
            let mut tracker = LoadingStateTracker::new();
            let seen = recorded(&mut tracker);
            for &start in pattern {
                if start {
                    tracker.on_request_started();
                } else {
                    tracker.on_request_settled();
                }
            }
            assert_eq!(seen.lock().unwrap().len(), 2, "{:?}", pattern);
            assert_eq!(tracker.current_state(), LoadingState::Idle);
        }
    }

    #[test]
    fn test_extra_settle_is_ignored() {
        let mut tracker = LoadingStateTracker::new();
        let seen = recorded(&mut tracker);
        tracker.on_request_settled();
        assert_eq!(tracker.outstanding(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let mut tracker = LoadingStateTracker::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let id = tracker.subscribe(move |_| *sink.lock().unwrap() += 1);

        tracker.on_request_started();
        assert!(tracker.unsubscribe(id));
        assert!(!tracker.unsubscribe(id));
        tracker.on_request_settled();
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
