//! Per-build publish/subscribe of progress events
//!
//! Publishing never waits for subscribers. A subscriber that falls more than
//! the channel capacity behind skips the oldest events, but every subscriber
//! receives the terminal event, including one that joins after the build
//! has finished.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::event::ProgressEvent;
use crate::job::JobId;

struct ChannelState {
    terminal: Option<ProgressEvent>,
    /// Dropped after the terminal event, releasing the buffer once every
    /// live subscriber has drained it
    sender: Option<broadcast::Sender<ProgressEvent>>,
}

struct JobChannel {
    state: Mutex<ChannelState>,
}

impl JobChannel {
    fn terminal(&self) -> Option<ProgressEvent> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminal
            .clone()
    }
}

/// Progress fan-out for all builds
pub struct ProgressBroker {
    capacity: usize,
    channels: RwLock<HashMap<JobId, Arc<JobChannel>>>,
}

impl ProgressBroker {
    /// `capacity` events are buffered per build before subscribers lag
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Open the channel for a new build; idempotent
    pub fn register(&self, id: JobId) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.entry(id).or_insert_with(|| {
            let (sender, _) = broadcast::channel(self.capacity);
            Arc::new(JobChannel {
                state: Mutex::new(ChannelState {
                    terminal: None,
                    sender: Some(sender),
                }),
            })
        });
    }

    fn channel(&self, id: &JobId) -> Option<Arc<JobChannel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Publish an event. Returns false if it was dropped because the build
    /// is unknown or already terminal.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        let Some(channel) = self.channel(&event.build_id) else {
            warn!(build_id = %event.build_id, "progress for unknown build dropped");
            return false;
        };

        let mut state = channel.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.terminal.is_some() {
            debug!(build_id = %event.build_id, "progress after terminal event dropped");
            return false;
        }
        let terminal = event.is_terminal();
        if terminal {
            state.terminal = Some(event.clone());
        }
        if let Some(ref sender) = state.sender {
            // No receivers is fine
            let _ = sender.send(event);
        }
        if terminal {
            state.sender = None;
        }
        true
    }

    /// Follow a build's events from now on
    pub fn subscribe(&self, id: &JobId) -> Option<Subscription> {
        let channel = self.channel(id)?;
        let state = channel.state.lock().unwrap_or_else(PoisonError::into_inner);

        let inner = match (&state.terminal, &state.sender) {
            (Some(terminal), _) => SubscriptionState::Finished(Some(terminal.clone())),
            (None, Some(sender)) => SubscriptionState::Live(sender.subscribe()),
            (None, None) => SubscriptionState::Finished(None),
        };
        drop(state);

        Some(Subscription {
            channel,
            inner,
        })
    }

    /// Terminal event of a finished build
    pub fn terminal_event(&self, id: &JobId) -> Option<ProgressEvent> {
        self.channel(id)?.terminal()
    }

    pub fn subscriber_count(&self, id: &JobId) -> usize {
        let Some(channel) = self.channel(id) else {
            return 0;
        };
        let state = channel.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sender.as_ref().map_or(0, |s| s.receiver_count())
    }

    /// Forget a finished build's channel.
    ///
    /// Returns false, keeping the channel, if the build is unknown or has
    /// not published its terminal event. Existing subscriptions still end
    /// with the terminal event.
    pub fn remove(&self, id: &JobId) -> bool {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let finished = channels
            .get(id)
            .map_or(false, |c| c.terminal().is_some());
        if finished {
            channels.remove(id);
            debug!(build_id = %id, "released progress channel");
        }
        finished
    }

    /// Number of builds with an open or finished channel
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum SubscriptionState {
    Live(broadcast::Receiver<ProgressEvent>),
    Finished(Option<ProgressEvent>),
}

/// Stream of one build's events, ending after the terminal event
pub struct Subscription {
    channel: Arc<JobChannel>,
    inner: SubscriptionState,
}

impl Subscription {
    /// Next event, or `None` once the terminal event has been delivered
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            match &mut self.inner {
                SubscriptionState::Finished(pending) => return pending.take(),
                SubscriptionState::Live(rx) => match rx.recv().await {
                    Ok(event) => {
                        if event.is_terminal() {
                            self.inner = SubscriptionState::Finished(None);
                        }
                        return Some(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "subscriber lagged, skipping old events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.inner = SubscriptionState::Finished(self.channel.terminal());
                    }
                },
            }
        }
    }

    /// Drain the stream, returning the terminal event
    pub async fn wait_terminal(mut self) -> Option<ProgressEvent> {
        let mut last = None;
        while let Some(event) = self.next().await {
            last = Some(event);
        }
        last.filter(ProgressEvent::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::stage::Stage;

    fn progress(id: JobId, percent: u8) -> ProgressEvent {
        ProgressEvent::new(id, EventKind::Progress, Some(Stage::Compile), percent, "working")
    }

    fn done(id: JobId) -> ProgressEvent {
        ProgressEvent::new(id, EventKind::Succeeded, None, 100, "done")
    }

    #[tokio::test]
    async fn test_subscriber_sees_events_then_terminal() {
        let broker = ProgressBroker::new(16);
        let id = JobId::new();
        broker.register(id);

        let mut sub = broker.subscribe(&id).unwrap();
        assert!(broker.publish(progress(id, 10)));
        assert!(broker.publish(done(id)));

        assert_eq!(sub.next().await.unwrap().percent, 10);
        assert_eq!(sub.next().await.unwrap().kind, EventKind::Succeeded);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_exactly_one_terminal() {
        let broker = ProgressBroker::new(16);
        let id = JobId::new();
        broker.register(id);
        let sub = broker.subscribe(&id).unwrap();

        assert!(broker.publish(done(id)));
        assert!(!broker.publish(ProgressEvent::new(id, EventKind::Failed, None, 0, "late")));
        assert!(!broker.publish(progress(id, 50)));

        let terminal = sub.wait_terminal().await.unwrap();
        assert_eq!(terminal.kind, EventKind::Succeeded);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_terminal_only() {
        let broker = ProgressBroker::new(16);
        let id = JobId::new();
        broker.register(id);
        broker.publish(progress(id, 10));
        broker.publish(done(id));

        let mut sub = broker.subscribe(&id).unwrap();
        let event = sub.next().await.unwrap();
        assert_eq!(event.kind, EventKind::Succeeded);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_but_sees_terminal() {
        let broker = ProgressBroker::new(2);
        let id = JobId::new();
        broker.register(id);
        let mut sub = broker.subscribe(&id).unwrap();

        for p in 0..20 {
            broker.publish(progress(id, p));
        }
        broker.publish(done(id));

        let mut seen = Vec::new();
        while let Some(event) = sub.next().await {
            seen.push(event);
        }
        assert!(seen.len() <= 2);
        assert_eq!(seen.last().unwrap().kind, EventKind::Succeeded);
    }

    #[tokio::test]
    async fn test_remove_finished_channel() {
        let broker = ProgressBroker::new(4);
        let id = JobId::new();
        broker.register(id);
        let sub = broker.subscribe(&id).unwrap();
        assert_eq!(broker.subscriber_count(&id), 1);

        broker.publish(progress(id, 10));
        assert!(!broker.remove(&id));

        broker.publish(done(id));
        // The terminal event releases the sender
        assert_eq!(broker.subscriber_count(&id), 0);
        assert!(broker.remove(&id));
        assert!(broker.is_empty());
        assert!(broker.subscribe(&id).is_none());

        // A subscription taken before removal still ends properly
        let terminal = sub.wait_terminal().await.unwrap();
        assert_eq!(terminal.kind, EventKind::Succeeded);
    }

    #[test]
    fn test_unknown_build() {
        let broker = ProgressBroker::new(4);
        let id = JobId::new();
        assert!(broker.subscribe(&id).is_none());
        assert!(!broker.publish(progress(id, 1)));
    }
}
