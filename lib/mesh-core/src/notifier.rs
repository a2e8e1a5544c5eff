//! Turns projection events into selective push requests

use crate::projection::Event;
use mesh_api::{ConfigKey, PushRequest};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Downstream consumer of push requests
pub trait XdsUpdater: Send + Sync {
    fn config_update(&self, request: PushRequest);
}

/// Projection outputs that name the configuration they affect
pub trait AffectedConfigs {
    fn affected_configs(&self, configs: &mut BTreeSet<ConfigKey>);
}

/// XdsUpdater forwarding requests over an unbounded channel
#[derive(Clone, Debug)]
pub struct ChannelUpdater {
    tx: mpsc::UnboundedSender<PushRequest>,
}

impl ChannelUpdater {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl XdsUpdater for ChannelUpdater {
    fn config_update(&self, request: PushRequest) {
        if self.tx.send(request).is_err() {
            warn!("Push request dropped: receiver closed");
        }
    }
}

/// Batches projection events into one push per directory mutation
#[derive(Clone)]
pub struct ChangeNotifier {
    updater: Arc<dyn XdsUpdater>,
}

impl ChangeNotifier {
    pub fn new(updater: Arc<dyn XdsUpdater>) -> Self {
        Self { updater }
    }

    /// Start a batch. Initial-sync batches never push.
    pub fn batch(&self, initial_sync: bool) -> PushBatch<'_> {
        PushBatch {
            notifier: self,
            initial_sync,
            configs: BTreeSet::new(),
        }
    }
}

/// Deduplicated set of configs affected within one batch
pub struct PushBatch<'a> {
    notifier: &'a ChangeNotifier,
    initial_sync: bool,
    configs: BTreeSet<ConfigKey>,
}

impl PushBatch<'_> {
    pub fn collect<T: AffectedConfigs>(&mut self, events: &[Event<T>]) {
        for event in events {
            for item in event.items() {
                item.affected_configs(&mut self.configs);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Emit at most one incremental push for everything collected
    pub fn flush(self) -> Option<PushRequest> {
        if self.initial_sync {
            debug!(
                "Suppressing push for {} configs during initial sync",
                self.configs.len()
            );
            return None;
        }
        if self.configs.is_empty() {
            return None;
        }
        let request = PushRequest::incremental(self.configs);
        debug!(
            "Pushing incremental update for {} configs",
            request.configs_updated.len()
        );
        self.notifier.updater.config_update(request.clone());
        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingUpdater;

    #[derive(Clone, Debug, PartialEq)]
    struct Touches(Vec<&'static str>);

    impl AffectedConfigs for Touches {
        fn affected_configs(&self, configs: &mut BTreeSet<ConfigKey>) {
            for key in &self.0 {
                configs.insert(ConfigKey::from_service_key(key));
            }
        }
    }

    #[test]
    fn test_batch_coalesces_and_deduplicates() {
        let updater = Arc::new(RecordingUpdater::default());
        let notifier = ChangeNotifier::new(updater.clone());

        let mut batch = notifier.batch(false);
        batch.collect(&[
            Event::Add(Touches(vec!["default/a", "default/b"])),
            Event::Delete(Touches(vec!["default/a"])),
        ]);
        batch.collect(&[Event::Update {
            old: Touches(vec!["default/c"]),
            new: Touches(vec!["default/b"]),
        }]);
        batch.flush();

        let pushes = updater.requests();
        assert_eq!(pushes.len(), 1);
        assert!(!pushes[0].full);
        let names: Vec<_> = pushes[0].configs_updated.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_batch_does_not_push() {
        let updater = Arc::new(RecordingUpdater::default());
        let notifier = ChangeNotifier::new(updater.clone());

        let batch = notifier.batch(false);
        assert!(batch.is_empty());
        assert!(batch.flush().is_none());
        assert!(updater.requests().is_empty());
    }

    #[test]
    fn test_initial_sync_is_suppressed() {
        let updater = Arc::new(RecordingUpdater::default());
        let notifier = ChangeNotifier::new(updater.clone());

        let mut batch = notifier.batch(true);
        batch.collect(&[Event::Add(Touches(vec!["default/a"]))]);
        assert!(batch.flush().is_none());
        assert!(updater.requests().is_empty());
    }

    #[tokio::test]
    async fn test_channel_updater_forwards_requests() {
        let (updater, mut rx) = ChannelUpdater::new();
        let notifier = ChangeNotifier::new(Arc::new(updater));

        let mut batch = notifier.batch(false);
        batch.collect(&[Event::Add(Touches(vec!["default/a"]))]);
        batch.flush();

        let request = rx.recv().await.unwrap();
        assert_eq!(
            request.configs_updated.into_iter().collect::<Vec<_>>(),
            vec![ConfigKey::service_entry("default", "a")]
        );
    }
}
