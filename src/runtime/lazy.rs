//! Priority-ordered batch loading of several layers.
//!
//! Enabled layer configs are sorted by priority (highest first) and constructed in
//! batches of at most `max_concurrent`, each construction running on its own task
//! behind a yield point. Published state is refreshed after every batch so that
//! high-priority layers show up before the rest have been built. A load that has been
//! superseded by a newer one stops publishing.

use crate::error::{AppError, Result};
use crate::runtime::{RequestSequencer, YieldPoint};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error};

pub type LayerFactory<L> = Arc<dyn Fn() -> Result<Option<L>> + Send + Sync>;

/// One layer to be built by a `LazyLayerSet`.
pub struct LayerConfig<L> {
    pub id: String,
    /// Higher priority loads first.
    pub priority: i32,
    pub enabled: bool,
    pub factory: LayerFactory<L>,
}

impl<L> Clone for LayerConfig<L> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            priority: self.priority,
            enabled: self.enabled,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<L> LayerConfig<L> {
    pub fn new<F>(id: &str, priority: i32, factory: F) -> Self
    where
        F: Fn() -> Result<Option<L>> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            priority,
            enabled: true,
            factory: Arc::new(factory),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Published state of a `LazyLayerSet`.
pub struct LazyLayersState<L> {
    /// Built layers in priority order.
    pub layers: Vec<(String, Arc<L>)>,
    pub loading: bool,
    /// Outcome per attempted layer id: `None` on success.
    pub errors: HashMap<String, Option<AppError>>,
}

impl<L> Clone for LazyLayersState<L> {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.clone(),
            loading: self.loading,
            errors: self.errors.clone(),
        }
    }
}

impl<L> Default for LazyLayersState<L> {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            loading: false,
            errors: HashMap::new(),
        }
    }
}

pub struct LazyLayerSet<L> {
    max_concurrent: usize,
    yield_point: YieldPoint,
    sequencer: RequestSequencer,
    state: watch::Sender<LazyLayersState<L>>,
}

impl<L> LazyLayerSet<L>
where
    L: Send + Sync + 'static,
{
    pub fn new(max_concurrent: usize, yield_point: YieldPoint) -> Self {
        let (state, _) = watch::channel(LazyLayersState::default());
        Self {
            max_concurrent: max_concurrent.max(1),
            yield_point,
            sequencer: RequestSequencer::new(),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LazyLayersState<L>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LazyLayersState<L> {
        self.state.borrow().clone()
    }

    /// Builds every enabled layer, highest priority first.
    pub async fn load(&self, configs: &[LayerConfig<L>]) {
        let ticket = self.sequencer.begin();
        let mut sorted: Vec<&LayerConfig<L>> = configs.iter().filter(|c| c.enabled).collect();
        // Stable sort keeps declaration order among equal priorities
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

        self.state.send_replace(LazyLayersState {
            layers: Vec::new(),
            loading: true,
            errors: HashMap::new(),
        });

        let mut layers: Vec<(String, Arc<L>)> = Vec::new();
        let mut errors: HashMap<String, Option<AppError>> = HashMap::new();

        for (batch_no, batch) in sorted.chunks(self.max_concurrent).enumerate() {
            debug!("Loading layer batch {} ({} layers)", batch_no, batch.len());
            let mut tasks = JoinSet::new();
            for (slot, config) in batch.iter().enumerate() {
                let factory = Arc::clone(&config.factory);
                let yield_point = self.yield_point;
                tasks.spawn(async move {
                    yield_point.wait().await;
                    (slot, factory())
                });
            }

            let mut results: Vec<Option<Result<Option<L>>>> =
                (0..batch.len()).map(|_| None).collect();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((slot, result)) => results[slot] = Some(result),
                    Err(e) => error!("Layer task failed to complete: {}", e),
                }
            }

            for (config, result) in batch.iter().zip(results) {
                let result = result.unwrap_or_else(|| {
                    Err(AppError::Layer(format!("task for layer '{}' aborted", config.id)))
                });
                match result {
                    Ok(Some(layer)) => {
                        layers.push((config.id.clone(), Arc::new(layer)));
                        errors.insert(config.id.clone(), None);
                    },
                    Ok(None) => {
                        errors.insert(config.id.clone(), None);
                    },
                    Err(e) => {
                        error!("Failed to load layer {}: {}", config.id, e);
                        errors.insert(config.id.clone(), Some(e));
                    },
                }
            }

            if !ticket.is_current() {
                debug!(
                    "Dropping layer load {} superseded after batch {}",
                    ticket.id(),
                    batch_no
                );
                return;
            }
            self.state.send_replace(LazyLayersState {
                layers: layers.clone(),
                loading: true,
                errors: errors.clone(),
            });
        }

        if ticket.is_current() {
            self.state.send_modify(|s| s.loading = false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Barrier, Mutex};

    fn named(
        id: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    ) -> LayerConfig<String> {
        LayerConfig::new(id, priority, move || {
            log.lock().unwrap().push(id);
            Ok(Some(id.to_string()))
        })
    }

    #[tokio::test]
    async fn layers_are_ordered_by_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = LazyLayerSet::new(1, YieldPoint::Idle);
        set.load(&[
            named("basemap-labels", 1, log.clone()),
            named("stations", 10, log.clone()),
            named("heatmap", 5, log.clone()),
        ])
        .await;

        let state = set.state();
        let ids: Vec<&str> = state.layers.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["stations", "heatmap", "basemap-labels"]);
        // with one layer per batch, construction follows priority too
        assert_eq!(*log.lock().unwrap(), vec!["stations", "heatmap", "basemap-labels"]);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn disabled_configs_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let set = LazyLayerSet::new(2, YieldPoint::Idle);
        set.load(&[
            named("stations", 10, log.clone()),
            named("heatmap", 5, log.clone()).with_enabled(false),
        ])
        .await;

        let state = set.state();
        assert_eq!(state.layers.len(), 1);
        assert!(!state.errors.contains_key("heatmap"));
        assert!(!log.lock().unwrap().contains(&"heatmap"));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let set: LazyLayerSet<String> = LazyLayerSet::new(2, YieldPoint::Idle);
        set.load(&[
            LayerConfig::new("broken", 9, || Err(AppError::Layer("no data".to_string()))),
            LayerConfig::new("empty", 8, || Ok(None)),
            LayerConfig::new("stations", 7, || Ok(Some("stations".to_string()))),
        ])
        .await;

        let state = set.state();
        assert_eq!(state.layers.len(), 1);
        assert!(matches!(state.errors.get("broken"), Some(Some(AppError::Layer(_)))));
        assert!(matches!(state.errors.get("empty"), Some(None)));
        assert!(matches!(state.errors.get("stations"), Some(None)));
    }

    #[tokio::test]
    async fn state_is_published_after_each_batch() {
        let set: LazyLayerSet<String> = LazyLayerSet::new(1, YieldPoint::Idle);
        let mut rx = set.subscribe();
        let configs = vec![
            LayerConfig::new("a", 2, || Ok(Some("a".to_string()))),
            LayerConfig::new("b", 1, || Ok(Some("b".to_string()))),
        ];

        let watcher = tokio::spawn(async move {
            let mut sizes = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                sizes.push(state.layers.len());
                if !state.loading {
                    break;
                }
            }
            sizes
        });
        set.load(&configs).await;
        drop(set);

        let sizes = watcher.await.unwrap();
        assert_eq!(sizes.last(), Some(&2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn superseded_load_does_not_publish() {
        let set: Arc<LazyLayerSet<String>> =
            Arc::new(LazyLayerSet::new(2, YieldPoint::Immediate));
        let started = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let old_configs = {
            let (started, release) = (started.clone(), release.clone());
            vec![LayerConfig::new("old", 1, move || {
                started.wait();
                release.wait();
                Ok(Some("old".to_string()))
            })]
        };
        let old_load = {
            let set = set.clone();
            tokio::spawn(async move { set.load(&old_configs).await })
        };

        let waiter = started.clone();
        tokio::task::spawn_blocking(move || waiter.wait()).await.unwrap();
        set.load(&[LayerConfig::new("new", 1, || Ok(Some("new".to_string())))])
            .await;

        let waiter = release.clone();
        tokio::task::spawn_blocking(move || waiter.wait()).await.unwrap();
        old_load.await.unwrap();

        let state = set.state();
        let ids: Vec<&str> = state.layers.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
        assert!(!state.loading);
        assert!(!state.errors.contains_key("old"));
    }
}
