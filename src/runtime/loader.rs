//! Async layer loader.
//!
//! Wraps a potentially expensive layer factory so it runs after a yield point instead
//! of inside the caller's current pass, and publishes the outcome (layer, loading flag,
//! error) through a `tokio::sync::watch` channel. A new load cycle starts whenever the
//! `enabled` flag or the dependency value changes. Overlapping cycles are fenced with
//! request-generation tokens: only the most recently started cycle may publish.

use crate::error::AppError;
use crate::runtime::{RequestSequencer, YieldPoint};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, warn};

pub type LoadCallback<L> = Arc<dyn Fn(Option<&L>) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&AppError) + Send + Sync>;

/// Options for one loader invocation.
pub struct LoaderOptions<L> {
    pub enabled: bool,
    pub on_load: Option<LoadCallback<L>>,
    pub on_error: Option<ErrorCallback>,
}

impl<L> Default for LoaderOptions<L> {
    fn default() -> Self {
        Self {
            enabled: true,
            on_load: None,
            on_error: None,
        }
    }
}

impl<L> LoaderOptions<L> {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }
}

/// Published state of a loader.
pub struct LayerState<L> {
    pub layer: Option<Arc<L>>,
    pub loading: bool,
    pub error: Option<AppError>,
}

impl<L> Clone for LayerState<L> {
    fn clone(&self) -> Self {
        Self {
            layer: self.layer.clone(),
            loading: self.loading,
            error: self.error.clone(),
        }
    }
}

impl<L> Default for LayerState<L> {
    fn default() -> Self {
        Self {
            layer: None,
            loading: false,
            error: None,
        }
    }
}

/// Defers layer construction and tracks its loading/error state.
///
/// `D` is the dependency value; a cycle runs only when it (or `enabled`) differs from
/// the previous call.
pub struct AsyncLayerLoader<L, D> {
    state: watch::Sender<LayerState<L>>,
    sequencer: RequestSequencer,
    yield_point: YieldPoint,
    last_key: Mutex<Option<(bool, D)>>,
}

impl<L, D> AsyncLayerLoader<L, D>
where
    L: Send + Sync + 'static,
    D: PartialEq + Clone,
{
    pub fn new(yield_point: YieldPoint) -> Self {
        let (state, _) = watch::channel(LayerState::default());
        Self {
            state,
            sequencer: RequestSequencer::new(),
            yield_point,
            last_key: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LayerState<L>> {
        self.state.subscribe()
    }

    /// Snapshot of the currently published state.
    pub fn state(&self) -> LayerState<L> {
        self.state.borrow().clone()
    }

    pub fn layer(&self) -> Option<Arc<L>> {
        self.state.borrow().layer.clone()
    }

    /// Runs a load cycle if `deps` or `options.enabled` changed since the last call.
    ///
    /// Returns whether a cycle ran. The factory is not invoked when nothing changed
    /// or when the loader is disabled.
    pub async fn update<F, Fut>(&self, deps: D, options: &LoaderOptions<L>, factory: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::error::Result<Option<L>>>,
    {
        let key = (options.enabled, deps);
        {
            let mut last = self.last_key.lock().unwrap_or_else(|e| e.into_inner());
            if last.as_ref() == Some(&key) {
                return false;
            }
            *last = Some(key);
        }
        self.load(options, factory).await;
        true
    }

    /// Runs a load cycle unconditionally.
    pub async fn load<F, Fut>(&self, options: &LoaderOptions<L>, factory: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::error::Result<Option<L>>>,
    {
        let ticket = self.sequencer.begin();

        if !options.enabled {
            self.state.send_replace(LayerState::default());
            return;
        }

        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        self.yield_point.wait().await;
        if !ticket.is_current() {
            debug!("Layer load {} superseded before construction", ticket.id());
            return;
        }

        let result = factory().await;
        if !ticket.is_current() {
            debug!("Discarding result of superseded layer load {}", ticket.id());
            return;
        }

        match result {
            Ok(layer) => {
                let layer = layer.map(Arc::new);
                if let Some(on_load) = &options.on_load {
                    on_load(layer.as_deref());
                }
                self.state.send_replace(LayerState {
                    layer,
                    loading: false,
                    error: None,
                });
            },
            Err(e) => {
                warn!("Layer factory failed: {}", e);
                if let Some(on_error) = &options.on_error {
                    on_error(&e);
                }
                self.state.send_replace(LayerState {
                    layer: None,
                    loading: false,
                    error: Some(e),
                });
            },
        }
    }
}
