//! GPU capability probe.
//!
//! Before the map renderer is mounted the dashboard asks its rendering surface for a
//! context (WebGL2 first, then WebGL1) created with conservative options, and checks
//! that the context answers two parameter queries. `wait_for_support` repeats the
//! probe at a fixed interval until it succeeds or the wait budget is spent.

use crate::error::{AppError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    WebGl2,
    WebGl,
}

impl ContextKind {
    /// Order in which context kinds are attempted.
    pub const PREFERENCE: [ContextKind; 2] = [ContextKind::WebGl2, ContextKind::WebGl];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::WebGl2 => "webgl2",
            ContextKind::WebGl => "webgl",
        }
    }
}

/// Context creation attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub antialias: bool,
    pub depth: bool,
    pub stencil: bool,
    pub alpha: bool,
    pub preserve_drawing_buffer: bool,
    pub fail_if_major_performance_caveat: bool,
}

impl ContextOptions {
    /// Everything off: the cheapest context a driver can hand out.
    pub const CONSERVATIVE: ContextOptions = ContextOptions {
        antialias: false,
        depth: false,
        stencil: false,
        alpha: false,
        preserve_drawing_buffer: false,
        fail_if_major_performance_caveat: false,
    };
}

/// A live rendering context that can be queried for its limits.
pub trait GpuContext {
    fn max_texture_size(&self) -> std::result::Result<u32, String>;
    fn max_viewport_dims(&self) -> std::result::Result<[u32; 2], String>;
}

/// Something that can hand out rendering contexts (a canvas, a window, a headless
/// device).
pub trait RenderSurface {
    type Context: GpuContext;

    /// `Ok(None)` when this kind of context is not available on the surface.
    fn create_context(
        &self,
        kind: ContextKind,
        options: &ContextOptions,
    ) -> std::result::Result<Option<Self::Context>, String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeResult {
    pub supported: bool,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn supported() -> Self {
        Self {
            supported: true,
            error: None,
        }
    }

    pub fn unsupported(error: impl Into<String>) -> Self {
        Self {
            supported: false,
            error: Some(error.into()),
        }
    }

    /// Converts an unsupported result into `AppError::Capability`.
    pub fn into_result(self) -> Result<()> {
        if self.supported {
            Ok(())
        } else {
            Err(AppError::Capability(
                self.error.unwrap_or_else(|| "WebGL not available".to_string()),
            ))
        }
    }
}

/// Probes `surface` once.
pub fn check_support<S: RenderSurface>(surface: &S) -> ProbeResult {
    let options = ContextOptions::CONSERVATIVE;
    let mut context = None;
    for kind in ContextKind::PREFERENCE {
        match surface.create_context(kind, &options) {
            Ok(Some(ctx)) => {
                debug!("Acquired {} context", kind.as_str());
                context = Some(ctx);
                break;
            },
            Ok(None) => debug!("{} context unavailable", kind.as_str()),
            Err(e) => return ProbeResult::unsupported(format!("WebGL check failed: {}", e)),
        }
    }

    let Some(context) = context else {
        return ProbeResult::unsupported("WebGL not available");
    };

    let limits = context
        .max_texture_size()
        .and_then(|size| context.max_viewport_dims().map(|dims| (size, dims)));
    match limits {
        Ok((0, _)) | Ok((_, [0, _])) | Ok((_, [_, 0])) => {
            ProbeResult::unsupported("WebGL context incomplete")
        },
        Ok((size, dims)) => {
            debug!("Context limits: texture {} viewport {:?}", size, dims);
            ProbeResult::supported()
        },
        Err(e) => ProbeResult::unsupported(format!("WebGL context error: {}", e)),
    }
}

/// Re-probes every `interval` until supported or until `max_wait` has elapsed, and
/// returns the last result.
///
/// The final attempt happens at `max_wait` at the latest, so an unsupported surface
/// resolves no later than the budget plus the cost of one probe.
pub async fn wait_for_support<S: RenderSurface>(
    surface: &S,
    max_wait: Duration,
    interval: Duration,
) -> ProbeResult {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let result = check_support(surface);
        if result.supported {
            info!("Rendering surface ready after {} probe(s)", attempts);
            return result;
        }

        let elapsed = started.elapsed();
        if elapsed >= max_wait {
            warn!(
                "Rendering surface unsupported after {} probe(s): {}",
                attempts,
                result.error.as_deref().unwrap_or("unknown")
            );
            return result;
        }
        tokio::time::sleep(interval.min(max_wait - elapsed)).await;
    }
}

/// Surface used by the terminal front-end, which renders no pixels itself.
///
/// It reports fixed limits, or no context at all when built with `unavailable()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessSurface {
    available: bool,
    max_texture_size: u32,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self {
            available: true,
            max_texture_size: 4096,
        }
    }
}

impl HeadlessSurface {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeadlessContext {
    max_texture_size: u32,
}

impl GpuContext for HeadlessContext {
    fn max_texture_size(&self) -> std::result::Result<u32, String> {
        Ok(self.max_texture_size)
    }

    fn max_viewport_dims(&self) -> std::result::Result<[u32; 2], String> {
        Ok([self.max_texture_size, self.max_texture_size])
    }
}

impl RenderSurface for HeadlessSurface {
    type Context = HeadlessContext;

    fn create_context(
        &self,
        _kind: ContextKind,
        _options: &ContextOptions,
    ) -> std::result::Result<Option<HeadlessContext>, String> {
        Ok(self.available.then_some(HeadlessContext {
            max_texture_size: self.max_texture_size,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeContext {
        texture: std::result::Result<u32, String>,
        viewport: [u32; 2],
    }

    impl GpuContext for FakeContext {
        fn max_texture_size(&self) -> std::result::Result<u32, String> {
            self.texture.clone()
        }

        fn max_viewport_dims(&self) -> std::result::Result<[u32; 2], String> {
            Ok(self.viewport)
        }
    }

    /// Only offers WebGL1, and only once `ready_after` probes have failed.
    struct FlakySurface {
        ready_after: u32,
        calls: Cell<u32>,
        requested: RefCell<Vec<(ContextKind, ContextOptions)>>,
    }

    impl FlakySurface {
        fn new(ready_after: u32) -> Self {
            Self {
                ready_after,
                calls: Cell::new(0),
                requested: RefCell::new(Vec::new()),
            }
        }

        fn probes(&self) -> u32 {
            self.calls.get()
        }
    }

    impl RenderSurface for FlakySurface {
        type Context = FakeContext;

        fn create_context(
            &self,
            kind: ContextKind,
            options: &ContextOptions,
        ) -> std::result::Result<Option<FakeContext>, String> {
            self.requested.borrow_mut().push((kind, *options));
            if kind == ContextKind::WebGl2 {
                return Ok(None);
            }
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() > self.ready_after {
                Ok(Some(FakeContext {
                    texture: Ok(8192),
                    viewport: [8192, 8192],
                }))
            } else {
                Ok(None)
            }
        }
    }

    struct FixedSurface(fn() -> std::result::Result<Option<FakeContext>, String>);

    impl RenderSurface for FixedSurface {
        type Context = FakeContext;

        fn create_context(
            &self,
            _kind: ContextKind,
            _options: &ContextOptions,
        ) -> std::result::Result<Option<FakeContext>, String> {
            (self.0)()
        }
    }

    #[test]
    fn prefers_webgl2_then_falls_back_with_conservative_options() {
        let surface = FlakySurface::new(0);
        assert!(check_support(&surface).supported);
        let requested = surface.requested.borrow();
        assert_eq!(requested[0].0, ContextKind::WebGl2);
        assert_eq!(requested[1].0, ContextKind::WebGl);
        assert!(requested.iter().all(|(_, o)| *o == ContextOptions::CONSERVATIVE));
    }

    #[test]
    fn probe_failure_messages() {
        let missing = FixedSurface(|| Ok(None));
        assert_eq!(check_support(&missing).error.as_deref(), Some("WebGL not available"));

        let incomplete = FixedSurface(|| {
            Ok(Some(FakeContext {
                texture: Ok(0),
                viewport: [1024, 1024],
            }))
        });
        assert_eq!(check_support(&incomplete).error.as_deref(), Some("WebGL context incomplete"));

        let lost = FixedSurface(|| {
            Ok(Some(FakeContext {
                texture: Err("context lost".to_string()),
                viewport: [1024, 1024],
            }))
        });
        assert_eq!(
            check_support(&lost).error.as_deref(),
            Some("WebGL context error: context lost")
        );

        let broken = FixedSurface(|| Err("no canvas".to_string()));
        let result = check_support(&broken);
        assert!(!result.supported);
        assert_eq!(result.error.as_deref(), Some("WebGL check failed: no canvas"));
        assert!(matches!(result.into_result(), Err(AppError::Capability(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_surface_resolves_within_the_wait_budget() {
        let surface = FlakySurface::new(u32::MAX);
        let started = Instant::now();
        let result = wait_for_support(
            &surface,
            Duration::from_millis(2000),
            Duration::from_millis(100),
        )
        .await;

        assert!(!result.supported);
        assert_eq!(result.error.as_deref(), Some("WebGL not available"));
        assert!(started.elapsed() < Duration::from_millis(2050));
        // one probe at t=0 and one every 100 ms up to and including t=2000
        assert_eq!(surface.probes(), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn surface_that_recovers_is_reported_supported() {
        let surface = FlakySurface::new(3);
        let started = Instant::now();
        let result = wait_for_support(
            &surface,
            Duration::from_millis(2000),
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, ProbeResult::supported());
        assert_eq!(surface.probes(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(400));
    }

    #[test]
    fn headless_surface() {
        assert!(check_support(&HeadlessSurface::default()).supported);
        assert!(!check_support(&HeadlessSurface::unavailable()).supported);
    }
}
