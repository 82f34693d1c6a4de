//! Yield points used to defer expensive work past the current pass.

use tracing::debug;

/// How deferred work gives way to other ready work before running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldPoint {
    /// Yield to the scheduler so every other ready task runs first.
    Idle,
    /// Continue immediately, for environments without a cooperative scheduler.
    Immediate,
}

impl YieldPoint {
    /// Picks the strategy supported by the current environment.
    ///
    /// `Idle` inside a Tokio runtime, `Immediate` otherwise.
    pub fn detect() -> Self {
        let strategy = if tokio::runtime::Handle::try_current().is_ok() {
            YieldPoint::Idle
        } else {
            YieldPoint::Immediate
        };
        debug!("Selected yield strategy: {:?}", strategy);
        strategy
    }

    pub async fn wait(self) {
        match self {
            YieldPoint::Idle => tokio::task::yield_now().await,
            YieldPoint::Immediate => {},
        }
    }
}

impl Default for YieldPoint {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn detect_without_runtime_is_immediate() {
        assert_eq!(YieldPoint::detect(), YieldPoint::Immediate);
    }

    #[tokio::test]
    async fn detect_inside_runtime_is_idle() {
        assert_eq!(YieldPoint::detect(), YieldPoint::Idle);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn idle_lets_ready_tasks_run_first() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        tokio::spawn(async move {
            flag.store(true, Ordering::SeqCst);
        });
        YieldPoint::Idle.wait().await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
