//! Self-rescheduling publication timers.
//!
//! Each publishing model owns one scheduler slot. A tick runs the publish
//! callback to completion before the next delay is armed, so the gap between
//! publications is the configured period plus however long the callback took.
use crate::interface::ServiceError;
use crate::mesh::{ElementIndex, ModelId};
use crate::models::ModelError;
use core::time::Duration;
use futures_util::future::BoxFuture;
use slog::{debug, warn, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Error produced by one publication tick. Ticks never stop the timer; the
/// error is logged and the next delay is armed regardless.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publishing element {0} no longer registered")]
    UnknownElement(ElementIndex),
    #[error("publishing model {0} no longer registered")]
    UnknownModel(ModelId),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// One publication timer. At most one task is armed at a time: starting an
/// armed (or mid-callback) scheduler is a no-op, so restart requires an
/// explicit [`PublicationScheduler::cancel`] first.
pub struct PublicationScheduler {
    log: Logger,
    task: Option<JoinHandle<()>>,
    busy: Arc<AtomicBool>,
}
impl PublicationScheduler {
    #[must_use]
    pub fn new(log: Logger) -> PublicationScheduler {
        PublicationScheduler {
            log,
            task: None,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }
    /// Arms the timer. `callback` runs once per tick, after each full
    /// `period` delay. No-op while a timer is armed or a callback runs.
    pub fn start<F>(&mut self, period: Duration, mut callback: F)
    where
        F: FnMut() -> BoxFuture<'static, Result<(), PublishError>> + Send + 'static,
    {
        if self.is_armed() || self.busy.load(Ordering::SeqCst) {
            debug!(self.log, "publication timer already armed");
            return;
        }
        let busy = self.busy.clone();
        let log = self.log.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                busy.store(true, Ordering::SeqCst);
                if let Err(err) = callback().await {
                    warn!(log, "publication tick failed"; "error" => %err);
                }
                busy.store(false, Ordering::SeqCst);
            }
        }));
    }
    /// Disarms the timer. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.busy.store(false, Ordering::SeqCst);
    }
    #[must_use]
    pub fn is_armed(&self) -> bool {
        match &self.task {
            Some(task) => !task.is_finished(),
            None => false,
        }
    }
}
impl Drop for PublicationScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use slog::o;
    use std::sync::atomic::AtomicUsize;

    fn log() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn counting_callback(
        ticks: Arc<AtomicUsize>,
    ) -> impl FnMut() -> BoxFuture<'static, Result<(), PublishError>> + Send + 'static {
        move || {
            let ticks = ticks.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_double_start_arms_one_timer() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PublicationScheduler::new(log());
        scheduler.start(Duration::from_millis(20), counting_callback(ticks.clone()));
        assert!(scheduler.is_armed());
        // A second start while armed must not add a second task.
        scheduler.start(Duration::from_millis(1), counting_callback(ticks.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let counted = ticks.load(Ordering::SeqCst);
        assert!(counted >= 1 && counted <= 3, "ticks: {}", counted);
    }

    #[tokio::test]
    async fn test_cancel_stops_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PublicationScheduler::new(log());
        scheduler.start(Duration::from_millis(10), counting_callback(ticks.clone()));
        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.cancel();
        assert!(!scheduler.is_armed());
        let at_cancel = ticks.load(Ordering::SeqCst);
        assert!(at_cancel >= 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), at_cancel);
        // Cancelling again is fine.
        scheduler.cancel();
    }

    #[tokio::test]
    async fn test_failing_tick_keeps_timer_running() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = PublicationScheduler::new(log());
        let counter = ticks.clone();
        scheduler.start(Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PublishError::UnknownModel(ModelId(0x0001)))
            }
            .boxed()
        });
        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);
        assert!(scheduler.is_armed());
    }
}
