//! Owned, cancellable handle for the polling task.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinHandle;

/// At most one scheduled task per timer. Arming replaces (and aborts) the
/// previous task; cancelling is idempotent; dropping the timer cancels it.
#[derive(Debug)]
pub(crate) struct PollTimer {
    handle: Option<JoinHandle<()>>,
    live: Arc<AtomicUsize>,
}

impl PollTimer {
    /// `live` counts armed timers and is shared with the controller handle.
    pub fn new(live: Arc<AtomicUsize>) -> Self {
        Self { handle: None, live }
    }

    pub fn arm<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(task));
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns whether a task was actually torn down.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                self.live.fetch_sub(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    fn ticking(counter: Arc<AtomicU64>) -> impl Future<Output = ()> + Send + 'static {
        async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_replaces_previous_task() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut timer = PollTimer::new(live.clone());
        let first = Arc::new(AtomicU64::new(0));
        let second = Arc::new(AtomicU64::new(0));

        timer.arm(ticking(first.clone()));
        tokio::time::sleep(Duration::from_millis(35)).await;
        let first_ticks = first.load(Ordering::SeqCst);
        assert!(first_ticks >= 3);

        timer.arm(ticking(second.clone()));
        assert_eq!(live.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(first.load(Ordering::SeqCst), first_ticks);
        assert!(second.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut timer = PollTimer::new(live.clone());
        let counter = Arc::new(AtomicU64::new(0));

        assert!(!timer.cancel());
        timer.arm(ticking(counter.clone()));
        assert!(timer.is_armed());

        assert!(timer.cancel());
        assert!(!timer.cancel());
        assert!(!timer.is_armed());
        assert_eq!(live.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down_task() {
        let live = Arc::new(AtomicUsize::new(0));
        let counter = Arc::new(AtomicU64::new(0));
        {
            let mut timer = PollTimer::new(live.clone());
            timer.arm(ticking(counter.clone()));
            assert_eq!(live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
