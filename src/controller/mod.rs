//! Job lifecycle controller
//!
//! Drives one remote job at a time from submission through periodic status
//! polling to a terminal state. A [`JobController`] is a cheap, cloneable
//! handle; the actual state lives on a background task that applies
//! commands and transport results in order.
//!
//! ```no_run
//! use std::sync::Arc;
//! use jobwatch::controller::{ControllerSettings, JobController, JobRequest};
//! use jobwatch::transport::{HttpConfig, HttpTransport};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new("http://127.0.0.1:8080", HttpConfig::default())?;
//! let controller = JobController::spawn(Arc::new(transport), ControllerSettings::default());
//!
//! controller.start(JobRequest::new("rust async", 10)).await?;
//! let mut state = controller.watch();
//! while !state.borrow_and_update().is_terminal() {
//!     state.changed().await?;
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod machine;
mod runner;
mod state;
mod timer;
mod types;
mod validation;

pub use error::{ControllerError, ErrorInfo, ErrorKind};
pub use state::{ControllerState, Phase};
pub use types::{JobId, JobRequest, JobState, JobStatus, MAX_COUNT, MIN_COUNT};
pub use validation::{RequestValidationError, validate_request};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::warn;

use crate::observability::{Metrics, MetricsSnapshot};
use crate::transport::Transport;
use runner::{Command, Runner};
use timer::PollTimer;

const COMMAND_BUFFER: usize = 32;

/// Shortest poll interval the controller will run with
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runtime knobs for a [`JobController`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Delay between status polls; the first poll happens one interval
    /// after the job is accepted.
    pub poll_interval: Duration,
    /// Deadline applied to each transport call. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Capacity of the per-transition broadcast channel.
    pub event_buffer: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            call_timeout: Some(Duration::from_secs(60)),
            event_buffer: 64,
        }
    }
}

impl ControllerSettings {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// Handle to a running job controller.
///
/// Clones share the same controller. The background task stops once the
/// last handle is dropped, tearing down any pending poll.
#[derive(Clone)]
pub struct JobController {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ControllerState>,
    changes_tx: broadcast::Sender<ControllerState>,
    live_timers: Arc<AtomicUsize>,
    metrics: Arc<Metrics>,
}

impl JobController {
    /// Spawn the controller task on the current Tokio runtime.
    ///
    /// A poll interval below [`MIN_POLL_INTERVAL`] is raised to it.
    pub fn spawn(transport: Arc<dyn Transport>, mut settings: ControllerSettings) -> Self {
        if settings.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                requested = ?settings.poll_interval,
                "Poll interval too short, using {:?}",
                MIN_POLL_INTERVAL
            );
            settings.poll_interval = MIN_POLL_INTERVAL;
        }

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ControllerState::idle());
        let (changes_tx, _) = broadcast::channel(settings.event_buffer.max(1));
        let live_timers = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(Metrics::new());

        let runner = Runner::new(
            transport,
            settings,
            PollTimer::new(Arc::clone(&live_timers)),
            events_tx,
            state_tx,
            changes_tx.clone(),
            Arc::clone(&metrics),
        );
        tokio::spawn(runner.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            state_rx,
            changes_tx,
            live_timers,
            metrics,
        }
    }

    /// Submit a new job.
    ///
    /// An invalid request is rejected here and leaves the controller
    /// untouched. Otherwise any job already being tracked is abandoned
    /// (polling stops, no remote cancel is sent) and the controller enters
    /// `submitting` before this returns. Submission outcome is reported
    /// through state, not through this result.
    pub async fn start(&self, request: JobRequest) -> Result<(), ControllerError> {
        validate_request(&request)?;

        let (reply, accepted) = oneshot::channel();
        self.commands
            .send(Command::Start { request, reply })
            .await
            .map_err(|_| ControllerError::Closed)?;
        accepted.await.map_err(|_| ControllerError::Closed)
    }

    /// Cancel the running job.
    ///
    /// On success the controller is already terminal with a `cancelled`
    /// status; the remote cancel request is still in flight and only
    /// records `CancelUnconfirmed` if it fails. Returns
    /// [`ControllerError::NotCancellable`] when there is no accepted job.
    pub async fn cancel(&self) -> Result<(), ControllerError> {
        let (reply, settled) = oneshot::channel();
        self.commands
            .send(Command::Cancel { reply })
            .await
            .map_err(|_| ControllerError::Closed)?;
        settled.await.map_err(|_| ControllerError::Closed)?
    }

    /// Latest published state
    pub fn state(&self) -> ControllerState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that always holds the latest state. Intermediate states may
    /// be skipped; use [`JobController::subscribe`] to see every transition.
    pub fn watch(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    /// Every transition published after this call, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerState> {
        self.changes_tx.subscribe()
    }

    /// Number of armed poll timers (0 or 1)
    pub fn live_timers(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("state", &*self.state_rx.borrow())
            .field("live_timers", &self.live_timers())
            .finish()
    }
}
