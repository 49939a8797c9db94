//! Terminal front end for the controller: drives one job from the command
//! line and renders each state change.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::cli::{JobArgs, RunArgs};
use jobwatch::config::{Config, HumanDuration, ValidationError};
use jobwatch::controller::{
    ControllerError, ControllerSettings, ControllerState, ErrorInfo, ErrorKind, JobController,
    JobId, JobRequest, JobState, JobStatus, Phase,
};
use jobwatch::transport::{HttpTransport, Transport, TransportError};

/// Upper bound on waiting for the remote cancel request before exiting
const CANCEL_SETTLE_GRACE: Duration = Duration::from_secs(10);

const CANCEL_SETTLE_CHECK: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    InvalidOption(#[from] ValidationError),

    #[error("job {job} finished as {outcome}: {message}")]
    JobUnsuccessful {
        job: String,
        outcome: String,
        message: String,
    },

    #[error("controller stopped before the job finished")]
    Interrupted,
}

/// Submit a job and follow it until it reaches a terminal state.
///
/// Ctrl+C (or SIGTERM) cancels the job. A cancel requested before the job
/// is accepted is deferred until the service assigns an id.
pub async fn run_job(config: &Config, args: RunArgs) -> Result<(), SessionError> {
    let settings = controller_settings(config, args.poll_interval)?;

    let transport = HttpTransport::from_config(config)?;
    info!(base_url = %transport.base_url(), "Using job service");

    let controller = JobController::spawn(Arc::new(transport), settings);
    let mut changes = controller.subscribe();
    controller
        .start(JobRequest::new(args.search_term, args.count))
        .await?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut shutdown_seen = false;
    let mut cancel_pending = false;
    let mut cancelled_by_user = false;
    let mut job_id: Option<JobId> = None;

    let last = loop {
        tokio::select! {
            _ = &mut shutdown, if !shutdown_seen => {
                shutdown_seen = true;
                match controller.cancel().await {
                    Ok(()) => cancelled_by_user = true,
                    Err(e) if e.kind() == Some(ErrorKind::NotCancellable) => {
                        warn!("Job not accepted yet; cancelling once it is");
                        cancel_pending = true;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            received = changes.recv() => {
                let state = match received {
                    Ok(state) => state,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed state updates; showing latest");
                        controller.state()
                    }
                    Err(RecvError::Closed) => return Err(SessionError::Interrupted),
                };

                print_state(&state, args.json);
                if let Some(id) = &state.current_job {
                    job_id = Some(id.clone());
                }

                if cancel_pending && state.phase == Phase::Active {
                    cancel_pending = false;
                    cancelled_by_user = controller.cancel().await.is_ok();
                }

                if !state.phase.is_running() {
                    break state;
                }
            }
        }
    };

    let last = if cancelled_by_user {
        settle_cancel(&controller, &mut changes, args.json)
            .await
            .unwrap_or(last)
    } else {
        last
    };

    outcome(job_id.as_ref(), &last)
}

/// Controller settings from config, with the `--poll-interval` override
/// held to the same rules as the config file.
fn controller_settings(
    config: &Config,
    poll_interval: Option<HumanDuration>,
) -> Result<ControllerSettings, SessionError> {
    let settings = config.controller_settings();
    match poll_interval {
        Some(interval) if interval.is_zero() => Err(ValidationError::ZeroDuration {
            field: "--poll-interval",
        }
        .into()),
        Some(interval) => Ok(settings.with_poll_interval(interval.as_duration())),
        None => Ok(settings),
    }
}

/// Print the latest status of a job once.
pub async fn show_status(config: &Config, args: JobArgs) -> Result<(), SessionError> {
    let transport = HttpTransport::from_config(config)?;
    let job_id = JobId::new(args.job_id);
    let status = transport.fetch_status(&job_id).await?;

    if args.json {
        println!("{}", to_json(&StatusView::new(&job_id, &status)));
    } else {
        println!("{}", render_status(&job_id, &status));
    }
    Ok(())
}

/// Send a cancel request for a job, independent of any controller.
pub async fn cancel_job(config: &Config, args: JobArgs) -> Result<(), SessionError> {
    let transport = HttpTransport::from_config(config)?;
    let job_id = JobId::new(args.job_id);
    transport.cancel(&job_id).await?;

    if args.json {
        println!("{}", serde_json::json!({ "job_id": job_id, "cancel_requested": true }));
    } else {
        println!("cancel requested for job {}", job_id);
    }
    Ok(())
}

/// A local cancel publishes a terminal state right away while the remote
/// request is still in flight. Wait for it so the process does not exit
/// first; a failure arrives as one more update carrying `CancelUnconfirmed`.
async fn settle_cancel(
    controller: &JobController,
    changes: &mut broadcast::Receiver<ControllerState>,
    json: bool,
) -> Option<ControllerState> {
    let deadline = tokio::time::sleep(CANCEL_SETTLE_GRACE);
    tokio::pin!(deadline);
    let mut check = tokio::time::interval(CANCEL_SETTLE_CHECK);
    let mut latest = None;

    loop {
        tokio::select! {
            biased;

            Ok(state) = changes.recv() => {
                print_state(&state, json);
                latest = Some(state);
            }
            _ = check.tick() => {
                if controller.metrics().cancels_in_flight() == 0 {
                    break;
                }
            }
            _ = &mut deadline => {
                warn!("Gave up waiting for the remote cancel to answer");
                break;
            }
        }
    }

    // Updates are published before the cancel counters move
    while let Ok(state) = changes.try_recv() {
        print_state(&state, json);
        latest = Some(state);
    }

    latest
}

fn outcome(job_id: Option<&JobId>, state: &ControllerState) -> Result<(), SessionError> {
    let job = job_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());

    match (&state.last_status, &state.last_error) {
        (Some(status), _) if status.state == JobState::Completed => Ok(()),
        (Some(status), error)
            if status.state == JobState::Cancelled
                && error.as_ref().is_none_or(|e| !e.kind.is_fatal()) =>
        {
            if let Some(error) = error {
                warn!(kind = %error.kind, "{}", error.message);
            }
            Ok(())
        }
        (status, error) => Err(SessionError::JobUnsuccessful {
            job,
            outcome: status
                .as_ref()
                .map(|s| s.state.to_string())
                .unwrap_or_else(|| "failed".to_string()),
            message: error
                .as_ref()
                .map(ErrorInfo::to_string)
                .unwrap_or_else(|| "no details".to_string()),
        }),
    }
}

fn print_state(state: &ControllerState, json: bool) {
    if json {
        println!("{}", to_json(state));
    } else {
        println!("{}", render_state(state));
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

/// One-line text rendering of a controller state
pub fn render_state(state: &ControllerState) -> String {
    let mut line = format!("[{}]", state.phase);

    if let Some(job_id) = &state.current_job {
        line.push_str(&format!(" job={}", job_id));
    }

    if let Some(status) = &state.last_status {
        line.push_str(&format!(" {}", describe_status(status)));
    }

    if let Some(error) = &state.last_error {
        line.push_str(&format!(" error={}", error));
    }

    line
}

fn render_status(job_id: &JobId, status: &JobStatus) -> String {
    format!("job={} {}", job_id, describe_status(status))
}

fn describe_status(status: &JobStatus) -> String {
    let mut text = format!(
        "state={} progress={}/{} ({:.0}%)",
        status.state,
        status.progress_count,
        status.progress_total,
        status.progress() * 100.0
    );
    if let Some(location) = &status.result_location {
        text.push_str(&format!(" result={}", location));
    }
    text
}

#[derive(Serialize)]
struct StatusView<'a> {
    job_id: &'a JobId,
    #[serde(flatten)]
    status: &'a JobStatus,
    progress: f64,
}

impl<'a> StatusView<'a> {
    fn new(job_id: &'a JobId, status: &'a JobStatus) -> Self {
        Self {
            job_id,
            status,
            progress: status.progress(),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, cancelling job");
}
