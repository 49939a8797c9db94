//! Controller task.
//!
//! All transitions happen on this one task: commands from
//! [`JobController`](super::JobController) and results from transport calls
//! arrive on channels and are applied strictly one at a time. Transport
//! calls run on spawned tasks so the runner never blocks on the network.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::ControllerSettings;
use super::error::ControllerError;
use super::machine::{Machine, Reconciled};
use super::state::ControllerState;
use super::timer::PollTimer;
use super::types::{JobId, JobRequest, JobStatus};
use crate::observability::Metrics;
use crate::transport::{self, Transport, TransportError};

pub(crate) enum Command {
    Start {
        request: JobRequest,
        reply: oneshot::Sender<()>,
    },
    Cancel {
        reply: oneshot::Sender<Result<(), ControllerError>>,
    },
}

pub(crate) enum Event {
    Submitted {
        generation: u64,
        result: transport::Result<JobId>,
    },
    Polled {
        generation: u64,
        job_id: JobId,
        result: transport::Result<JobStatus>,
    },
    CancelSettled {
        generation: u64,
        job_id: JobId,
        result: transport::Result<()>,
    },
}

pub(crate) struct Runner {
    transport: Arc<dyn Transport>,
    settings: ControllerSettings,
    machine: Machine,
    timer: PollTimer,
    events: mpsc::UnboundedSender<Event>,
    state_tx: watch::Sender<ControllerState>,
    changes_tx: broadcast::Sender<ControllerState>,
    metrics: Arc<Metrics>,
}

impl Runner {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: ControllerSettings,
        timer: PollTimer,
        events: mpsc::UnboundedSender<Event>,
        state_tx: watch::Sender<ControllerState>,
        changes_tx: broadcast::Sender<ControllerState>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            transport,
            settings,
            machine: Machine::new(),
            timer,
            events,
            state_tx,
            changes_tx,
            metrics,
        }
    }

    /// Runs until every controller handle is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                // Commands first: a cancel queued next to a poll result must win.
                biased;

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        self.timer.cancel();
        debug!("Job controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { request, reply } => {
                self.timer.cancel();
                let started = self.machine.start();

                if started.abandoned {
                    self.metrics.job_abandoned();
                    info!(
                        abandoned_job = ?started.abandoned_job,
                        generation = started.generation,
                        "New job supersedes the running one; previous job is abandoned"
                    );
                }

                self.publish();
                let _ = reply.send(());

                info!(
                    generation = started.generation,
                    search_term = %request.search_term,
                    count = request.count,
                    "Submitting job"
                );
                self.spawn_submit(started.generation, request);
            }
            Command::Cancel { reply } => {
                let generation = self.machine.generation();
                match self.machine.cancel() {
                    Ok(job_id) => {
                        self.timer.cancel();
                        self.metrics.cancel();
                        info!(%job_id, generation, "Job cancelled locally");
                        self.publish();
                        let _ = reply.send(Ok(()));
                        self.spawn_cancel(generation, job_id);
                    }
                    Err(e) => {
                        debug!(phase = %self.machine.state().phase, "Cancel rejected: {}", e);
                        let _ = reply.send(Err(e));
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Submitted { generation, result } => {
                match self.machine.on_submitted(generation, result) {
                    Reconciled::Activated(job_id) => {
                        self.metrics.job_submitted();
                        info!(%job_id, generation, "Job accepted, polling for status");
                        self.arm_poll(generation, job_id);
                        self.publish();
                    }
                    Reconciled::Finished => {
                        self.metrics.submission_failed();
                        warn!(generation, error = ?self.last_error_message(), "Job submission failed");
                        self.publish();
                    }
                    Reconciled::Updated => self.publish(),
                    Reconciled::Ignored => {}
                }
            }
            Event::Polled {
                generation,
                job_id,
                result,
            } => match self.machine.on_polled(generation, &job_id, result) {
                Reconciled::Updated => {
                    self.metrics.poll();
                    if let Some(status) = &self.machine.state().last_status {
                        debug!(
                            %job_id,
                            state = %status.state,
                            progress_count = status.progress_count,
                            progress_total = status.progress_total,
                            "Job status updated"
                        );
                    }
                    self.publish();
                }
                Reconciled::Finished => {
                    self.timer.cancel();
                    if self.machine.state().last_error.is_some() {
                        self.metrics.poll_failed();
                        warn!(%job_id, error = ?self.last_error_message(), "Status poll failed; giving up on job");
                    } else {
                        self.metrics.poll();
                        self.metrics.job_finished();
                        let state = self.machine.state().last_status.as_ref().map(|s| s.state);
                        info!(%job_id, state = ?state, "Job reached terminal state");
                    }
                    self.publish();
                }
                Reconciled::Activated(_) | Reconciled::Ignored => {}
            },
            Event::CancelSettled {
                generation,
                job_id,
                result,
            } => {
                let outcome = result.clone();
                // Counters move only after the update is published.
                if matches!(
                    self.machine.on_cancel_settled(generation, result),
                    Reconciled::Updated
                ) {
                    self.publish();
                }

                match outcome {
                    Ok(()) => {
                        self.metrics.cancel_confirmed();
                        debug!(%job_id, "Remote cancel confirmed");
                    }
                    Err(e) => {
                        self.metrics.cancel_unconfirmed();
                        warn!(%job_id, error = %e, "Remote cancel not confirmed");
                    }
                }
            }
        }
    }

    fn spawn_submit(&self, generation: u64, request: JobRequest) {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let deadline = self.settings.call_timeout;

        tokio::spawn(async move {
            let result = with_deadline(deadline, transport.submit(&request)).await;
            let _ = events.send(Event::Submitted { generation, result });
        });
    }

    fn spawn_cancel(&self, generation: u64, job_id: JobId) {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let deadline = self.settings.call_timeout;

        tokio::spawn(async move {
            let result = with_deadline(deadline, transport.cancel(&job_id)).await;
            let _ = events.send(Event::CancelSettled {
                generation,
                job_id,
                result,
            });
        });
    }

    fn arm_poll(&mut self, generation: u64, job_id: JobId) {
        let task = poll_loop(
            Arc::clone(&self.transport),
            job_id,
            generation,
            self.settings.poll_interval,
            self.settings.call_timeout,
            self.events.clone(),
        );
        self.timer.arm(task);
    }

    fn last_error_message(&self) -> Option<String> {
        self.machine
            .state()
            .last_error
            .as_ref()
            .map(|e| e.message.clone())
    }

    fn publish(&self) {
        let state = self.machine.state().clone();
        debug_assert!(state.holds_invariants(), "invariant violated: {state:?}");
        debug!(phase = %state.phase, job_id = ?state.current_job, "Controller state changed");

        self.state_tx.send_replace(state.clone());
        // No subscribers is fine
        let _ = self.changes_tx.send(state);
    }
}

/// Polls one job every `interval`, starting one interval after arming.
///
/// The fetch runs inside the timer task, so tearing the timer down also
/// drops any request still in flight.
async fn poll_loop(
    transport: Arc<dyn Transport>,
    job_id: JobId,
    generation: u64,
    interval: Duration,
    deadline: Option<Duration>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let result = with_deadline(deadline, transport.fetch_status(&job_id)).await;
        let event = Event::Polled {
            generation,
            job_id: job_id.clone(),
            result,
        };
        if events.send(event).is_err() {
            break;
        }
    }
}

async fn with_deadline<T, F>(deadline: Option<Duration>, call: F) -> transport::Result<T>
where
    F: Future<Output = transport::Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(TransportError::Timeout)),
        None => call.await,
    }
}
