//! Controller behaviour against a scripted transport
//!
//! All tests run with Tokio's clock paused, so poll intervals and call
//! delays advance instantly and deterministically.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use jobwatch::controller::{
    ControllerError, ControllerSettings, ControllerState, ErrorKind, JobController, JobId,
    JobRequest, JobState, JobStatus, Phase, RequestValidationError,
};
use jobwatch::transport::{self, Transport, TransportError};

type Step<T> = (Duration, transport::Result<T>);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Submit(String),
    Fetch(String),
    Cancel(String),
}

/// Transport that replays queued results, optionally after a delay
#[derive(Default)]
struct ScriptedTransport {
    submits: Mutex<VecDeque<Step<JobId>>>,
    statuses: Mutex<HashMap<String, VecDeque<Step<JobStatus>>>>,
    cancels: Mutex<VecDeque<Step<()>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn on_submit(&self, delay: Duration, result: transport::Result<JobId>) -> &Self {
        self.submits.lock().unwrap().push_back((delay, result));
        self
    }

    fn accept(&self, job_id: &str) -> &Self {
        self.on_submit(Duration::ZERO, Ok(JobId::new(job_id)))
    }

    fn on_fetch(
        &self,
        job_id: &str,
        delay: Duration,
        result: transport::Result<JobStatus>,
    ) -> &Self {
        self.statuses
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push_back((delay, result));
        self
    }

    fn report(&self, job_id: &str, status: JobStatus) -> &Self {
        self.on_fetch(job_id, Duration::ZERO, Ok(status))
    }

    fn on_cancel(&self, delay: Duration, result: transport::Result<()>) -> &Self {
        self.cancels.lock().unwrap().push_back((delay, result));
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn fetches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Fetch(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

async fn play<T>((delay, result): Step<T>) -> transport::Result<T> {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    result
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(&self, request: &JobRequest) -> transport::Result<JobId> {
        self.record(Call::Submit(request.search_term.clone()));
        let step = self.submits.lock().unwrap().pop_front();
        play(step.unwrap_or((
            Duration::ZERO,
            Err(TransportError::RequestFailed("unscripted submit".into())),
        )))
        .await
    }

    async fn fetch_status(&self, job_id: &JobId) -> transport::Result<JobStatus> {
        self.record(Call::Fetch(job_id.to_string()));
        let step = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(job_id.as_str())
            .and_then(VecDeque::pop_front);
        play(step.unwrap_or((Duration::ZERO, Ok(JobStatus::running(0, 0))))).await
    }

    async fn cancel(&self, job_id: &JobId) -> transport::Result<()> {
        self.record(Call::Cancel(job_id.to_string()));
        let step = self.cancels.lock().unwrap().pop_front();
        play(step.unwrap_or((Duration::ZERO, Ok(())))).await
    }
}

fn spawn(transport: &Arc<ScriptedTransport>) -> JobController {
    spawn_with(transport, ControllerSettings::default())
}

fn spawn_with(transport: &Arc<ScriptedTransport>, settings: ControllerSettings) -> JobController {
    let transport: Arc<dyn Transport> = transport.clone();
    JobController::spawn(transport, settings)
}

fn cats() -> JobRequest {
    JobRequest::new("cats", 10)
}

async fn wait_for<F>(controller: &JobController, predicate: F) -> ControllerState
where
    F: Fn(&ControllerState) -> bool,
{
    let mut rx = controller.watch();
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            {
                let state = rx.borrow_and_update();
                if predicate(&*state) {
                    return state.clone();
                }
            }
            rx.changed().await.expect("controller stopped");
        }
    })
    .await
    .expect("state never reached")
}

fn drain(changes: &mut broadcast::Receiver<ControllerState>) -> Vec<ControllerState> {
    let mut seen = Vec::new();
    while let Ok(state) = changes.try_recv() {
        seen.push(state);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn test_job_runs_to_completion() {
    let transport = ScriptedTransport::new();
    transport
        .accept("J1")
        .report("J1", JobStatus::running(3, 10))
        .report(
            "J1",
            JobStatus::new(JobState::Completed, 10, 10, Some("/out/J1".into())),
        );

    let controller = spawn(&transport);
    let mut changes = controller.subscribe();
    controller.start(cats()).await.unwrap();

    let running = wait_for(&controller, |s| s.last_status.is_some()).await;
    assert_eq!(running.phase, Phase::Active);
    assert_eq!(running.current_job, Some(JobId::new("J1")));
    assert_eq!(running.progress(), Some(0.3));

    let done = wait_for(&controller, ControllerState::is_terminal).await;
    let status = done.last_status.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.result_location.as_deref(), Some("/out/J1"));
    assert!(done.last_error.is_none());
    assert_eq!(controller.live_timers(), 0);

    let phases: Vec<Phase> = drain(&mut changes).iter().map(|s| s.phase).collect();
    assert_eq!(
        phases,
        vec![Phase::Submitting, Phase::Active, Phase::Active, Phase::Terminal]
    );

    assert_eq!(
        transport.calls(),
        vec![
            Call::Submit("cats".into()),
            Call::Fetch("J1".into()),
            Call::Fetch("J1".into()),
        ]
    );

    let metrics = controller.metrics();
    assert_eq!(metrics.jobs_submitted, 1);
    assert_eq!(metrics.polls, 2);
    assert_eq!(metrics.jobs_finished, 1);
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_waits_one_interval() {
    let transport = ScriptedTransport::new();
    transport.accept("J1");

    let settings = ControllerSettings::default().with_poll_interval(Duration::from_secs(5));
    let controller = spawn_with(&transport, settings);
    controller.start(cats()).await.unwrap();
    wait_for(&controller, |s| s.phase == Phase::Active).await;

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(transport.fetches(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.fetches(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_first_poll() {
    let transport = ScriptedTransport::new();
    transport.accept("J1");

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();
    wait_for(&controller, |s| s.phase == Phase::Active).await;

    controller.cancel().await.unwrap();

    let state = controller.state();
    assert_eq!(state.phase, Phase::Terminal);
    assert_eq!(state.last_status.as_ref().map(|s| s.state), Some(JobState::Cancelled));
    assert_eq!(controller.live_timers(), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.fetches(), 0);
    assert!(transport.calls().contains(&Call::Cancel("J1".into())));
    assert_eq!(controller.state().phase, Phase::Terminal);
    assert!(controller.state().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_makes_no_calls() {
    let transport = ScriptedTransport::new();
    let controller = spawn(&transport);

    let err = controller.start(JobRequest::new("", 10)).await.unwrap_err();
    assert_eq!(
        err,
        ControllerError::InvalidRequest(RequestValidationError::EmptySearchTerm)
    );
    assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));

    for count in [0, 51] {
        let err = controller.start(JobRequest::new("cats", count)).await.unwrap_err();
        assert_eq!(
            err,
            ControllerError::InvalidRequest(RequestValidationError::CountOutOfRange(count))
        );
    }

    tokio::task::yield_now().await;
    assert!(transport.calls().is_empty());
    assert_eq!(controller.state().phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_stops_polling() {
    let transport = ScriptedTransport::new();
    transport.accept("J1").on_fetch(
        "J1",
        Duration::ZERO,
        Err(TransportError::RequestFailed("connection reset".into())),
    );

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();

    let state = wait_for(&controller, ControllerState::is_terminal).await;
    let error = state.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::PollingFailed);
    assert!(error.message.contains("connection reset"));
    assert!(state.current_job.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.fetches(), 1);
    assert_eq!(controller.live_timers(), 0);
    assert_eq!(controller.metrics().polls_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_is_terminal() {
    let transport = ScriptedTransport::new();
    transport.on_submit(
        Duration::ZERO,
        Err(TransportError::Status {
            status: 500,
            message: "INTERNAL: boom".into(),
        }),
    );

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();

    let state = wait_for(&controller, ControllerState::is_terminal).await;
    assert_eq!(state.last_error.unwrap().kind, ErrorKind::SubmissionFailed);
    assert!(state.current_job.is_none());
    assert!(state.last_status.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.fetches(), 0);
    assert_eq!(controller.metrics().submissions_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_wins_over_in_flight_poll() {
    let transport = ScriptedTransport::new();
    transport
        .accept("J1")
        .report("J1", JobStatus::running(2, 10))
        .on_fetch("J1", Duration::from_secs(1), Ok(JobStatus::running(9, 10)));

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();
    wait_for(&controller, |s| s.last_status.is_some()).await;

    // Second poll starts at 4s and would resolve at 5s
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(transport.fetches(), 2);
    controller.cancel().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let state = controller.state();
    assert_eq!(state.phase, Phase::Terminal);
    let status = state.last_status.unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!((status.progress_count, status.progress_total), (2, 10));
    assert_eq!(transport.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_new_start_abandons_previous_job() {
    let transport = ScriptedTransport::new();
    transport
        .accept("J1")
        .on_submit(Duration::from_secs(1), Ok(JobId::new("J2")))
        .report("J2", JobStatus::new(JobState::Completed, 5, 5, None));

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();
    wait_for(&controller, |s| s.current_job == Some(JobId::new("J1"))).await;

    controller.start(JobRequest::new("dogs", 5)).await.unwrap();
    let state = controller.state();
    assert_eq!(state.phase, Phase::Submitting);
    assert!(state.current_job.is_none());
    assert_eq!(controller.live_timers(), 0);
    assert_eq!(controller.metrics().jobs_abandoned, 1);

    let done = wait_for(&controller, ControllerState::is_terminal).await;
    assert_eq!(done.last_status.unwrap().state, JobState::Completed);

    let calls = transport.calls();
    assert!(!calls.contains(&Call::Fetch("J1".into())));
    assert!(!calls.contains(&Call::Cancel("J1".into())));
    assert!(calls.contains(&Call::Fetch("J2".into())));
}

#[tokio::test(start_paused = true)]
async fn test_late_submission_result_is_discarded() {
    let transport = ScriptedTransport::new();
    transport
        .on_submit(Duration::from_secs(3), Ok(JobId::new("SLOW")))
        .accept("FAST");

    let controller = spawn(&transport);
    let mut changes = controller.subscribe();
    controller.start(cats()).await.unwrap();
    controller.start(JobRequest::new("dogs", 5)).await.unwrap();

    let active = wait_for(&controller, |s| s.phase == Phase::Active).await;
    assert_eq!(active.current_job, Some(JobId::new("FAST")));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(
        drain(&mut changes)
            .iter()
            .all(|s| s.current_job != Some(JobId::new("SLOW")))
    );
    assert!(!transport.calls().contains(&Call::Fetch("SLOW".into())));
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_live_timer() {
    let transport = ScriptedTransport::new();
    for id in ["J1", "J2", "J3"] {
        transport.accept(id).report(id, JobStatus::running(1, 3));
    }

    let settings = ControllerSettings::default().with_poll_interval(Duration::from_millis(100));
    let controller = spawn_with(&transport, settings);
    let mut changes = controller.subscribe();

    for id in ["J1", "J2", "J3"] {
        controller.start(cats()).await.unwrap();
        wait_for(&controller, |s| s.current_job == Some(JobId::new(id))).await;
        assert_eq!(controller.live_timers(), 1);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(controller.live_timers() <= 1);
    }

    controller.cancel().await.unwrap();
    assert_eq!(controller.live_timers(), 0);
    assert!(drain(&mut changes).iter().all(ControllerState::holds_invariants));
}

#[tokio::test(start_paused = true)]
async fn test_failed_remote_cancel_is_reported() {
    let transport = ScriptedTransport::new();
    transport.accept("J1").on_cancel(
        Duration::from_millis(300),
        Err(TransportError::Status {
            status: 503,
            message: "Service Unavailable".into(),
        }),
    );

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();
    wait_for(&controller, |s| s.phase == Phase::Active).await;
    controller.cancel().await.unwrap();

    let state = wait_for(&controller, |s| s.last_error.is_some()).await;
    let error = state.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::CancelUnconfirmed);
    assert!(!error.kind.is_fatal());
    assert_eq!(state.phase, Phase::Terminal);
    assert_eq!(state.last_status.unwrap().state, JobState::Cancelled);

    let metrics = controller.metrics();
    assert_eq!(metrics.cancels_unconfirmed, 1);
    assert_eq!(metrics.cancels_in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_without_accepted_job() {
    let transport = ScriptedTransport::new();
    transport.on_submit(Duration::from_secs(1), Ok(JobId::new("J1")));

    let controller = spawn(&transport);
    assert_eq!(controller.cancel().await, Err(ControllerError::NotCancellable));

    controller.start(cats()).await.unwrap();
    assert_eq!(controller.cancel().await, Err(ControllerError::NotCancellable));
    assert_eq!(controller.state().phase, Phase::Submitting);

    wait_for(&controller, |s| s.phase == Phase::Active).await;
    controller.cancel().await.unwrap();
    assert_eq!(controller.cancel().await, Err(ControllerError::NotCancellable));
    assert_eq!(controller.metrics().cancels, 1);
}

#[tokio::test(start_paused = true)]
async fn test_call_timeout_fails_hung_calls() {
    let transport = ScriptedTransport::new();
    transport
        .on_submit(Duration::from_secs(3600), Ok(JobId::new("NEVER")))
        .accept("J2")
        .on_fetch("J2", Duration::from_secs(3600), Ok(JobStatus::running(1, 2)));

    let settings = ControllerSettings::default().with_call_timeout(Some(Duration::from_secs(5)));
    let controller = spawn_with(&transport, settings);

    controller.start(cats()).await.unwrap();
    let state = wait_for(&controller, ControllerState::is_terminal).await;
    let error = state.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::SubmissionFailed);
    assert_eq!(error.message, TransportError::Timeout.to_string());

    controller.start(cats()).await.unwrap();
    let state = wait_for(&controller, ControllerState::is_terminal).await;
    assert_eq!(state.last_error.unwrap().kind, ErrorKind::PollingFailed);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_terminal_clears_state() {
    let transport = ScriptedTransport::new();
    transport
        .accept("J1")
        .report("J1", JobStatus::new(JobState::Failed, 1, 10, None))
        .accept("J2");

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();
    let failed = wait_for(&controller, ControllerState::is_terminal).await;
    assert_eq!(failed.last_status.unwrap().state, JobState::Failed);

    controller.start(cats()).await.unwrap();
    let state = wait_for(&controller, |s| s.phase == Phase::Active).await;
    assert_eq!(state.current_job, Some(JobId::new("J2")));
    assert!(state.last_status.is_none());
    assert!(state.last_error.is_none());
    assert_eq!(controller.metrics().jobs_abandoned, 0);
}

#[tokio::test(start_paused = true)]
async fn test_queued_status_keeps_polling() {
    let transport = ScriptedTransport::new();
    transport
        .accept("J1")
        .report("J1", JobStatus::new(JobState::Queued, 0, 0, None))
        .report("J1", JobStatus::running(1, 4))
        .report("J1", JobStatus::new(JobState::Cancelled, 1, 4, None));

    let controller = spawn(&transport);
    controller.start(cats()).await.unwrap();

    let queued = wait_for(&controller, |s| s.last_status.is_some()).await;
    assert_eq!(queued.phase, Phase::Active);
    assert_eq!(queued.progress(), Some(0.0));

    let done = wait_for(&controller, ControllerState::is_terminal).await;
    assert_eq!(done.last_status.unwrap().state, JobState::Cancelled);
    assert_eq!(transport.fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_still_polls() {
    let transport = ScriptedTransport::new();
    transport
        .accept("J1")
        .report("J1", JobStatus::new(JobState::Completed, 10, 10, None));

    let settings = ControllerSettings::default().with_poll_interval(Duration::ZERO);
    let controller = spawn_with(&transport, settings);
    controller.start(cats()).await.unwrap();

    let done = wait_for(&controller, ControllerState::is_terminal).await;
    assert_eq!(done.last_status.unwrap().state, JobState::Completed);
    assert_eq!(transport.fetches(), 1);
    assert_eq!(controller.live_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_poll_for_abandoned_job_is_ignored() {
    let transport = ScriptedTransport::new();
    transport
        .accept("J1")
        .on_fetch(
            "J1",
            Duration::from_secs(1),
            Ok(JobStatus::new(JobState::Completed, 10, 10, Some("/out/J1".into()))),
        )
        .accept("J2")
        .report("J2", JobStatus::running(1, 5));

    let controller = spawn(&transport);
    let mut changes = controller.subscribe();
    controller.start(cats()).await.unwrap();
    wait_for(&controller, |s| s.current_job == Some(JobId::new("J1"))).await;

    // J1's first poll starts at 2s and would answer at 3s
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(transport.fetches(), 1);
    controller.start(JobRequest::new("dogs", 5)).await.unwrap();

    let state = wait_for(&controller, |s| s.last_status.is_some()).await;
    assert_eq!(state.phase, Phase::Active);
    assert_eq!(state.current_job, Some(JobId::new("J2")));
    assert_eq!(state.last_status.unwrap(), JobStatus::running(1, 5));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(drain(&mut changes).iter().all(|s| {
        s.last_status
            .as_ref()
            .is_none_or(|status| status.state != JobState::Completed)
    }));
    assert_eq!(
        transport
            .calls()
            .iter()
            .filter(|c| **c == Call::Fetch("J1".into()))
            .count(),
        1
    );
}
