use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::core::descriptor::{
    normalize_target, LoadMode, OperationDescriptor, OperationId, OperationKind, OperationRequest,
};
use crate::core::error::{DispatchFailure, FailureReason, OrchestratorError};
use crate::core::host::{HostEvent, SceneHost, SubscriptionId};
use crate::core::metrics::OrchestratorStats;
use crate::core::queue::QueuedOperation;
use crate::core::sequencer::{
    EventDisposition, OperationOutcome, Sequencer, SequencerState, Settled, Tick,
};

/// Callback invoked once for every failed dispatch
pub type ErrorHandler = Arc<dyn Fn(&DispatchFailure) + Send + Sync>;

/// Broadcast whenever an operation reaches a terminal state
#[derive(Debug, Clone)]
pub struct OperationReport {
    /// Session that ran the operation
    pub session: Uuid,
    /// Identifier the operation was queued under
    pub id: OperationId,
    /// What was requested
    pub descriptor: OperationDescriptor,
    /// How it ended
    pub outcome: OperationOutcome,
    /// When it ended
    pub settled_at: DateTime<Utc>,
}

/// Snapshot of the orchestrator published after every driver turn
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorStatus {
    /// Working / waiting / cancellation flags
    pub state: SequencerState,
    /// Operations queued, the in-flight one included
    pub queued: usize,
    /// Operation currently waiting for its completion event
    pub in_flight: Option<QueuedOperation>,
    /// Number of submissions the driver has processed
    pub acknowledged: u64,
    /// Session counters
    pub stats: OrchestratorStats,
    /// The driver has stopped
    pub shut_down: bool,
}

impl OrchestratorStatus {
    /// Nothing is in flight
    pub fn is_complete(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Nothing in flight, nothing queued, and every submission up to
    /// `submitted` has been seen by the driver
    pub fn is_drained(&self, submitted: u64) -> bool {
        self.acknowledged >= submitted && self.in_flight.is_none() && self.queued == 0
    }
}

enum Command {
    Enqueue {
        seq: u64,
        request: OperationRequest,
        ticket: Option<oneshot::Sender<OperationOutcome>>,
    },
    RegisterTransition(String),
    Cancel,
    Shutdown,
}

struct Shared {
    session: Uuid,
    host: Arc<dyn SceneHost>,
    commands: mpsc::UnboundedSender<Command>,
    /// Sequence number of the last submission sent to the driver
    submitted: Mutex<u64>,
    status: watch::Receiver<OrchestratorStatus>,
    reports: broadcast::Sender<OperationReport>,
    /// Transition scene, set at most once per session
    transition: OnceLock<String>,
    error_handler: Arc<Mutex<Option<ErrorHandler>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running scene orchestrator.
///
/// All queue state lives in a single driver task. Callers and the host's
/// event sinks only talk to it through channels, so enqueueing from any
/// task while host events arrive from another is safe. Handles are cheap
/// to clone and share one session.
#[derive(Clone)]
pub struct SceneOrchestrator {
    shared: Arc<Shared>,
}

impl fmt::Debug for SceneOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneOrchestrator")
            .field("session", &self.shared.session)
            .field("status", &*self.shared.status.borrow())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SceneOrchestrator {
    /// Start an orchestrator session driving `host`. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        host: Arc<dyn SceneHost>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let session = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(OrchestratorStatus::default());
        let (reports, _) = broadcast::channel(config.report_capacity);
        let error_handler: Arc<Mutex<Option<ErrorHandler>>> = Arc::new(Mutex::new(None));

        let subscription = host.subscribe(event_tx);

        let driver = Driver {
            session,
            host: host.clone(),
            sequencer: Sequencer::new(config.late_event_memory),
            config,
            commands: command_rx,
            events: event_rx,
            subscription,
            status: status_tx,
            reports: reports.clone(),
            tickets: HashMap::new(),
            error_handler: error_handler.clone(),
            acknowledged: 0,
            deadline: None,
        };
        let handle = tokio::spawn(driver.run());
        info!("Scene orchestrator {} started", session);

        Ok(Self {
            shared: Arc::new(Shared {
                session,
                host,
                commands: command_tx,
                submitted: Mutex::new(0),
                status: status_rx,
                reports,
                transition: OnceLock::new(),
                error_handler,
                driver: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Start a session with the default configuration
    pub fn with_defaults(host: Arc<dyn SceneHost>) -> Result<Self, OrchestratorError> {
        Self::spawn(host, OrchestratorConfig::default())
    }

    pub fn session(&self) -> Uuid {
        self.shared.session
    }

    /// Queue an operation. Invalid targets are dropped silently. Never waits
    /// for the operation to run.
    pub fn enqueue(&self, target: &str, kind: OperationKind, mode: LoadMode, use_transition: bool) {
        self.submit(OperationRequest::new(target, kind, mode, use_transition), None);
    }

    /// Like [`SceneOrchestrator::enqueue`], returning a ticket that resolves
    /// once the requested operation reaches a terminal state
    pub fn enqueue_tracked(
        &self,
        target: &str,
        kind: OperationKind,
        mode: LoadMode,
        use_transition: bool,
    ) -> oneshot::Receiver<OperationOutcome> {
        let (tx, rx) = oneshot::channel();
        self.submit(OperationRequest::new(target, kind, mode, use_transition), Some(tx));
        rx
    }

    /// Additive load, bracketed by the transition scene if one is registered
    pub fn load(&self, target: &str) {
        self.enqueue(target, OperationKind::Load, LoadMode::Additive, true);
    }

    /// Unload, bracketed by the transition scene if one is registered
    pub fn unload(&self, target: &str) {
        self.enqueue(target, OperationKind::Unload, LoadMode::Additive, true);
    }

    fn submit(&self, request: OperationRequest, ticket: Option<oneshot::Sender<OperationOutcome>>) {
        // Sequence numbers must reach the driver in order, so numbering and
        // sending happen under the same lock.
        let mut submitted = lock(&self.shared.submitted);
        let seq = *submitted + 1;
        let command = Command::Enqueue {
            seq,
            request,
            ticket,
        };
        if self.shared.commands.send(command).is_err() {
            warn!(
                "Orchestrator {} has shut down, dropping request",
                self.shared.session
            );
            return;
        }
        *submitted = seq;
    }

    /// Register the scene used to bracket operations that ask for a
    /// transition. Only the first registration per session is accepted.
    pub fn register_transition_scene(&self, name: &str) -> Result<(), OrchestratorError> {
        let name = normalize_target(name);
        if name.is_empty() || !self.shared.host.is_known(&name) {
            return Err(OrchestratorError::InvalidTransitionScene(name));
        }
        if self.shared.transition.set(name.clone()).is_err() {
            let existing = self.shared.transition.get().cloned().unwrap_or_default();
            return Err(OrchestratorError::TransitionAlreadyRegistered(existing));
        }
        self.shared
            .commands
            .send(Command::RegisterTransition(name))
            .map_err(|_| OrchestratorError::Shutdown)
    }

    pub fn transition_scene(&self) -> Option<&str> {
        self.shared.transition.get().map(String::as_str)
    }

    /// Stop dispatching. The in-flight operation, if any, is left to finish;
    /// everything still queued is then cleared and reported as cancelled.
    pub fn cancel(&self) {
        if self.shared.commands.send(Command::Cancel).is_err() {
            warn!("Orchestrator {} has shut down, nothing to cancel", self.shared.session);
        }
    }

    /// True iff no operation is in flight
    pub fn is_complete(&self) -> bool {
        self.shared.status.borrow().is_complete()
    }

    /// True iff every submission so far has been processed and nothing is
    /// queued or in flight
    pub fn is_drained(&self) -> bool {
        let submitted = *lock(&self.shared.submitted);
        self.shared.status.borrow().is_drained(submitted)
    }

    /// Wait until everything submitted before this call has settled
    pub async fn await_drain(&self) -> Result<(), OrchestratorError> {
        let submitted = *lock(&self.shared.submitted);
        let mut status = self.shared.status.clone();
        loop {
            if status.borrow_and_update().is_drained(submitted) {
                return Ok(());
            }
            if status.changed().await.is_err() {
                if status.borrow().is_drained(submitted) {
                    return Ok(());
                }
                return Err(OrchestratorError::Shutdown);
            }
        }
    }

    pub fn status(&self) -> OrchestratorStatus {
        self.shared.status.borrow().clone()
    }

    /// Whether the host currently has the scene loaded. Reflects host state,
    /// not queue state.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.shared.host.is_loaded(&normalize_target(name))
    }

    /// Receive a report for every operation that reaches a terminal state
    pub fn subscribe_reports(&self) -> broadcast::Receiver<OperationReport> {
        self.shared.reports.subscribe()
    }

    /// Install the callback invoked for dispatch failures, replacing any previous one
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&DispatchFailure) + Send + Sync + 'static,
    {
        *lock(&self.shared.error_handler) = Some(Arc::new(handler));
    }

    /// Stop the driver: unsubscribe from the host, cancel whatever is left
    /// and wait for the task to exit
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        let handle = lock(&self.shared.driver)
            .take()
            .ok_or(OrchestratorError::Shutdown)?;
        let _ = self.shared.commands.send(Command::Shutdown);
        handle
            .await
            .map_err(|e| OrchestratorError::Driver(e.to_string()))
    }
}

/// Owner of the sequencer. Runs as a single task.
struct Driver {
    session: Uuid,
    host: Arc<dyn SceneHost>,
    config: OrchestratorConfig,
    sequencer: Sequencer,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    subscription: SubscriptionId,
    status: watch::Sender<OrchestratorStatus>,
    reports: broadcast::Sender<OperationReport>,
    /// Pending per-request tickets by operation id
    tickets: HashMap<OperationId, oneshot::Sender<OperationOutcome>>,
    error_handler: Arc<Mutex<Option<ErrorHandler>>>,
    acknowledged: u64,
    /// Timeout of the in-flight operation
    deadline: Option<(OperationId, Instant)>,
}

async fn expire(deadline: Option<(OperationId, Instant)>) {
    match deadline {
        Some((_, at)) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

async fn next_turn(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl Driver {
    async fn run(mut self) {
        let mut interval = self.config.turn_interval().map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let paced = interval.is_some();

        loop {
            let deadline = self.deadline;
            let mut take_turn = !paced;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.events.recv() => self.handle_event(event),
                _ = expire(deadline) => self.handle_timeout(),
                _ = next_turn(interval.as_mut()) => take_turn = true,
            }

            if take_turn {
                self.turn().await;
            }
            if self.sequencer.in_flight().is_none() {
                self.deadline = None;
            }
            self.publish(false);
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Enqueue {
                seq,
                request,
                ticket,
            } => {
                let descriptor = request.descriptor.clone();
                match self.sequencer.submit(request, self.host.as_ref()) {
                    Some(id) => {
                        debug!("[{}] Queued {} {}", self.session, id, descriptor);
                        if let Some(ticket) = ticket {
                            self.tickets.insert(id, ticket);
                        }
                    }
                    None => {
                        if let Some(ticket) = ticket {
                            let _ = ticket.send(OperationOutcome::Rejected);
                        }
                    }
                }
                self.acknowledged = seq;
            }
            Command::RegisterTransition(name) => {
                self.sequencer.register_transition(&name);
            }
            Command::Cancel => self.sequencer.cancel(),
            Command::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: HostEvent) {
        match self.sequencer.on_host_event(&event) {
            EventDisposition::Completed(settled) => self.settle(settled),
            EventDisposition::Discarded(correlation) => {
                debug!(
                    "[{}] Discarded {} event for '{}': {:?}",
                    self.session, event.kind, event.scene, correlation
                );
            }
        }
    }

    fn handle_timeout(&mut self) {
        let Some((id, _)) = self.deadline.take() else {
            return;
        };
        let waited = self.config.dispatch_timeout_ms.unwrap_or_default();
        if let Some(settled) = self.sequencer.on_timeout(id, FailureReason::TimedOut(waited)) {
            self.settle(settled);
        }
    }

    /// Dispatch the head if nothing is in flight. A refused dispatch is
    /// settled right away and the next head is tried.
    async fn turn(&mut self) {
        loop {
            match self.sequencer.tick() {
                Tick::Idle | Tick::Busy => return,
                Tick::Cancelled(settled) => {
                    for item in settled {
                        self.settle(item);
                    }
                }
                Tick::Dispatch(operation) => {
                    let descriptor = &operation.descriptor;
                    let result = match descriptor.kind() {
                        OperationKind::Load => {
                            self.host.load(descriptor.target(), descriptor.mode()).await
                        }
                        OperationKind::Unload => self.host.unload(descriptor.target()).await,
                    };
                    match result {
                        Ok(()) => {
                            self.deadline = self
                                .config
                                .dispatch_timeout()
                                .map(|timeout| (operation.id, Instant::now() + timeout));
                            return;
                        }
                        Err(err) => {
                            if let Some(settled) =
                                self.sequencer.on_dispatch_failed(FailureReason::Host(err))
                            {
                                self.settle(settled);
                            }
                        }
                    }
                }
            }
        }
    }

    fn settle(&mut self, settled: Settled) {
        let Settled { operation, outcome } = settled;

        if let OperationOutcome::Failed(reason) = &outcome {
            let failure = DispatchFailure {
                operation: operation.clone(),
                reason: reason.clone(),
            };
            error!("[{}] {}", self.session, failure);
            let handler = lock(&self.error_handler).clone();
            if let Some(handler) = handler {
                handler(&failure);
            }
        }

        if let Some(ticket) = self.tickets.remove(&operation.id) {
            let _ = ticket.send(outcome.clone());
        }

        // No subscribers is fine.
        let _ = self.reports.send(OperationReport {
            session: self.session,
            id: operation.id,
            descriptor: operation.descriptor,
            outcome,
            settled_at: Utc::now(),
        });
    }

    fn publish(&self, shut_down: bool) {
        self.status.send_replace(OrchestratorStatus {
            state: self.sequencer.state(),
            queued: self.sequencer.queued(),
            in_flight: self.sequencer.in_flight().cloned(),
            acknowledged: self.acknowledged,
            stats: self.sequencer.stats().clone(),
            shut_down,
        });
    }

    fn teardown(mut self) {
        self.host.unsubscribe(self.subscription);

        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Enqueue { seq, ticket, .. } = command {
                if let Some(ticket) = ticket {
                    let _ = ticket.send(OperationOutcome::Cancelled);
                }
                self.acknowledged = seq;
            }
        }

        for settled in self.sequencer.cancel_all() {
            self.settle(settled);
        }
        self.publish(true);
        info!("Scene orchestrator {} shut down", self.session);
    }
}
