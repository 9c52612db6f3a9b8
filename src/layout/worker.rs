use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{LayoutError, LayoutRequest, LayoutResult, compute_layout};

const COMMAND_QUEUE_DEPTH: usize = 2;
const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RunId(u64);

#[derive(Clone, Debug, PartialEq)]
pub enum LayoutMessage {
    Progress { run: RunId, fraction: f32 },
    Complete { run: RunId, result: LayoutResult },
    Error { run: RunId, message: String },
}

impl LayoutMessage {
    pub fn run(&self) -> RunId {
        match self {
            Self::Progress { run, .. } | Self::Complete { run, .. } | Self::Error { run, .. } => *run,
        }
    }
}

struct Job {
    run: RunId,
    request: LayoutRequest,
    cancel: Arc<AtomicBool>,
}

struct ActiveRun {
    id: RunId,
    cancel: Arc<AtomicBool>,
    progress: f32,
}

/// Handle to the layout worker thread. At most one run is active; messages
/// from stopped or superseded runs are discarded before they reach the caller.
pub struct LayoutEngine {
    commands: Option<SyncSender<Job>>,
    events: Receiver<LayoutMessage>,
    worker: Option<JoinHandle<()>>,
    active: Option<ActiveRun>,
    next_run: u64,
}

impl LayoutEngine {
    pub fn spawn() -> Result<Self, LayoutError> {
        let (command_tx, command_rx) = mpsc::sync_channel::<Job>(COMMAND_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);

        let worker = thread::Builder::new()
            .name("layout-worker".to_owned())
            .spawn(move || worker_loop(command_rx, event_tx))?;

        Ok(Self {
            commands: Some(command_tx),
            events: event_rx,
            worker: Some(worker),
            active: None,
            next_run: 0,
        })
    }

    /// Starts a run. Rejected with [`LayoutError::Busy`] while another run is
    /// active.
    pub fn calculate(&mut self, request: LayoutRequest) -> Result<RunId, LayoutError> {
        if self.active.is_some() {
            return Err(LayoutError::Busy);
        }
        let commands = self.commands.as_ref().ok_or(LayoutError::WorkerGone)?;

        self.next_run += 1;
        let run = RunId(self.next_run);
        let cancel = Arc::new(AtomicBool::new(false));
        let node_count = request.nodes.len();
        let algorithm = request.params.algorithm.clone();

        match commands.try_send(Job {
            run,
            request,
            cancel: Arc::clone(&cancel),
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(LayoutError::Busy),
            Err(TrySendError::Disconnected(_)) => return Err(LayoutError::WorkerGone),
        }

        debug!(?run, node_count, %algorithm, "layout run queued");
        self.active = Some(ActiveRun {
            id: run,
            cancel,
            progress: 0.0,
        });
        Ok(run)
    }

    /// Cancels the active run. No further message from it is delivered.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.store(true, Ordering::Release);
            info!(run = ?active.id, progress = active.progress, "layout run stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn try_recv(&mut self) -> Option<LayoutMessage> {
        loop {
            match self.events.try_recv() {
                Ok(message) => {
                    if let Some(message) = self.accept(message) {
                        return Some(message);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return self.worker_lost(),
            }
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<LayoutMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(message) => {
                    if let Some(message) = self.accept(message) {
                        return Some(message);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => return self.worker_lost(),
            }
        }
    }

    fn accept(&mut self, message: LayoutMessage) -> Option<LayoutMessage> {
        let active = self.active.as_mut()?;
        if message.run() != active.id {
            return None;
        }

        match &message {
            LayoutMessage::Progress { fraction, .. } => {
                if *fraction < active.progress {
                    return None;
                }
                active.progress = *fraction;
            }
            LayoutMessage::Complete { .. } | LayoutMessage::Error { .. } => {
                self.active = None;
            }
        }
        Some(message)
    }

    fn worker_lost(&mut self) -> Option<LayoutMessage> {
        self.commands = None;
        let active = self.active.take()?;
        warn!(run = ?active.id, "layout worker disconnected during run");
        Some(LayoutMessage::Error {
            run: active.id,
            message: "layout worker disconnected".to_owned(),
        })
    }
}

impl Drop for LayoutEngine {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.store(true, Ordering::Release);
        }
        self.commands = None;

        // Drain so a worker blocked on a full queue can observe the hang-up.
        while self.events.recv().is_ok() {}
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(commands: Receiver<Job>, events: SyncSender<LayoutMessage>) {
    while let Ok(job) = commands.recv() {
        let Job {
            run,
            request,
            cancel,
        } = job;
        if cancel.load(Ordering::Acquire) {
            continue;
        }

        let started = Instant::now();
        let mut disconnected = false;
        let outcome = compute_layout(&request, &cancel, |fraction| {
            if !disconnected && !cancel.load(Ordering::Acquire) {
                disconnected = events
                    .send(LayoutMessage::Progress { run, fraction })
                    .is_err();
            }
        });
        if disconnected {
            return;
        }

        let message = match outcome {
            Ok(Some(result)) if !cancel.load(Ordering::Acquire) => {
                debug!(
                    ?run,
                    nodes = result.positions.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "layout run complete"
                );
                LayoutMessage::Complete { run, result }
            }
            Ok(_) => {
                debug!(?run, "layout run cancelled");
                continue;
            }
            Err(error) => {
                warn!(?run, %error, "layout run failed");
                LayoutMessage::Error {
                    run,
                    message: error.to_string(),
                }
            }
        };

        if events.send(message).is_err() {
            return;
        }
    }
}
