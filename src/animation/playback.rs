use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::model::QueryPath;

use super::{AnimationCommand, AnimationError, AnimationEvent, AnimationState, AnimationStatus, apply};

#[derive(Debug, Default)]
struct Shared {
    path: QueryPath,
    state: AnimationState,
    // bumped whenever the timer is replaced
    epoch: u64,
}

/// Drives [`apply`] from a tokio timer while playing. Events are delivered
/// on the receiver returned by [`PlaybackController::new`].
pub struct PlaybackController {
    runtime: Handle,
    shared: Arc<Mutex<Shared>>,
    events: UnboundedSender<AnimationEvent>,
    timer: Option<JoinHandle<()>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlaybackController {
    pub fn new(runtime: Handle, speed_ms: u64) -> (Self, UnboundedReceiver<AnimationEvent>) {
        let (events, receiver) = unbounded_channel();
        let controller = Self {
            runtime,
            shared: Arc::new(Mutex::new(Shared {
                state: AnimationState::with_speed(speed_ms),
                ..Shared::default()
            })),
            events,
            timer: None,
        };
        (controller, receiver)
    }

    pub fn state(&self) -> AnimationState {
        lock(&self.shared).state
    }

    pub fn path(&self) -> QueryPath {
        lock(&self.shared).path.clone()
    }

    pub fn has_path(&self) -> bool {
        !lock(&self.shared).path.is_empty()
    }

    pub fn load_path(&mut self, path: QueryPath) {
        self.stop_timer();
        let mut shared = lock(&self.shared);
        let was = shared.state.status;
        shared.state = shared.state.restarted();
        shared.path = path;
        debug!(nodes = shared.path.len(), "query path loaded");
        drop(shared);

        if was != AnimationStatus::Idle {
            let _ = self.events.send(AnimationEvent::Status(AnimationStatus::Idle));
        }
    }

    pub fn clear_path(&mut self) {
        self.load_path(QueryPath::default());
    }

    pub fn send(&mut self, command: AnimationCommand) -> Result<AnimationState, AnimationError> {
        let mut shared = lock(&self.shared);
        let before = shared.state;
        let (next, events) = apply(&before, &shared.path, command)?;
        shared.state = next;
        drop(shared);

        for event in events {
            let _ = self.events.send(event);
        }

        let speed_changed = next.speed_ms != before.speed_ms;
        if next.status != AnimationStatus::Playing {
            self.stop_timer();
        } else if before.status != AnimationStatus::Playing || speed_changed {
            self.start_timer();
        }
        Ok(next)
    }

    fn stop_timer(&mut self) {
        lock(&self.shared).epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn start_timer(&mut self) {
        self.stop_timer();
        let epoch = lock(&self.shared).epoch;
        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();

        self.timer = Some(self.runtime.spawn(async move {
            loop {
                let speed = Duration::from_millis(lock(&shared).state.speed_ms);
                tokio::time::sleep(speed).await;

                let (next, ticked) = {
                    let mut guard = lock(&shared);
                    if guard.epoch != epoch {
                        return;
                    }
                    let Ok((next, ticked)) =
                        apply(&guard.state, &guard.path, AnimationCommand::Tick)
                    else {
                        return;
                    };
                    guard.state = next;
                    (next, ticked)
                };

                for event in ticked {
                    let _ = events.send(event);
                }
                if next.status != AnimationStatus::Playing {
                    if next.status == AnimationStatus::Completed {
                        info!(step = next.step, "path animation completed");
                    }
                    return;
                }
            }
        }));
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop_timer();
    }
}
