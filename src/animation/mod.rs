//! Query path playback. [`apply`] is the state machine and
//! [`PlaybackController`] drives it from a tokio timer.

mod highlight;
mod playback;

use thiserror::Error;

use crate::model::QueryPath;

pub use highlight::{
    HighlightClass, HighlightStyle, PathHighlight, classify, highlight_step, path_highlight,
    playback_highlight,
};
pub use playback::PlaybackController;

pub const MIN_SPEED_MS: u64 = 200;
pub const MAX_SPEED_MS: u64 = 2000;
pub const DEFAULT_SPEED_MS: u64 = 1000;

pub fn clamp_speed(speed_ms: u64) -> u64 {
    speed_ms.clamp(MIN_SPEED_MS, MAX_SPEED_MS)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnimationStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationCommand {
    Play,
    Pause,
    Resume,
    Tick,
    StepForward,
    StepBackward,
    Reset,
    Scrub(usize),
    SetSpeed(u64),
}

impl AnimationCommand {
    fn name(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Tick => "tick",
            Self::StepForward => "step forward",
            Self::StepBackward => "step backward",
            Self::Reset => "reset",
            Self::Scrub(_) => "scrub",
            Self::SetSpeed(_) => "set speed",
        }
    }

    fn is_manual(self) -> bool {
        matches!(
            self,
            Self::StepForward | Self::StepBackward | Self::Reset | Self::Scrub(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnimationEvent {
    Step {
        step: usize,
        node_id: String,
        score: f32,
    },
    Status(AnimationStatus),
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AnimationError {
    #[error("no query path to animate")]
    NoPath,
    #[error("cannot {0} while playing")]
    WhilePlaying(&'static str),
    #[error("cannot {command} while {status:?}")]
    InvalidInState {
        command: &'static str,
        status: AnimationStatus,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationState {
    pub status: AnimationStatus,
    pub step: usize,
    /// Whether `step` has been revealed. A fresh path starts at step 0 with
    /// nothing shown; the first tick reveals step 0 itself.
    pub entered: bool,
    pub speed_ms: u64,
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::with_speed(DEFAULT_SPEED_MS)
    }
}

impl AnimationState {
    pub fn with_speed(speed_ms: u64) -> Self {
        Self {
            status: AnimationStatus::Idle,
            step: 0,
            entered: false,
            speed_ms: clamp_speed(speed_ms),
        }
    }

    pub fn restarted(self) -> Self {
        Self::with_speed(self.speed_ms)
    }

    pub fn visible_step(&self) -> Option<usize> {
        self.entered.then_some(self.step)
    }
}

fn step_event(path: &QueryPath, step: usize) -> Option<AnimationEvent> {
    let node_id = path.nodes.get(step)?;
    Some(AnimationEvent::Step {
        step,
        node_id: node_id.clone(),
        score: path.score(node_id),
    })
}

fn invalid(command: AnimationCommand, state: &AnimationState) -> AnimationError {
    AnimationError::InvalidInState {
        command: command.name(),
        status: state.status,
    }
}

/// Applies `command` to `state`. Ticks outside `Playing` are ignored so a
/// timer racing a pause is harmless.
pub fn apply(
    state: &AnimationState,
    path: &QueryPath,
    command: AnimationCommand,
) -> Result<(AnimationState, Vec<AnimationEvent>), AnimationError> {
    let mut next = *state;
    let mut events = Vec::new();

    if let AnimationCommand::SetSpeed(speed_ms) = command {
        next.speed_ms = clamp_speed(speed_ms);
        return Ok((next, events));
    }
    if path.is_empty() && command != AnimationCommand::Tick {
        return Err(AnimationError::NoPath);
    }
    if state.status == AnimationStatus::Playing && command.is_manual() {
        return Err(AnimationError::WhilePlaying(command.name()));
    }

    let last = path.len().saturating_sub(1);
    match command {
        AnimationCommand::Play => match state.status {
            AnimationStatus::Idle | AnimationStatus::Paused => {
                next.status = AnimationStatus::Playing;
                events.push(AnimationEvent::Status(next.status));
            }
            AnimationStatus::Playing | AnimationStatus::Completed => {
                return Err(invalid(command, state));
            }
        },
        AnimationCommand::Pause => {
            if state.status != AnimationStatus::Playing {
                return Err(invalid(command, state));
            }
            next.status = AnimationStatus::Paused;
            events.push(AnimationEvent::Status(next.status));
        }
        AnimationCommand::Resume => {
            if state.status != AnimationStatus::Paused {
                return Err(invalid(command, state));
            }
            next.status = AnimationStatus::Playing;
            events.push(AnimationEvent::Status(next.status));
        }
        AnimationCommand::Tick => {
            if state.status != AnimationStatus::Playing || path.is_empty() {
                return Ok((next, events));
            }
            if !state.entered {
                next.entered = true;
                events.extend(step_event(path, next.step));
            } else if state.step < last {
                next.step += 1;
                events.extend(step_event(path, next.step));
            }
            if next.step >= last {
                next.status = AnimationStatus::Completed;
                events.push(AnimationEvent::Status(next.status));
                events.push(AnimationEvent::Completed);
            }
        }
        AnimationCommand::StepForward => {
            let target = if state.entered {
                (state.step + 1).min(last)
            } else {
                state.step.min(last)
            };
            if target != state.step || !state.entered {
                next.step = target;
                next.entered = true;
                events.extend(step_event(path, target));
            }
        }
        AnimationCommand::StepBackward => {
            if state.step > 0 {
                next.step = state.step - 1;
                next.entered = true;
                events.extend(step_event(path, next.step));
            }
        }
        AnimationCommand::Scrub(target) => {
            next.step = target.min(last);
            next.entered = true;
            events.extend(step_event(path, next.step));
        }
        AnimationCommand::Reset => {
            next = state.restarted();
            if state.status != AnimationStatus::Idle {
                events.push(AnimationEvent::Status(AnimationStatus::Idle));
            }
        }
        AnimationCommand::SetSpeed(_) => {}
    }

    Ok((next, events))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn path(len: usize) -> QueryPath {
        let nodes = (0..len).map(|index| format!("n{index}")).collect::<Vec<_>>();
        let scores = nodes
            .iter()
            .enumerate()
            .map(|(index, id)| (id.clone(), index as f32 / 10.0))
            .collect::<HashMap<_, _>>();
        QueryPath {
            nodes,
            scores,
            ..QueryPath::default()
        }
    }

    fn run(
        state: AnimationState,
        path: &QueryPath,
        commands: &[AnimationCommand],
    ) -> (AnimationState, Vec<AnimationEvent>) {
        commands.iter().fold((state, Vec::new()), |(state, mut all), command| {
            let (next, events) = apply(&state, path, *command).unwrap();
            all.extend(events);
            (next, all)
        })
    }

    #[test]
    fn five_node_path_completes_after_five_ticks() {
        let path = path(5);
        let (mut state, _) = run(AnimationState::default(), &path, &[AnimationCommand::Play]);
        let mut completions = 0;
        let mut revealed = Vec::new();

        for tick in 1..=8 {
            let (next, events) = apply(&state, &path, AnimationCommand::Tick).unwrap();
            state = next;
            for event in events {
                match event {
                    AnimationEvent::Step { step, .. } => revealed.push(step),
                    AnimationEvent::Completed => completions += 1,
                    AnimationEvent::Status(_) => {}
                }
            }
            if tick == 4 {
                assert_eq!(state.status, AnimationStatus::Playing);
            }
            if tick == 5 {
                assert_eq!(state.status, AnimationStatus::Completed);
            }
        }

        assert_eq!(completions, 1);
        assert_eq!(revealed, vec![0, 1, 2, 3, 4]);
        assert_eq!(state.step, 4);
    }

    #[test]
    fn scrub_while_paused_emits_node_and_score() {
        let path = path(5);
        let (state, _) = run(
            AnimationState::default(),
            &path,
            &[AnimationCommand::Play, AnimationCommand::Tick, AnimationCommand::Pause],
        );
        assert_eq!(state.status, AnimationStatus::Paused);

        let (state, events) = apply(&state, &path, AnimationCommand::Scrub(2)).unwrap();
        assert_eq!(state.step, 2);
        assert_eq!(
            events,
            vec![AnimationEvent::Step {
                step: 2,
                node_id: "n2".into(),
                score: 0.2,
            }]
        );
    }

    #[test]
    fn manual_controls_are_rejected_while_playing() {
        let path = path(3);
        let (state, _) = run(AnimationState::default(), &path, &[AnimationCommand::Play]);
        for command in [
            AnimationCommand::StepForward,
            AnimationCommand::StepBackward,
            AnimationCommand::Reset,
            AnimationCommand::Scrub(1),
        ] {
            assert!(matches!(
                apply(&state, &path, command),
                Err(AnimationError::WhilePlaying(_))
            ));
        }
    }

    #[test]
    fn scrub_is_clamped_into_range() {
        let path = path(4);
        let (state, events) = apply(&AnimationState::default(), &path, AnimationCommand::Scrub(99)).unwrap();
        assert_eq!(state.step, 3);
        assert!(matches!(&events[0], AnimationEvent::Step { step: 3, .. }));
    }

    #[test]
    fn completed_requires_reset_before_replay() {
        let path = path(1);
        let (state, _) = run(
            AnimationState::default(),
            &path,
            &[AnimationCommand::Play, AnimationCommand::Tick],
        );
        assert_eq!(state.status, AnimationStatus::Completed);
        assert!(apply(&state, &path, AnimationCommand::Play).is_err());

        let (state, _) = run(state, &path, &[AnimationCommand::Reset, AnimationCommand::Play]);
        assert_eq!(state.status, AnimationStatus::Playing);
        assert_eq!(state.visible_step(), None);
    }

    #[test]
    fn stepping_walks_the_path_and_stops_at_ends() {
        let path = path(3);
        let (state, events) = run(
            AnimationState::default(),
            &path,
            &[
                AnimationCommand::StepForward,
                AnimationCommand::StepForward,
                AnimationCommand::StepForward,
                AnimationCommand::StepForward,
            ],
        );
        assert_eq!(state.step, 2);
        assert_eq!(state.status, AnimationStatus::Idle);
        let steps = events
            .iter()
            .filter_map(|event| match event {
                AnimationEvent::Step { step, .. } => Some(*step),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(steps, vec![0, 1, 2]);

        let (state, _) = run(
            state,
            &path,
            &[
                AnimationCommand::StepBackward,
                AnimationCommand::StepBackward,
                AnimationCommand::StepBackward,
            ],
        );
        assert_eq!(state.step, 0);
    }

    #[test]
    fn ticks_outside_playing_are_ignored() {
        let path = path(3);
        let (state, events) = apply(&AnimationState::default(), &path, AnimationCommand::Tick).unwrap();
        assert_eq!(state, AnimationState::default());
        assert!(events.is_empty());
    }

    #[test]
    fn speed_is_clamped() {
        let path = path(2);
        let (state, _) = apply(&AnimationState::default(), &path, AnimationCommand::SetSpeed(50)).unwrap();
        assert_eq!(state.speed_ms, MIN_SPEED_MS);
        let (state, _) = apply(&state, &path, AnimationCommand::SetSpeed(10_000)).unwrap();
        assert_eq!(state.speed_ms, MAX_SPEED_MS);
    }

    #[test]
    fn empty_path_cannot_play() {
        assert_eq!(
            apply(&AnimationState::default(), &QueryPath::default(), AnimationCommand::Play),
            Err(AnimationError::NoPath)
        );
    }
}
