//! Transient player overlays: resume banner, unmute prompt and near-end
//! controls.
//!
//! The coordinator is a pure state machine. It never owns a timer; it returns
//! [`TimerCommand`]s for the host to execute and later feeds expirations back
//! as [`OverlayEvent::TimerElapsed`]. Every timer is stamped with the context
//! generation it was armed in, and each mount/unmount bumps the generation, so
//! an expiration from a previous episode or source is ignored even if the
//! host failed to cancel it.

use std::time::Duration;

use crate::config::OverlayConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlayState {
    #[default]
    Idle,
    /// "Resuming from episode N" banner.
    Resuming,
    NearEndControlsVisible,
    UnmutePromptVisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ResumeBanner,
    UnmutePromptDelay,
    UnmutePromptHide,
    ControlsIdle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayEvent {
    /// A player was mounted for a new episode/source/language.
    Mounted { resuming: bool, muted: bool },
    /// The player was torn down.
    Unmounted,
    /// Playback position from player telemetry.
    Progress { current_time: f64, duration: f64 },
    MuteChanged { muted: bool },
    /// Pointer or keyboard activity over the player.
    UserActivity,
    DismissResume,
    Ended,
    TimerElapsed { kind: TimerKind, generation: u64 },
}

/// Instruction for whoever owns the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Start `kind`, replacing any running timer of the same kind.
    Arm {
        kind: TimerKind,
        delay: Duration,
        generation: u64,
    },
    Cancel(TimerKind),
    CancelAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayTimings {
    pub resume_banner: Duration,
    pub unmute_prompt_delay: Duration,
    pub unmute_prompt: Duration,
    pub controls_idle: Duration,
    /// Remaining playback time at which the episode counts as nearly over.
    pub near_end: Duration,
}

impl Default for OverlayTimings {
    fn default() -> Self {
        Self {
            resume_banner: Duration::from_secs(5),
            unmute_prompt_delay: Duration::from_secs(2),
            unmute_prompt: Duration::from_secs(8),
            controls_idle: Duration::from_secs(3),
            near_end: Duration::from_secs(90),
        }
    }
}

impl From<&OverlayConfig> for OverlayTimings {
    fn from(config: &OverlayConfig) -> Self {
        Self {
            resume_banner: Duration::from_secs(config.resume_banner_secs),
            unmute_prompt_delay: Duration::from_secs(config.unmute_prompt_delay_secs),
            unmute_prompt: Duration::from_secs(config.unmute_prompt_secs),
            controls_idle: Duration::from_secs(config.controls_idle_secs),
            near_end: Duration::from_secs(config.near_end_secs),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlayCoordinator {
    timings: OverlayTimings,
    state: OverlayState,
    generation: u64,
    muted: bool,
    near_end: bool,
}

impl OverlayCoordinator {
    pub fn new(timings: OverlayTimings) -> Self {
        Self {
            timings,
            ..Self::default()
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn timings(&self) -> &OverlayTimings {
        &self.timings
    }

    pub fn handle(&mut self, event: OverlayEvent) -> Vec<TimerCommand> {
        let before = self.state;
        let commands = match event {
            OverlayEvent::Mounted { resuming, muted } => self.mount(resuming, muted),
            OverlayEvent::Unmounted => {
                self.reset();
                vec![TimerCommand::CancelAll]
            }
            OverlayEvent::Progress {
                current_time,
                duration,
            } => self.progress(current_time, duration),
            OverlayEvent::MuteChanged { muted } => self.mute_changed(muted),
            OverlayEvent::UserActivity => {
                if self.near_end && self.state != OverlayState::UnmutePromptVisible {
                    self.state = OverlayState::NearEndControlsVisible;
                    vec![self.arm(TimerKind::ControlsIdle)]
                } else {
                    Vec::new()
                }
            }
            OverlayEvent::DismissResume => {
                if self.state == OverlayState::Resuming {
                    self.state = OverlayState::Idle;
                    vec![TimerCommand::Cancel(TimerKind::ResumeBanner)]
                } else {
                    Vec::new()
                }
            }
            OverlayEvent::Ended => {
                self.near_end = true;
                if self.state != OverlayState::UnmutePromptVisible {
                    self.state = OverlayState::NearEndControlsVisible;
                }
                vec![TimerCommand::Cancel(TimerKind::ControlsIdle)]
            }
            OverlayEvent::TimerElapsed { kind, generation } => {
                if generation != self.generation {
                    tracing::debug!(
                        ?kind,
                        generation,
                        current = self.generation,
                        "Stale timer ignored"
                    );
                    Vec::new()
                } else {
                    self.elapsed(kind)
                }
            }
        };
        if before != self.state {
            tracing::trace!(from = ?before, to = ?self.state, "Overlay transition");
        }
        commands
    }

    fn mount(&mut self, resuming: bool, muted: bool) -> Vec<TimerCommand> {
        self.reset();
        self.muted = muted;
        let mut commands = vec![TimerCommand::CancelAll];
        if resuming {
            self.state = OverlayState::Resuming;
            commands.push(self.arm(TimerKind::ResumeBanner));
        }
        if muted {
            commands.push(self.arm(TimerKind::UnmutePromptDelay));
        }
        commands
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.state = OverlayState::Idle;
        self.muted = false;
        self.near_end = false;
    }

    fn progress(&mut self, current_time: f64, duration: f64) -> Vec<TimerCommand> {
        if duration.is_nan() || duration <= 0.0 || !current_time.is_finite() {
            return Vec::new();
        }
        let remaining = (duration - current_time).max(0.0);
        let near_end = remaining <= self.timings.near_end.as_secs_f64();
        if near_end == self.near_end {
            return Vec::new();
        }
        self.near_end = near_end;

        if near_end {
            if matches!(self.state, OverlayState::Idle | OverlayState::Resuming) {
                self.state = OverlayState::NearEndControlsVisible;
                return vec![
                    TimerCommand::Cancel(TimerKind::ResumeBanner),
                    self.arm(TimerKind::ControlsIdle),
                ];
            }
            Vec::new()
        } else {
            // Seeked back out of the closing stretch.
            if self.state == OverlayState::NearEndControlsVisible {
                self.state = OverlayState::Idle;
            }
            vec![TimerCommand::Cancel(TimerKind::ControlsIdle)]
        }
    }

    fn mute_changed(&mut self, muted: bool) -> Vec<TimerCommand> {
        if muted == self.muted {
            return Vec::new();
        }
        self.muted = muted;
        if muted {
            return vec![self.arm(TimerKind::UnmutePromptDelay)];
        }
        if self.state == OverlayState::UnmutePromptVisible {
            self.state = self.resting_state();
        }
        vec![
            TimerCommand::Cancel(TimerKind::UnmutePromptDelay),
            TimerCommand::Cancel(TimerKind::UnmutePromptHide),
        ]
    }

    fn elapsed(&mut self, kind: TimerKind) -> Vec<TimerCommand> {
        match kind {
            TimerKind::ResumeBanner => {
                if self.state == OverlayState::Resuming {
                    self.state = OverlayState::Idle;
                }
                Vec::new()
            }
            TimerKind::UnmutePromptDelay => {
                if !self.muted {
                    return Vec::new();
                }
                self.state = OverlayState::UnmutePromptVisible;
                vec![
                    TimerCommand::Cancel(TimerKind::ResumeBanner),
                    self.arm(TimerKind::UnmutePromptHide),
                ]
            }
            TimerKind::UnmutePromptHide => {
                if self.state == OverlayState::UnmutePromptVisible {
                    self.state = self.resting_state();
                    if self.state == OverlayState::NearEndControlsVisible {
                        return vec![self.arm(TimerKind::ControlsIdle)];
                    }
                }
                Vec::new()
            }
            TimerKind::ControlsIdle => {
                if self.state == OverlayState::NearEndControlsVisible {
                    self.state = OverlayState::Idle;
                }
                Vec::new()
            }
        }
    }

    fn resting_state(&self) -> OverlayState {
        if self.near_end {
            OverlayState::NearEndControlsVisible
        } else {
            OverlayState::Idle
        }
    }

    fn arm(&self, kind: TimerKind) -> TimerCommand {
        let delay = match kind {
            TimerKind::ResumeBanner => self.timings.resume_banner,
            TimerKind::UnmutePromptDelay => self.timings.unmute_prompt_delay,
            TimerKind::UnmutePromptHide => self.timings.unmute_prompt,
            TimerKind::ControlsIdle => self.timings.controls_idle,
        };
        TimerCommand::Arm {
            kind,
            delay,
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elapsed(coordinator: &OverlayCoordinator, kind: TimerKind) -> OverlayEvent {
        OverlayEvent::TimerElapsed {
            kind,
            generation: coordinator.generation(),
        }
    }

    #[test]
    fn test_resume_banner_times_out() {
        let mut overlay = OverlayCoordinator::default();
        let commands = overlay.handle(OverlayEvent::Mounted {
            resuming: true,
            muted: false,
        });
        assert_eq!(overlay.state(), OverlayState::Resuming);
        assert!(commands.contains(&TimerCommand::Arm {
            kind: TimerKind::ResumeBanner,
            delay: Duration::from_secs(5),
            generation: 1,
        }));

        overlay.handle(elapsed(&overlay, TimerKind::ResumeBanner));
        assert_eq!(overlay.state(), OverlayState::Idle);
    }

    #[test]
    fn test_stale_timer_from_previous_episode_is_ignored() {
        let mut overlay = OverlayCoordinator::default();
        overlay.handle(OverlayEvent::Mounted {
            resuming: false,
            muted: true,
        });
        let old = elapsed(&overlay, TimerKind::UnmutePromptDelay);

        // Switch episode before the prompt delay fires.
        overlay.handle(OverlayEvent::Mounted {
            resuming: false,
            muted: false,
        });
        assert!(overlay.handle(old).is_empty());
        assert_eq!(overlay.state(), OverlayState::Idle);
    }

    #[test]
    fn test_unmute_prompt_lifecycle() {
        let mut overlay = OverlayCoordinator::default();
        overlay.handle(OverlayEvent::Mounted {
            resuming: false,
            muted: true,
        });
        let commands = overlay.handle(elapsed(&overlay, TimerKind::UnmutePromptDelay));
        assert_eq!(overlay.state(), OverlayState::UnmutePromptVisible);
        assert!(commands.iter().any(|c| matches!(
            c,
            TimerCommand::Arm {
                kind: TimerKind::UnmutePromptHide,
                delay,
                ..
            } if *delay == Duration::from_secs(8)
        )));

        overlay.handle(elapsed(&overlay, TimerKind::UnmutePromptHide));
        assert_eq!(overlay.state(), OverlayState::Idle);
    }

    #[test]
    fn test_unmuting_hides_prompt() {
        let mut overlay = OverlayCoordinator::default();
        overlay.handle(OverlayEvent::Mounted {
            resuming: false,
            muted: true,
        });
        overlay.handle(elapsed(&overlay, TimerKind::UnmutePromptDelay));
        let commands = overlay.handle(OverlayEvent::MuteChanged { muted: false });
        assert_eq!(overlay.state(), OverlayState::Idle);
        assert!(commands.contains(&TimerCommand::Cancel(TimerKind::UnmutePromptHide)));
    }

    #[test]
    fn test_near_end_controls_hide_after_inactivity() {
        let mut overlay = OverlayCoordinator::default();
        overlay.handle(OverlayEvent::Mounted {
            resuming: false,
            muted: false,
        });
        assert!(overlay
            .handle(OverlayEvent::Progress {
                current_time: 600.0,
                duration: 1420.0,
            })
            .is_empty());
        assert_eq!(overlay.state(), OverlayState::Idle);

        overlay.handle(OverlayEvent::Progress {
            current_time: 1340.0,
            duration: 1420.0,
        });
        assert_eq!(overlay.state(), OverlayState::NearEndControlsVisible);

        overlay.handle(elapsed(&overlay, TimerKind::ControlsIdle));
        assert_eq!(overlay.state(), OverlayState::Idle);

        // Activity near the end brings the controls back.
        let commands = overlay.handle(OverlayEvent::UserActivity);
        assert_eq!(overlay.state(), OverlayState::NearEndControlsVisible);
        assert!(matches!(
            commands.as_slice(),
            [TimerCommand::Arm {
                kind: TimerKind::ControlsIdle,
                ..
            }]
        ));
    }

    #[test]
    fn test_seek_back_leaves_near_end() {
        let mut overlay = OverlayCoordinator::default();
        overlay.handle(OverlayEvent::Mounted {
            resuming: false,
            muted: false,
        });
        overlay.handle(OverlayEvent::Progress {
            current_time: 1400.0,
            duration: 1420.0,
        });
        overlay.handle(OverlayEvent::Progress {
            current_time: 100.0,
            duration: 1420.0,
        });
        assert_eq!(overlay.state(), OverlayState::Idle);
        assert!(overlay.handle(OverlayEvent::UserActivity).is_empty());
    }

    #[test]
    fn test_missing_duration_is_ignored() {
        let mut overlay = OverlayCoordinator::default();
        let commands = overlay.handle(OverlayEvent::Progress {
            current_time: 10.0,
            duration: 0.0,
        });
        assert!(commands.is_empty());
        assert_eq!(overlay.state(), OverlayState::Idle);
    }

    #[test]
    fn test_unmount_cancels_everything() {
        let mut overlay = OverlayCoordinator::default();
        overlay.handle(OverlayEvent::Mounted {
            resuming: true,
            muted: true,
        });
        let generation = overlay.generation();
        assert_eq!(
            overlay.handle(OverlayEvent::Unmounted),
            vec![TimerCommand::CancelAll]
        );
        assert_eq!(overlay.state(), OverlayState::Idle);
        assert!(overlay.generation() > generation);
    }

    #[test]
    fn test_timings_from_config() {
        let config = crate::config::AppConfig::default();
        let timings = OverlayTimings::from(&config.overlay);
        assert_eq!(timings, OverlayTimings::default());
    }
}
