//! Animated row repositioning.
//!
//! Each row is either Idle or Animating toward a target position. A new
//! target cancels the in-flight interpolation and restarts from the current
//! interpolated position; deltas below the configured epsilon snap
//! immediately so no-op reconciliations never start animation storms. All
//! calls happen on the UI-thread context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{config::SyncConfig, track_row::TrackRow};

/// One in-flight interpolation.
#[derive(Debug, Clone)]
pub struct Animation {
    pub from_px: f32,
    pub to_px: f32,
    pub started: Instant,
    pub duration: Duration,
}

impl Animation {
    fn progress_at(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn position_at(&self, now: Instant) -> f32 {
        let eased = smoothstep(self.progress_at(now));
        self.from_px + (self.to_px - self.from_px) * eased
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress_at(now) >= 1.0
    }
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Per-row motion state. `animation == None` means Idle.
#[derive(Debug, Clone, Default)]
pub struct RowMotion {
    pub current_px: f32,
    pub animation: Option<Animation>,
}

impl RowMotion {
    /// Current display position, interpolated while animating.
    pub fn position_at(&self, now: Instant) -> f32 {
        match &self.animation {
            Some(animation) => animation.position_at(now),
            None => self.current_px,
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }
}

/// Schedules time-bounded position transitions for rows.
pub struct AnimatedPositioner {
    duration: Duration,
    min_move_px: f32,
}

impl AnimatedPositioner {
    pub fn new(config: &SyncConfig) -> Self {
        AnimatedPositioner {
            duration: config.animation_duration(),
            min_move_px: config.min_move_px,
        }
    }

    /// Sets a row's position without animating. Used for newly constructed
    /// rows, which appear in place.
    pub fn place(&self, row: &TrackRow, target_px: f32) {
        let mut motion = row.motion().lock().expect("row motion lock poisoned");
        motion.current_px = target_px;
        motion.animation = None;
    }

    /// Starts (or restarts) a transition toward `target_px`. An in-flight
    /// animation is cancelled and the new one continues from the current
    /// interpolated position, not the original start.
    pub fn move_to(&self, row: &TrackRow, target_px: f32, now: Instant) {
        let mut motion = row.motion().lock().expect("row motion lock poisoned");
        let current = motion.position_at(now);
        motion.animation = None;
        if (target_px - current).abs() < self.min_move_px {
            motion.current_px = target_px;
            return;
        }
        motion.current_px = current;
        motion.animation = Some(Animation {
            from_px: current,
            to_px: target_px,
            started: now,
            duration: self.duration,
        });
    }

    /// Advances every animating row, completing transitions past their
    /// deadline. Returns true while any row is still animating.
    pub fn tick(&self, rows: &[Arc<TrackRow>], now: Instant) -> bool {
        let mut animating = false;
        for row in rows {
            let mut motion = row.motion().lock().expect("row motion lock poisoned");
            if let Some(animation) = motion.animation.clone() {
                if animation.is_finished(now) {
                    motion.current_px = animation.to_px;
                    motion.animation = None;
                } else {
                    motion.current_px = animation.position_at(now);
                    animating = true;
                }
            }
        }
        animating
    }
}
