//! Fixed-timestep accumulator driving the simulation loop.

use tracing::debug;

/// Result of feeding one frame's elapsed time into a [`TickSchedule`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSteps {
    /// Fixed steps to run this frame.
    pub steps: u32,
    /// Time left in the accumulator after those steps, in seconds.
    /// Used to extrapolate visual transforms between steps.
    pub leftover: f32,
}

/// Accumulates real elapsed time and yields whole fixed steps.
///
/// When a frame would require more than `max_catch_up` steps the backlog is
/// dropped instead of spiralling.
pub struct TickSchedule {
    accumulator_secs: f64,
    step_secs: f64,
    max_catch_up: u32,
    total_ticks: u64,
}

impl TickSchedule {
    pub fn new(step_secs: f32, max_catch_up: u32) -> Self {
        Self {
            accumulator_secs: 0.0,
            step_secs: f64::from(step_secs),
            max_catch_up: max_catch_up.max(1),
            total_ticks: 0,
        }
    }

    /// Accumulates `frame_secs` and returns how many fixed steps to run.
    pub fn accumulate(&mut self, frame_secs: f32) -> FrameSteps {
        if frame_secs.is_finite() && frame_secs > 0.0 {
            self.accumulator_secs += f64::from(frame_secs);
        }

        let mut steps = 0u32;
        while self.accumulator_secs >= self.step_secs {
            if steps == self.max_catch_up {
                debug!(
                    dropped_secs = self.accumulator_secs,
                    "tick backlog exceeds catch-up limit"
                );
                self.accumulator_secs = 0.0;
                break;
            }
            self.accumulator_secs -= self.step_secs;
            steps += 1;
        }
        self.total_ticks += u64::from(steps);

        FrameSteps {
            steps,
            leftover: self.accumulator_secs as f32,
        }
    }

    /// Total steps handed out since creation.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn step_secs(&self) -> f32 {
        self.step_secs as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_partial_frames() {
        let mut schedule = TickSchedule::new(0.01, 25);
        assert_eq!(schedule.accumulate(0.004).steps, 0);
        assert_eq!(schedule.accumulate(0.004).steps, 0);
        let frame = schedule.accumulate(0.004);
        assert_eq!(frame.steps, 1);
        assert!((frame.leftover - 0.002).abs() < 1e-6);
        assert_eq!(schedule.total_ticks(), 1);
    }

    #[test]
    fn test_multiple_steps_in_one_frame() {
        let mut schedule = TickSchedule::new(0.01, 25);
        let frame = schedule.accumulate(0.035);
        assert_eq!(frame.steps, 3);
        assert!((frame.leftover - 0.005).abs() < 1e-6);
    }

    #[test]
    fn test_catch_up_is_clamped() {
        let mut schedule = TickSchedule::new(0.01, 5);
        let frame = schedule.accumulate(1.0);
        assert_eq!(frame.steps, 5);
        assert_eq!(frame.leftover, 0.0);
        assert_eq!(schedule.accumulate(0.0).steps, 0);
    }

    #[test]
    fn test_invalid_frame_time_ignored() {
        let mut schedule = TickSchedule::new(0.01, 5);
        assert_eq!(schedule.accumulate(-1.0).steps, 0);
        assert_eq!(schedule.accumulate(f32::NAN).steps, 0);
        assert_eq!(schedule.total_ticks(), 0);
    }
}
