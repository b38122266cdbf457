//! Frame pacing statistics.

use std::time::{Duration, Instant};

/// Summary produced once per reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Frames counted during the interval
    pub frames: u32,
    /// Length of the interval
    pub interval: Duration,
}

impl FrameTiming {
    /// Average frames per second over the interval.
    pub fn fps(&self) -> f64 {
        let secs = self.interval.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        f64::from(self.frames) / secs
    }

    /// Average frame time in milliseconds.
    pub fn frame_time_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.interval.as_secs_f64() * 1000.0 / f64::from(self.frames)
    }
}

/// Measures delta time between frames and reports averages at a fixed interval.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    frames_in_window: u32,
    report_every: Duration,
}

impl FrameTimer {
    /// Create a timer that reports every `report_every`.
    pub fn new(report_every: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            frames_in_window: 0,
            report_every,
        }
    }

    /// Seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Mark the end of a frame.
    ///
    /// Returns the frame's delta time and, when the reporting interval
    /// has elapsed, the timing summary for that interval.
    pub fn tick(&mut self) -> (Duration, Option<FrameTiming>) {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> (Duration, Option<FrameTiming>) {
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frames_in_window += 1;

        let interval = now.saturating_duration_since(self.window_start);
        if interval < self.report_every {
            return (delta, None);
        }

        let timing = FrameTiming {
            frames: self.frames_in_window,
            interval,
        };
        self.window_start = now;
        self.frames_in_window = 0;
        (delta, Some(timing))
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_after_interval() {
        let mut timer = FrameTimer::new(Duration::from_millis(100));
        let base = timer.window_start;

        let (_, report) = timer.tick_at(base + Duration::from_millis(40));
        assert!(report.is_none());

        let (delta, report) = timer.tick_at(base + Duration::from_millis(100));
        assert_eq!(delta, Duration::from_millis(60));
        let report = report.expect("interval elapsed");
        assert_eq!(report.frames, 2);
        assert!((report.fps() - 20.0).abs() < 1e-9);
        assert!((report.frame_time_ms() - 50.0).abs() < 1e-9);

        assert_eq!(timer.frames_in_window, 0);
    }

    #[test]
    fn test_zero_interval_fps() {
        let timing = FrameTiming {
            frames: 10,
            interval: Duration::ZERO,
        };
        assert_eq!(timing.fps(), 0.0);
    }
}
