use log::warn;

/// Default spacing between two warnings, counted in video frames.
pub const DEFAULT_WARN_INTERVAL: u64 = 30_000;

/// Rate-limited error reporter.
///
/// Corrupt inputs tend to produce the same complaint on every packet, so
/// only one message is printed per `interval` video frames. The message
/// carries the number of errors swallowed since the previous one. The
/// first error of a handle is always reported.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    interval: u64,
    frames: u64,
    errors: u64,
    last_warn_frame: u64,
    last_warn_errors: u64,
    warned: bool,
}

impl ErrorLog {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            frames: 0,
            errors: 0,
            last_warn_frame: 0,
            last_warn_errors: 0,
            warned: false,
        }
    }

    /// Counts one emitted video frame.
    pub fn frame(&mut self) {
        self.frames += 1;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Records an error and returns the message that was logged, if any.
    pub fn report(&mut self, msg: &str) -> Option<String> {
        self.errors += 1;

        if self.warned && self.frames.saturating_sub(self.last_warn_frame) < self.interval {
            return None;
        }

        let pending = self.errors - self.last_warn_errors;
        let line = if pending < 10 {
            format!("error near frame {}: {}", self.frames, msg)
        } else {
            let span = (self.frames - self.last_warn_frame).max(1);
            let percent = pending as f64 * 100.0 / span as f64;
            format!(
                "{} new errors ({:.0}%) up to frame {}: {}",
                pending, percent, self.frames, msg
            )
        };
        warn!("{}", line);

        self.warned = true;
        self.last_warn_frame = self.frames;
        self.last_warn_errors = self.errors;
        Some(line)
    }

    /// The close line: good frame count and overall error ratio.
    pub fn summary(&self) -> String {
        let percent = if self.frames > 0 {
            self.errors as f64 * 100.0 / self.frames as f64
        } else {
            0.0
        };
        format!(
            "{} good frames, {} errors ({:.0}%)",
            self.frames, self.errors, percent
        )
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}
