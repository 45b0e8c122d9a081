use super::ts::types::millis_to_pts;

/// Largest forward PCR step still treated as the same timeline.
pub const PCR_DISCONTINUITY_MS: i64 = 200;
/// Same for SCR, which program streams carry less often.
pub const SCR_DISCONTINUITY_MS: i64 = 700;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// The first reference seen on this handle (or since a reset).
    First,
    Continuous,
    /// The clock jumped; units in flight belong to the old timeline.
    Discontinuity,
}

/// Follows the program or system clock reference of one input.
#[derive(Debug, Clone)]
pub struct ClockTracker {
    threshold: i64,
    last: Option<i64>,
    required: bool,
}

impl ClockTracker {
    pub fn new(threshold_ms: i64) -> Self {
        Self {
            threshold: millis_to_pts(threshold_ms),
            last: None,
            required: false,
        }
    }

    pub fn for_transport() -> Self {
        Self::new(PCR_DISCONTINUITY_MS)
    }

    pub fn for_program() -> Self {
        Self::new(SCR_DISCONTINUITY_MS)
    }

    /// Hold back all payload until a clock reference has been seen.
    pub fn set_required(&mut self, required: bool) {
        self.required = required;
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether payload may pass: either no clock is expected or one has
    /// been seen.
    pub fn is_open(&self) -> bool {
        !self.required || self.last.is_some()
    }

    pub fn has_clock(&self) -> bool {
        self.last.is_some()
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }

    /// Records a clock reference in 90 kHz ticks.
    pub fn update(&mut self, clock: i64) -> ClockEvent {
        let event = match self.last {
            None => ClockEvent::First,
            Some(last) if clock < last || clock - last > self.threshold => {
                ClockEvent::Discontinuity
            }
            Some(_) => ClockEvent::Continuous,
        };
        self.last = Some(clock);
        event
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
