/// Receives fractional progress from long-running image operations.
pub trait Progress {
    /// `fraction` runs from 0.0 to 1.0.
    fn set_value(&mut self, fraction: f64);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl Progress for NullProgress {
    fn set_value(&mut self, _fraction: f64) {}
}

/// Reports progress through the log at debug level, in whole-percent steps.
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    last_percent: Option<u32>,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), last_percent: None }
    }
}

impl Progress for LogProgress {
    fn set_value(&mut self, fraction: f64) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u32;
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            log::debug!("{}: {}%", self.label, percent);
        }
    }
}

/// Records every reported value; handy for asserting progress sequences.
#[derive(Debug, Default, Clone)]
pub struct RecordingProgress {
    pub values: Vec<f64>,
}

impl Progress for RecordingProgress {
    fn set_value(&mut self, fraction: f64) {
        self.values.push(fraction);
    }
}
