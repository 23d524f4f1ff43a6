//! Metric definitions for the driver.
//!
//! Metrics go through the `metrics` facade; nothing here installs a
//! recorder. Call [`describe_metrics`] once at startup to register
//! descriptions with whatever recorder the application uses.
//!
//! ```rust,ignore
//! use deconz_driver::metrics::{describe_metrics, metric_defs};
//!
//! describe_metrics();
//! metrics::counter!(metric_defs::FRAMES_RX.name).increment(1);
//! ```

use metrics::{describe_counter, Unit};

/// A counter declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "deconz.frames.rx").
    pub name: &'static str,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            description: "",
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    pub fn describe(&self) {
        describe_counter!(self.name, Unit::Count, self.description);
    }
}

/// All metric definitions for the driver.
pub mod metric_defs {
    use super::Metric;

    // ========================================================================
    // Framing
    // ========================================================================

    /// Frames decoded from the link.
    pub const FRAMES_RX: Metric =
        Metric::counter("deconz.frames.rx").with_description("Frames received from the firmware");

    /// Frames written to the link.
    pub const FRAMES_TX: Metric =
        Metric::counter("deconz.frames.tx").with_description("Frames sent to the firmware");

    /// Malformed frames discarded by the decoder.
    ///
    /// Labels: reason (too_short, too_long, crc, length, escape)
    pub const FRAMES_DROPPED: Metric = Metric::counter("deconz.frames.dropped")
        .with_description("Malformed frames discarded")
        .with_labels(&["reason"]);

    // ========================================================================
    // Commands
    // ========================================================================

    /// Commands that got no response in time.
    pub const COMMANDS_TIMEOUT: Metric =
        Metric::counter("deconz.commands.timeout").with_description("Commands that timed out");

    /// Commands answered with a non-success status.
    pub const COMMANDS_FAILED: Metric = Metric::counter("deconz.commands.failed")
        .with_description("Commands answered with a failure status");

    /// Responses that arrived after their command timed out.
    pub const COMMANDS_LATE_RESPONSE: Metric = Metric::counter("deconz.commands.late_response")
        .with_description("Responses received after the command timed out");

    /// APS data requests retried because the firmware was busy.
    pub const APS_BUSY_RETRIES: Metric = Metric::counter("deconz.aps.busy_retries")
        .with_description("APS data request retries after a busy status");

    // ========================================================================
    // Device state
    // ========================================================================

    /// Confirm/indication drains started.
    ///
    /// Labels: kind (confirm, indication)
    pub const DRAIN_STARTED: Metric = Metric::counter("deconz.drain.started")
        .with_description("Pending confirm or indication reads started")
        .with_labels(&["kind"]);

    /// Every metric, for registration.
    pub const ALL: &[Metric] = &[
        FRAMES_RX,
        FRAMES_TX,
        FRAMES_DROPPED,
        COMMANDS_TIMEOUT,
        COMMANDS_FAILED,
        COMMANDS_LATE_RESPONSE,
        APS_BUSY_RETRIES,
        DRAIN_STARTED,
    ];
}

/// Register descriptions for every driver metric.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Label value for a dropped-frame reason.
pub(crate) fn drop_reason(err: &deconz_protocol::ProtocolError) -> &'static str {
    use deconz_protocol::ProtocolError;
    match err {
        ProtocolError::FrameTooShort { .. } => "too_short",
        ProtocolError::FrameTooLong { .. } => "too_long",
        ProtocolError::CrcMismatch { .. } => "crc",
        ProtocolError::LengthMismatch { .. } => "length",
        ProtocolError::InvalidEscape(_) => "escape",
        _ => "other",
    }
}
