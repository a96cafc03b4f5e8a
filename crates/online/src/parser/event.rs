use pgfkit_types::MeasurementResult;

/// One logical unit of engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// A page was shipped out. The page number is reported when the engine printed one.
    PageShipped { page: Option<u32> },
    /// A tagged measurement line carrying box metrics.
    MeasurementReported(MeasurementResult),
    /// A tagged measurement line whose values could not be read.
    MalformedMeasurement(String),
    Warning(String),
    /// An engine error, with its context lines.
    FatalError(String),
    Unrecognized(String),
}

impl LogEvent {
    /// True for events that end a pending measurement query one way or another.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LogEvent::MeasurementReported(_)
                | LogEvent::MalformedMeasurement(_)
                | LogEvent::FatalError(_)
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogEvent::FatalError(_))
    }
}
