/// Why a thread is currently stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReasonKind {
    /// The thread is not stopped for any reportable reason.
    None,

    /// A breakpoint was hit.
    Breakpoint,

    /// A watchpoint was hit.
    Watchpoint,

    /// A single-step completed.
    StepCompleted,

    /// A signal was received.
    Signal,

    /// An injected function call returned.
    CallReturn,

    /// A checker flagged the stop site as an unsafe operation.
    CheckerViolation,
}

/// Reason a thread is stopped, as surfaced to the client.
///
/// Produced once per stop event; a plan may override it with one carrying
/// more specific diagnostic content before it reaches the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopReason {
    kind: StopReasonKind,
    description: Option<String>,
}

impl StopReason {
    /// Creates a stop reason of the given kind, without description.
    pub const fn new(kind: StopReasonKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    /// Creates a stop reason of the given kind and description.
    pub fn with_description(kind: StopReasonKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: Some(description.into()),
        }
    }

    /// Returns the kind of this stop reason.
    pub const fn kind(&self) -> StopReasonKind {
        self.kind
    }

    /// Replaces the kind of this stop reason, keeping the description.
    pub const fn set_kind(&mut self, kind: StopReasonKind) {
        self.kind = kind;
    }

    /// Returns the description of this stop reason, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Merges diagnostic text into the description.
    ///
    /// Existing text is kept; the new text is joined after it.
    pub fn append_description(&mut self, text: impl AsRef<str>) {
        match self.description.as_mut() {
            Some(description) => {
                description.push_str(": ");
                description.push_str(text.as_ref());
            }
            None => self.description = Some(text.as_ref().to_owned()),
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.kind {
            StopReasonKind::None => "none",
            StopReasonKind::Breakpoint => "breakpoint",
            StopReasonKind::Watchpoint => "watchpoint",
            StopReasonKind::StepCompleted => "step completed",
            StopReasonKind::Signal => "signal",
            StopReasonKind::CallReturn => "call returned",
            StopReasonKind::CheckerViolation => "checker violation",
        };

        match self.description.as_deref() {
            Some(description) => write!(f, "{tag} ({description})"),
            None => f.write_str(tag),
        }
    }
}
