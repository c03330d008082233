/// Verdict of a checker about a code address.
#[derive(Clone, Debug)]
pub struct CheckerVerdict {
    /// Whether the address is a valid place for execution to be.
    pub is_valid: bool,

    /// Explanation supplied by the checker when the address is flagged.
    pub description: Option<String>,
}

impl CheckerVerdict {
    /// Verdict for an address no checker objects to.
    pub const fn valid() -> Self {
        Self {
            is_valid: true,
            description: None,
        }
    }

    /// Verdict flagging the address, with explanatory text.
    pub fn violation(description: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            description: Some(description.into()),
        }
    }
}

/// Trait implemented by pluggable validators of unsafe operation sites.
///
/// When a user-expression call halts, the engine asks the configured
/// registry whether the halt address is a location the checkers flag as
/// invalid (e.g., an instrumented fault site), so the user sees a precise
/// explanation rather than a generic fault. Having no registry configured
/// is not an error; the stop reason then passes through unchanged.
pub trait CheckerRegistry {
    /// Returns the checkers' verdict about the given code address.
    fn check_address(&self, addr: u64) -> CheckerVerdict;
}
