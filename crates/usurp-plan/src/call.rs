/// Description of a function call to inject into a stopped thread.
///
/// The trampoline the call returns through is assumed to be already
/// materialized in target memory by the expression compiler; only its
/// sentinel return address is needed here, so the call plan can recognize
/// completion.
#[derive(Clone, Debug)]
pub struct CallDescriptor {
    function_addr: u64,
    return_site: u64,
    args: Vec<u64>,
    receiver_arg: Option<u64>,
    selector_arg: Option<u64>,
    stop_other_threads: bool,
    discard_on_error: bool,
}

impl CallDescriptor {
    /// Creates a descriptor for calling the function at `function_addr`,
    /// returning through the sentinel at `return_site`.
    ///
    /// Defaults: no arguments, other threads keep running, errors are not
    /// tolerated (an unexpected stop leaves the call plan active).
    pub const fn new(function_addr: u64, return_site: u64) -> Self {
        Self {
            function_addr,
            return_site,
            args: Vec::new(),
            receiver_arg: None,
            selector_arg: None,
            stop_other_threads: false,
            discard_on_error: false,
        }
    }

    /// Appends a positional argument value.
    pub fn arg(mut self, value: u64) -> Self {
        self.args.push(value);
        self
    }

    /// Sets the implicit receiver argument (passed before every
    /// positional argument).
    pub const fn receiver(mut self, value: u64) -> Self {
        self.receiver_arg = Some(value);
        self
    }

    /// Sets the implicit selector argument (passed after the receiver,
    /// before every positional argument).
    pub const fn selector(mut self, value: u64) -> Self {
        self.selector_arg = Some(value);
        self
    }

    /// Sets whether every other thread is held stopped for the duration
    /// of the call.
    pub const fn stop_other_threads(mut self, stop: bool) -> Self {
        self.stop_other_threads = stop;
        self
    }

    /// Sets whether an unexpected stop during the call aborts it cleanly
    /// (restoring the thread) instead of leaving the plan active.
    pub const fn discard_on_error(mut self, discard: bool) -> Self {
        self.discard_on_error = discard;
        self
    }

    /// Returns the address of the function to call.
    pub const fn function_addr(&self) -> u64 {
        self.function_addr
    }

    /// Returns the sentinel return address of the call.
    pub const fn return_site(&self) -> u64 {
        self.return_site
    }

    /// Returns whether other threads are held stopped during the call.
    pub const fn stops_other_threads(&self) -> bool {
        self.stop_other_threads
    }

    /// Returns whether an unexpected stop aborts the call cleanly.
    pub const fn discards_on_error(&self) -> bool {
        self.discard_on_error
    }

    /// Returns the effective argument values, in calling-convention
    /// order: receiver, selector, then positional arguments.
    pub fn effective_args(&self) -> Vec<u64> {
        let mut args = Vec::with_capacity(self.args.len() + 2);

        if let Some(receiver) = self.receiver_arg {
            args.push(receiver);
        }

        if let Some(selector) = self.selector_arg {
            args.push(selector);
        }

        args.extend_from_slice(&self.args);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::CallDescriptor;

    #[test]
    fn effective_args_order_receiver_then_selector() {
        let descriptor = CallDescriptor::new(0x1000, 0x2000)
            .arg(1)
            .arg(2)
            .selector(0xcafe)
            .receiver(0xbeef);

        assert_eq!(descriptor.effective_args(), vec![0xbeef, 0xcafe, 1, 2]);
    }

    #[test]
    fn effective_args_without_implicit_args() {
        let descriptor = CallDescriptor::new(0x1000, 0x2000).arg(7);

        assert_eq!(descriptor.effective_args(), vec![7]);
    }
}
