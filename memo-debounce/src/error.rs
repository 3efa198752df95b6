/// Errors raised while constructing a debouncer or a memoized function
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No Tokio runtime available to drive {0} timers")]
    NoRuntime(&'static str),
}

/// Ways a debounced call can settle without a value
#[derive(Debug, thiserror::Error)]
pub enum DebounceError<E> {
    #[error("Debounced function failed: {0}")]
    Call(#[source] E),
    #[error("Debounced call was superseded or cancelled")]
    Abandoned,
    #[error("Debounced function panicked")]
    Panicked,
}

impl<E> DebounceError<E> {
    /// The wrapped function's own error, if that is what this is
    pub fn into_call_error(self) -> Option<E> {
        match self {
            DebounceError::Call(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, DebounceError::Abandoned)
    }
}
