use thiserror::Error;

/// Errors reported by event operations and by the execution engines they drive.
///
/// Every error is detected synchronously by the call that returns it. Nothing is retried on
/// the caller's behalf: [`Error::NotReady`] in particular is informational and the caller
/// decides whether to poll again or block.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied a value that cannot be accepted, such as unrecognized or
    /// conflicting event creation flags.
    #[error("invalid value: {problem}")]
    InvalidValue {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// The event handle is unknown, has been destroyed, or the operation needs information
    /// the event cannot provide (e.g. it was never recorded or does not capture timing).
    #[error("invalid handle: {problem}")]
    InvalidHandle {
        /// A human-readable description of the problem.
        problem: &'static str,
    },

    /// The operation requires the work captured by an event to be complete but it is not.
    #[error("the work captured by the event has not completed yet")]
    NotReady,

    /// Storage for a new object could not be obtained.
    #[error("out of memory: {problem}")]
    OutOfMemory {
        /// A human-readable description of the problem.
        problem: &'static str,
    },

    /// A queue could not be made to progress or to accept new commands.
    #[error("resource exhausted: {problem}")]
    ResourceExhausted {
        /// A human-readable description of the problem.
        problem: &'static str,
    },
}

/// A specialized `Result` type for event operations, returning the crate's [`Error`] type as
/// the error value.
pub type Result<T> = std::result::Result<T, Error>;
