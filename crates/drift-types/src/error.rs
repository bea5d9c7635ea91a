use thiserror::Error;

/// Error taxonomy for engine operations. Every failure is a synchronous
/// return value; partner-side events (skip, disconnect, report) are
/// delivered as `PartnerLeft` events, never as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Operation not valid for the current client or session state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Actor is not a member of the target session
    #[error("not a member of this session")]
    NotAuthorized,

    /// Target session is already ending or ended
    #[error("session is closed")]
    SessionClosed,

    /// Operation requires an active pairing
    #[error("not currently paired")]
    NotPaired,

    /// Rejected input (empty message text, empty report reason)
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Receiver's delivery queue is full (non-blocking configuration)
    #[error("delivery queue full")]
    Overflow,
}
