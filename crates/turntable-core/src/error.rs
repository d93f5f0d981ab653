use thiserror::Error;

/// Error kinds shared across the workspace. Callers branch on the kind, so
/// each carries enough context to act without string matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No session, or a session nobody knows about. Reject, never retry.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// A lookup that legitimately came up empty (missing token, missing
    /// host, empty prediction set). 404-equivalent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Pin claim or a missing hardware collaborator. Fatal for the flow
    /// that needed it.
    #[error("hardware fault: {0}")]
    HardwareFault(String),

    /// A collaborator call (music provider, classifier) failed. Propagated
    /// to whatever triggered it, without retry.
    #[error("upstream failure: {0}")]
    Upstream(String),
}
