use crate::envelope::LiveUpdateEnvelope;
use crate::scope::Scope;

/// Fire-and-forget delivery of an envelope to every connection in `scope`.
///
/// Implementations must not block on recipients and must not fail: per-
/// recipient problems are logged and swallowed. The return value is the
/// number of connections the envelope was handed to.
pub trait LivePublisher: Send + Sync {
    fn publish(&self, scope: Scope, envelope: LiveUpdateEnvelope) -> usize;
}
