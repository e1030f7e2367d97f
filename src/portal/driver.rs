use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::portal::capture::{CapturedResponse, ResponseMatcher};
use crate::types::{AccessCode, Credential};

/// One isolated automation context against the portal.
///
/// Real implementation: [`crate::portal::HttpDriver`]. Tests use scripted
/// doubles. A driver is owned by exactly one [`crate::session::Session`],
/// which enforces call order and timeouts; drivers themselves only perform
/// the network work.
#[async_trait]
pub trait PortalDriver: Send {
    /// Sign in with `credential`. Fails with `PipelineError::Auth` when the
    /// portal stays on the sign-in page or redirects somewhere unexpected.
    async fn login(&mut self, credential: &Credential) -> Result<(), PipelineError>;

    /// Redeem one access code. Fails with `PipelineError::CodeRejected` when
    /// the portal sends the session back to a login or verification page.
    async fn redeem_code(&mut self, code: &AccessCode) -> Result<(), PipelineError>;

    /// Resolve with the next response matching `matcher` that has not been
    /// handed out yet. May wait indefinitely; callers bound it.
    async fn next_response(
        &mut self,
        matcher: &ResponseMatcher,
    ) -> Result<CapturedResponse, PipelineError>;

    /// Everything captured so far, in arrival order.
    fn captures(&self) -> &[CapturedResponse];

    /// Release all context resources. Must be idempotent.
    async fn close(&mut self);
}

/// Creates drivers. Every call must return a context that shares no cookies,
/// connections or other state with any driver created before it.
pub trait DriverFactory: Send + Sync {
    fn new_driver(&self, label: &str) -> Result<Box<dyn PortalDriver>, PipelineError>;
}
