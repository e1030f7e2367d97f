//! One isolated portal session, bound to at most one access code.
//!
//! A [`Session`] owns its driver exclusively and walks a fixed state machine:
//!
//! ```text
//! Fresh --login--> Authenticated --submit_code--> Bound --close--> Closed
//! ```
//!
//! A session accepts exactly one code submission. Whether that submission
//! succeeded or not, the session is spent for code purposes; a second
//! `submit_code` is refused before it reaches the portal.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::portal::{CapturedResponse, DriverFactory, PortalDriver, ResponseMatcher};
use crate::types::{AccessCode, Credential};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Fresh,
    Authenticated,
    Bound,
    Closed,
}

pub struct Session {
    label: String,
    driver: Box<dyn PortalDriver>,
    state: SessionState,
    code_submitted: bool,
    step_timeout: Duration,
}

impl Session {
    /// Open a fresh, unauthenticated session from `factory`.
    pub fn open(
        factory: &dyn DriverFactory,
        label: &str,
        step_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let driver = factory.new_driver(label)?;
        debug!(label, "session opened");
        Ok(Self {
            label: label.to_string(),
            driver,
            state: SessionState::Fresh,
            code_submitted: false,
            step_timeout,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn login(&mut self, credential: &Credential) -> Result<(), PipelineError> {
        if self.state != SessionState::Fresh {
            return Err(PipelineError::SessionMisuse(format!(
                "login requires a fresh session, state is {:?}",
                self.state
            )));
        }
        bounded("login", self.step_timeout, self.driver.login(credential)).await?;
        self.state = SessionState::Authenticated;
        Ok(())
    }

    pub async fn submit_code(&mut self, code: &AccessCode) -> Result<(), PipelineError> {
        if self.code_submitted {
            return Err(PipelineError::SessionMisuse(
                "an access code was already submitted in this session".to_string(),
            ));
        }
        if self.state != SessionState::Authenticated {
            return Err(PipelineError::SessionMisuse(format!(
                "submit_code requires an authenticated session, state is {:?}",
                self.state
            )));
        }
        self.code_submitted = true;
        bounded(
            "submit_code",
            self.step_timeout,
            self.driver.redeem_code(code),
        )
        .await?;
        self.state = SessionState::Bound;
        Ok(())
    }

    /// Wait for the next unconsumed response matching `matcher`. Unbounded;
    /// the extractor applies its own deadline.
    pub async fn await_response(
        &mut self,
        matcher: &ResponseMatcher,
    ) -> Result<CapturedResponse, PipelineError> {
        if self.state != SessionState::Bound {
            return Err(PipelineError::SessionMisuse(format!(
                "extraction requires a code-bound session, state is {:?}",
                self.state
            )));
        }
        self.driver.next_response(matcher).await
    }

    pub fn captures(&self) -> &[CapturedResponse] {
        self.driver.captures()
    }

    /// Release the driver and hand back everything it captured.
    pub async fn close(mut self) -> Vec<CapturedResponse> {
        self.driver.close().await;
        self.state = SessionState::Closed;
        debug!(label = %self.label, "session closed");
        self.driver.captures().to_vec()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            warn!(label = %self.label, state = ?self.state, "session dropped without close");
        }
    }
}

async fn bounded<T>(
    step: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PipelineError::StepTimeout {
            step,
            waited: limit,
        })?
}
