pub mod capture;
pub mod driver;
pub mod form;
pub mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use capture::{CapturedResponse, ResponseMatcher, redact_secrets};
pub use driver::{DriverFactory, PortalDriver};
pub use http::{HttpDriver, HttpDriverFactory};
