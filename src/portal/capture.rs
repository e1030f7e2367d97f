//! Network response capture and secret redaction.
//!
//! Every response a driver sees is recorded as a [`CapturedResponse`]. The
//! extractor consumes the data-endpoint capture; the rest only feed the
//! optional diagnostics sink, which must never see raw tokens.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;

/// One response observed by a portal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub body: Vec<u8>,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

impl CapturedResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("json"))
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Selects the response the extractor waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    pub url_contains: String,
    pub status: u16,
}

impl ResponseMatcher {
    pub fn new(url_contains: impl Into<String>) -> Self {
        Self {
            url_contains: url_contains.into(),
            status: 200,
        }
    }

    pub fn matches(&self, response: &CapturedResponse) -> bool {
        response.status == self.status && response.url.contains(&self.url_contains)
    }
}

static JWT_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(window\.jwt\s*=\s*")[^"]+(")"#).unwrap());

static CSRF_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"((?:name|id)=['"](?:X-CSRF-Token|authenticity_token)['"][^>]*value=['"])[^'"]+(['"])"#)
        .unwrap()
});

static CSRF_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<meta[^>]*name=['"]csrf-token['"][^>]*content=['"])[^'"]+(['"])"#).unwrap()
});

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(Bearer\s+)[A-Za-z0-9\-_=.]+()").unwrap());

/// Replace bearer-like tokens and CSRF values with `<REDACTED>`.
pub fn redact_secrets(text: &str) -> String {
    let mut out = text.to_string();
    for re in [&*JWT_ASSIGNMENT, &*CSRF_INPUT, &*CSRF_META, &*BEARER] {
        out = re.replace_all(&out, "${1}<REDACTED>${2}").into_owned();
    }
    out
}
