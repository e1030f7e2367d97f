//! Cookie-isolated HTTP driver for the portal's discovered flow.
//!
//! Each [`HttpDriver`] owns a private `reqwest::Client` with its own cookie
//! store and connection pool, so two drivers can never share a portal
//! session. The flow mirrors what the portal's own pages do:
//!
//! 1. GET the sign-in page, fill the login form (keeping hidden CSRF fields), POST it.
//! 2. GET the access-code page, fill `token`, POST it and follow the redirects
//!    by hand, reading the episode id from the first place that carries one.
//! 3. GET the data endpoint the home page script calls, polling until it answers.

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, LOCATION,
};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, Url};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::PortalEndpoints;
use crate::errors::PipelineError;
use crate::portal::capture::{CapturedResponse, ResponseMatcher};
use crate::portal::driver::{DriverFactory, PortalDriver};
use crate::portal::form::{
    IdHint, IdKind, find_access_code_form, find_login_form, hint_from_json, hint_from_redirect,
    scrape_id_hint, shows_login_form, single_episode_id,
};
use crate::types::{AccessCode, Credential};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_REDIRECTS: usize = 10;

/// Builds one fresh [`HttpDriver`] per program.
#[derive(Debug, Clone)]
pub struct HttpDriverFactory {
    endpoints: Arc<PortalEndpoints>,
    request_timeout: Duration,
    poll_interval: Duration,
    visible: bool,
}

impl HttpDriverFactory {
    pub fn new(endpoints: PortalEndpoints, request_timeout: Duration) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            request_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            visible: false,
        }
    }

    /// Log every navigation at info level instead of debug.
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl DriverFactory for HttpDriverFactory {
    fn new_driver(&self, label: &str) -> Result<Box<dyn PortalDriver>, PipelineError> {
        let driver = HttpDriver::new(
            label,
            Arc::clone(&self.endpoints),
            self.request_timeout,
            self.poll_interval,
            self.visible,
        )?;
        Ok(Box::new(driver))
    }
}

/// Two clients over one cookie jar: one follows redirects, one stops at them.
struct Clients {
    follow: Client,
    manual: Client,
}

pub struct HttpDriver {
    label: String,
    clients: Option<Clients>,
    endpoints: Arc<PortalEndpoints>,
    captures: Vec<CapturedResponse>,
    claimed: HashSet<usize>,
    id_hint: Option<IdHint>,
    poll_interval: Duration,
    visible: bool,
}

impl HttpDriver {
    pub fn new(
        label: &str,
        endpoints: Arc<PortalEndpoints>,
        request_timeout: Duration,
        poll_interval: Duration,
        visible: bool,
    ) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let jar = Arc::new(Jar::default());
        let build = |policy: Policy| {
            Client::builder()
                .cookie_provider(Arc::clone(&jar))
                .user_agent(endpoints.user_agent.clone())
                .default_headers(headers.clone())
                .redirect(policy)
                .timeout(request_timeout)
                .build()
        };
        let clients = Clients {
            follow: build(Policy::limited(MAX_REDIRECTS))?,
            manual: build(Policy::none())?,
        };

        Ok(Self {
            label: label.to_string(),
            clients: Some(clients),
            endpoints,
            captures: Vec::new(),
            claimed: HashSet::new(),
            id_hint: None,
            poll_interval,
            visible,
        })
    }

    fn client(&self) -> Result<&Client, PipelineError> {
        self.clients().map(|c| &c.follow)
    }

    fn clients(&self) -> Result<&Clients, PipelineError> {
        self.clients
            .as_ref()
            .ok_or_else(|| PipelineError::SessionMisuse("driver already closed".to_string()))
    }

    async fn fetch(
        &mut self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<CapturedResponse, PipelineError> {
        self.send(method, request).await.map(|(captured, _)| captured)
    }

    /// Send and capture one request. Also returns the `Location` of a
    /// redirect response.
    async fn send(
        &mut self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<(CapturedResponse, Option<String>), PipelineError> {
        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let content_type = header_str(response.headers(), CONTENT_TYPE);
        let location = header_str(response.headers(), LOCATION)
            .filter(|_| response.status().is_redirection());
        let body = response.bytes().await?.to_vec();

        let captured = CapturedResponse {
            method: method.to_string(),
            url,
            status,
            content_type,
            body,
            elapsed: started.elapsed(),
        };

        if self.visible {
            info!(label = %self.label, method, url = %captured.url, status, "navigated");
        } else {
            debug!(label = %self.label, method, url = %captured.url, status, "navigated");
        }

        self.captures.push(captured.clone());
        Ok((captured, location))
    }

    /// Follow redirects from a code submission one hop at a time, taking the
    /// first id hint a redirect target carries.
    async fn follow_code_redirects(
        &mut self,
        mut landed: CapturedResponse,
        mut location: Option<String>,
        hint: &mut Option<IdHint>,
    ) -> Result<CapturedResponse, PipelineError> {
        let mut hops = 0;
        while let Some(target) = location.take() {
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(PipelineError::CodeRejected {
                    reason: "code submission redirected too many times".to_string(),
                });
            }
            let next = Url::parse(&landed.url)
                .and_then(|from| from.join(&target))
                .map_err(|e| PipelineError::CodeRejected {
                    reason: format!("code submission redirected to an unparseable URL: {}", e),
                })?;
            if hint.is_none() {
                *hint = hint_from_redirect(&next);
            }
            let request = self.clients()?.manual.get(next);
            (landed, location) = self.send("GET", request).await?;
        }
        Ok(landed)
    }

    /// The account's only episode, when the episodes listing has exactly one.
    async fn current_episode(&mut self) -> Option<IdHint> {
        let request = self
            .client()
            .ok()?
            .get(self.endpoints.episodes.clone())
            .header(ACCEPT, "application/json");
        match self.fetch("GET", request).await {
            Ok(listing) if listing.status == 200 => {
                single_episode_id(&listing.body).map(|id| IdHint {
                    kind: IdKind::Episode,
                    id,
                })
            }
            Ok(listing) => {
                debug!(label = %self.label, status = listing.status, "episodes listing unavailable");
                None
            }
            Err(e) => {
                debug!(label = %self.label, error = %e, "episodes listing failed");
                None
            }
        }
    }

    fn take_unclaimed(&mut self, matcher: &ResponseMatcher) -> Option<CapturedResponse> {
        let index = self
            .captures
            .iter()
            .enumerate()
            .position(|(i, r)| !self.claimed.contains(&i) && matcher.matches(r))?;
        self.claimed.insert(index);
        Some(self.captures[index].clone())
    }

    fn data_url(&self) -> Url {
        let mut url = self.endpoints.data.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("old_versions", "1");
            if let Some(hint) = self.id_hint {
                query.append_pair(hint.kind.query_param(), &hint.id.to_string());
            }
        }
        url
    }

    fn is_path_under(url: &Url, prefix: &Url) -> bool {
        url.path().starts_with(prefix.path())
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Resolve a form's `action` against the page it came from.
fn resolve_action(page_url: &str, action: Option<&str>, fallback: &Url) -> Url {
    match action.filter(|a| !a.trim().is_empty()) {
        Some(action) => Url::parse(page_url)
            .and_then(|base| base.join(action))
            .unwrap_or_else(|_| fallback.clone()),
        None => fallback.clone(),
    }
}

#[async_trait]
impl PortalDriver for HttpDriver {
    async fn login(&mut self, credential: &Credential) -> Result<(), PipelineError> {
        let mut sign_in = self.endpoints.sign_in.clone();
        sign_in.query_pairs_mut().append_pair("set_sign_in", "true");
        let request = self.client()?.get(sign_in);
        let page = self.fetch("GET", request).await?;
        if page.status >= 400 {
            return Err(PipelineError::Auth {
                reason: format!("sign-in page returned HTTP {}", page.status),
            });
        }

        let mut form = find_login_form(&page.body_text()).ok_or_else(|| PipelineError::Auth {
            reason: "no login form on the sign-in page".to_string(),
        })?;
        let user_field = form
            .field_name_where(|n| n.contains("username") || n.contains("login"))
            .unwrap_or_else(|| "patient[username]".to_string());
        let pass_field = form
            .field_name_where(|n| n.to_ascii_lowercase().contains("password"))
            .unwrap_or_else(|| "patient[password]".to_string());
        form.set(&user_field, credential.username());
        form.set(&pass_field, credential.password());

        let action = resolve_action(&page.url, form.action.as_deref(), &self.endpoints.sign_in);
        let request = self.client()?.post(action).form(&form.fields);
        let landed = self.fetch("POST", request).await?;

        let landed_url = Url::parse(&landed.url).map_err(|e| PipelineError::Auth {
            reason: format!("login landed on an unparseable URL: {}", e),
        })?;
        if landed_url.host_str() != self.endpoints.base.host_str() {
            return Err(PipelineError::Auth {
                reason: format!(
                    "login redirected to unexpected host {}",
                    landed_url.host_str().unwrap_or("<none>")
                ),
            });
        }
        if Self::is_path_under(&landed_url, &self.endpoints.sign_in)
            || shows_login_form(&landed.body_text())
        {
            return Err(PipelineError::Auth {
                reason: "portal stayed on the sign-in page (check credentials)".to_string(),
            });
        }
        if landed.status >= 400 {
            return Err(PipelineError::Auth {
                reason: format!("login returned HTTP {}", landed.status),
            });
        }

        debug!(label = %self.label, "signed in");
        Ok(())
    }

    async fn redeem_code(&mut self, code: &AccessCode) -> Result<(), PipelineError> {
        let request = self.client()?.get(self.endpoints.access_code.clone());
        let page = self.fetch("GET", request).await?;
        let page_url = Url::parse(&page.url).ok();
        if page_url
            .as_ref()
            .is_some_and(|u| Self::is_path_under(u, &self.endpoints.sign_in))
        {
            return Err(PipelineError::CodeRejected {
                reason: "access-code page redirected to sign-in".to_string(),
            });
        }

        let mut form =
            find_access_code_form(&page.body_text()).ok_or_else(|| PipelineError::CodeRejected {
                reason: "no access-code form on the access-code page".to_string(),
            })?;
        form.set("token", code.as_str());
        form.set_default("verify_access_code", "Verify Access Code");

        let fallback = self
            .endpoints
            .base
            .join("/register_token")
            .unwrap_or_else(|_| self.endpoints.access_code.clone());
        let action = resolve_action(&page.url, form.action.as_deref(), &fallback);
        let request = self.clients()?.manual.post(action).form(&form.fields);
        let (posted, location) = self.send("POST", request).await?;
        let mut hint = if posted.is_json() {
            hint_from_json(&posted.body)
        } else {
            None
        };
        let landed = self.follow_code_redirects(posted, location, &mut hint).await?;

        let landed_url = Url::parse(&landed.url).map_err(|e| PipelineError::CodeRejected {
            reason: format!("code submission landed on an unparseable URL: {}", e),
        })?;
        let path = landed_url.path().to_string();
        if Self::is_path_under(&landed_url, &self.endpoints.sign_in)
            || Self::is_path_under(&landed_url, &self.endpoints.access_code)
            || path.contains("verify")
        {
            return Err(PipelineError::CodeRejected {
                reason: format!("portal returned to {}", path),
            });
        }
        if landed.status >= 400 {
            return Err(PipelineError::CodeRejected {
                reason: format!("code submission returned HTTP {}", landed.status),
            });
        }

        self.id_hint = match hint.or_else(|| scrape_id_hint(&landed.body_text(), &landed.url)) {
            Some(hint) => Some(hint),
            None => self.current_episode().await,
        };
        debug!(label = %self.label, code = %code.masked(), hint = ?self.id_hint, "access code accepted");
        Ok(())
    }

    async fn next_response(
        &mut self,
        matcher: &ResponseMatcher,
    ) -> Result<CapturedResponse, PipelineError> {
        loop {
            if let Some(found) = self.take_unclaimed(matcher) {
                return Ok(found);
            }

            let request = self
                .client()?
                .get(self.data_url())
                .header(ACCEPT, "application/json, text/plain, */*");
            let response = self.fetch("GET", request).await?;
            if matcher.matches(&response) {
                continue;
            }

            debug!(
                label = %self.label,
                status = response.status,
                "data endpoint not ready, polling"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn captures(&self) -> &[CapturedResponse] {
        &self.captures
    }

    async fn close(&mut self) {
        if self.clients.take().is_some() {
            debug!(label = %self.label, captured = self.captures.len(), "driver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalSection;

    fn endpoints() -> Arc<PortalEndpoints> {
        Arc::new(PortalEndpoints::from_section(&PortalSection::default()).unwrap())
    }

    fn driver() -> HttpDriver {
        HttpDriver::new(
            "knee",
            endpoints(),
            Duration::from_secs(5),
            Duration::from_millis(10),
            false,
        )
        .unwrap()
    }

    fn captured(url: &str, status: u16) -> CapturedResponse {
        CapturedResponse {
            method: "GET".into(),
            url: url.into(),
            status,
            content_type: None,
            body: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_resolve_action_relative_and_fallback() {
        let fallback = Url::parse("https://portal.test/sign_in").unwrap();
        let resolved = resolve_action("https://portal.test/sign_in?x=1", Some("/session"), &fallback);
        assert_eq!(resolved.as_str(), "https://portal.test/session");
        let resolved = resolve_action("https://portal.test/sign_in", None, &fallback);
        assert_eq!(resolved, fallback);
        let resolved = resolve_action("https://portal.test/sign_in", Some("  "), &fallback);
        assert_eq!(resolved, fallback);
    }

    #[test]
    fn test_data_url_includes_hint() {
        let mut d = driver();
        assert!(d.data_url().as_str().ends_with("episode_with_video_urls?old_versions=1"));
        d.id_hint = Some(IdHint {
            kind: IdKind::Episode,
            id: 42,
        });
        assert!(d.data_url().as_str().ends_with("?old_versions=1&episode_id=42"));
    }

    #[test]
    fn test_take_unclaimed_hands_out_each_response_once() {
        let mut d = driver();
        d.captures.push(captured("https://portal.test/", 200));
        d.captures.push(captured(
            "https://portal.test/api/v4/plus/episode/episode_with_video_urls",
            200,
        ));
        let matcher = ResponseMatcher::new("episode_with_video_urls");
        assert!(d.take_unclaimed(&matcher).is_some());
        assert!(d.take_unclaimed(&matcher).is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_further_use() {
        let mut d = driver();
        d.close().await;
        d.close().await;
        let err = d
            .redeem_code(&AccessCode::new("CODE1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SessionMisuse(_)));
    }

    #[test]
    fn test_factory_creates_independent_drivers() {
        let factory = HttpDriverFactory::new(
            PortalEndpoints::from_section(&PortalSection::default()).unwrap(),
            Duration::from_secs(5),
        );
        let a = factory.new_driver("knee").unwrap();
        let b = factory.new_driver("neck").unwrap();
        assert!(a.captures().is_empty());
        assert!(b.captures().is_empty());
    }
}
