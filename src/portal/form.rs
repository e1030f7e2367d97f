//! Minimal HTML scanning for the portal's server-rendered pages.
//!
//! The portal's login and access-code pages are plain forms, so a handful of
//! regexes is enough: find `<form>` blocks, read their `id`/`action`, and
//! collect named `<input>` values (hidden CSRF fields included).

use regex::Regex;
use reqwest::Url;
use serde_json::Value;
use std::sync::LazyLock;

static FORM_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form>").unwrap());

static INPUT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<input\b([^>]*)>").unwrap());

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.\[\]]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .unwrap()
});

/// A parsed `<form>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlForm {
    pub id: Option<String>,
    pub action: Option<String>,
    /// Named inputs in document order, values entity-decoded.
    pub fields: Vec<(String, String)>,
}

impl HtmlForm {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Set `name` to `value`, replacing an existing field or appending one.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    /// Add `name` only when the form does not already carry it.
    pub fn set_default(&mut self, name: &str, value: &str) {
        if !self.has_field(name) {
            self.fields.push((name.to_string(), value.to_string()));
        }
    }

    /// First field whose name satisfies `pred`.
    pub fn field_name_where(&self, pred: impl Fn(&str) -> bool) -> Option<String> {
        self.fields
            .iter()
            .map(|(n, _)| n.as_str())
            .find(|n| pred(n))
            .map(str::to_string)
    }
}

/// Every `<form>` in `html`, in document order.
pub fn find_forms(html: &str) -> Vec<HtmlForm> {
    FORM_BLOCK
        .captures_iter(html)
        .map(|caps| {
            let attrs = parse_attributes(&caps[1]);
            let fields = INPUT_TAG
                .captures_iter(&caps[2])
                .filter_map(|input| {
                    let attrs = parse_attributes(&input[1]);
                    let name = attr(&attrs, "name")?;
                    let value = attr(&attrs, "value").unwrap_or_default();
                    Some((name, value))
                })
                .collect();
            HtmlForm {
                id: attr(&attrs, "id"),
                action: attr(&attrs, "action"),
                fields,
            }
        })
        .collect()
}

/// The login form: by id, else by an action mentioning sign-in/session, else
/// any form with a password field.
pub fn find_login_form(html: &str) -> Option<HtmlForm> {
    let forms = find_forms(html);
    let by_id = forms
        .iter()
        .position(|f| f.id.as_deref() == Some("patient-signin-form"));
    let by_action = || {
        forms.iter().position(|f| {
            f.action
                .as_deref()
                .is_some_and(|a| a.contains("sign_in") || a.contains("session"))
        })
    };
    let by_password = || {
        forms
            .iter()
            .position(|f| f.field_name_where(|n| n.to_ascii_lowercase().contains("password")).is_some())
    };
    let index = by_id.or_else(by_action).or_else(by_password)?;
    forms.into_iter().nth(index)
}

/// The access-code redemption form.
pub fn find_access_code_form(html: &str) -> Option<HtmlForm> {
    find_forms(html).into_iter().find(|f| {
        f.id.as_deref() == Some("program-access-token")
            || f.action
                .as_deref()
                .is_some_and(|a| a.contains("register_token"))
    })
}

/// Whether `html` still shows a login form with a username field.
pub fn shows_login_form(html: &str) -> bool {
    find_login_form(html).is_some_and(|f| {
        f.field_name_where(|n| n.contains("username") || n.contains("login"))
            .is_some()
    })
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn attr(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#x2F;", "/")
        .replace("&#43;", "+")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Which identifier a page hint carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Episode,
    Program,
}

impl IdKind {
    pub fn query_param(self) -> &'static str {
        match self {
            IdKind::Episode => "episode_id",
            IdKind::Program => "program_id",
        }
    }
}

/// An episode/program id found in page source or the page URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdHint {
    pub kind: IdKind,
    pub id: u64,
}

static EPISODE_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""episode_id"\s*:\s*(\d+)"#,
        r#"'episode_id'\s*:\s*(\d+)"#,
        r#"episode_id["']?\s*[:=]\s*["']?(\d+)"#,
        r#""episodeId"\s*:\s*(\d+)"#,
        r#"data-episode-id=["'](\d+)["']"#,
        r#"[?&]episode_id=(\d+)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static PROGRAM_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""program_id"\s*:\s*(\d+)"#,
        r#"'program_id'\s*:\s*(\d+)"#,
        r#""programId"\s*:\s*(\d+)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Look for an episode id first, then a program id.
pub fn scrape_id_hint(html: &str, page_url: &str) -> Option<IdHint> {
    let text = format!("{}\n{}", html, page_url);
    let first = |patterns: &[Regex]| {
        patterns.iter().find_map(|re| {
            re.captures(&text)
                .and_then(|caps| caps[1].parse::<u64>().ok())
        })
    };
    first(EPISODE_ID_PATTERNS.as_slice())
        .map(|id| IdHint {
            kind: IdKind::Episode,
            id,
        })
        .or_else(|| {
            first(PROGRAM_ID_PATTERNS.as_slice()).map(|id| IdHint {
                kind: IdKind::Program,
                id,
            })
        })
}

/// Id carried by a JSON code-submission response: `episode_id`,
/// `episode.id`, then `program_id`, `program.id`.
pub fn hint_from_json(body: &[u8]) -> Option<IdHint> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let episode = value
        .get("episode_id")
        .or_else(|| value.pointer("/episode/id"))
        .and_then(as_id)
        .map(|id| IdHint {
            kind: IdKind::Episode,
            id,
        });
    episode.or_else(|| {
        value
            .get("program_id")
            .or_else(|| value.pointer("/program/id"))
            .and_then(as_id)
            .map(|id| IdHint {
                kind: IdKind::Program,
                id,
            })
    })
}

/// Episode id in a redirect target's query or fragment.
pub fn hint_from_redirect(target: &Url) -> Option<IdHint> {
    // Read the fragment with the same decoder as the query.
    let mut fragment = target.clone();
    fragment.set_query(target.fragment());
    let pairs: Vec<(String, String)> = target
        .query_pairs()
        .chain(fragment.query_pairs())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    ["episode_id", "episode_id[]", "id"].iter().find_map(|key| {
        pairs
            .iter()
            .filter(|(k, _)| k.as_str() == *key)
            .find_map(|(_, v)| v.parse().ok())
            .map(|id| IdHint {
                kind: IdKind::Episode,
                id,
            })
    })
}

/// The episode id when an episodes listing holds exactly one episode.
pub fn single_episode_id(body: &[u8]) -> Option<u64> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("episodes")?.as_array()?.as_slice() {
        [only] => only.get("id").and_then(as_id),
        _ => None,
    }
}

fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
