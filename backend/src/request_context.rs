use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Uri};
use cookie::Cookie;
use shared::shared_wheel_game::ClientInfo;

/// Everything the sinks want to know about the request that produced a lead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub client: ClientInfo,
    pub referer: Option<String>,
    /// Facebook click id, `fb.1.<ms>.<fbclid>`
    pub fbc: Option<String>,
    /// Facebook browser id
    pub fbp: Option<String>,
}

impl RequestContext {
    pub fn from_parts(headers: &HeaderMap, uri: &Uri) -> Self {
        Self::from_parts_at(headers, uri, chrono::Utc::now().timestamp_millis())
    }

    pub fn from_parts_at(headers: &HeaderMap, uri: &Uri, now_ms: i64) -> Self {
        let fbc = uri
            .query()
            .and_then(|query| query.split('&').find_map(|pair| pair.strip_prefix("fbclid=")))
            .filter(|fbclid| !fbclid.is_empty())
            .map(|fbclid| format!("fb.1.{}.{}", now_ms, fbclid))
            .or_else(|| cookie_value(headers, "_fbc"));

        Self {
            client: ClientInfo {
                client_ip: client_ip(headers),
                user_agent: header_string(headers, header::USER_AGENT.as_str()),
            },
            referer: header_string(headers, header::REFERER.as_str()),
            fbc,
            fbp: cookie_value(headers, "_fbp"),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.headers, &parts.uri))
    }
}

/// Client IP from proxy headers: first `x-forwarded-for` hop, then
/// `x-real-ip`, then `cf-connecting-ip`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = header_string(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|hop| !hop.is_empty()) {
            return Some(first.to_string());
        }
    }
    header_string(headers, "x-real-ip").or_else(|| header_string(headers, "cf-connecting-ip"))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value.to_string()))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
