use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use shared::shared_wheel_game::Submission;
use tracing::debug;

use crate::request_context::RequestContext;

/// Durable destination for captured leads.
pub trait LeadSink: Send + Sync {
    fn save<'a>(&'a self, submission: &'a Submission) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// Ad platform conversion reporting. Best-effort: implementations log their
/// own failures and only report what got through.
pub trait ConversionSink: Send + Sync {
    fn track<'a>(
        &'a self,
        email: &'a str,
        prize_amount: u32,
        context: &'a RequestContext,
    ) -> BoxFuture<'a, TrackingOutcome>;

    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingOutcome {
    pub lead_sent: bool,
    pub purchase_sent: bool,
}

#[derive(Clone)]
pub struct Sinks {
    pub lead: Arc<dyn LeadSink>,
    pub conversion: Arc<dyn ConversionSink>,
}

#[derive(Debug)]
pub enum SinkError {
    NotConfigured(&'static str),
    Http(reqwest::Error),
    Auth(jsonwebtoken::errors::Error),
    InvalidUrl(String),
    Api { status: u16, body: String },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured(what) => write!(f, "{} is not configured", what),
            Self::Http(e) => write!(f, "HTTP error: {}", e),
            Self::Auth(e) => write!(f, "Service account signing error: {}", e),
            Self::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            Self::Api { status, body } => write!(f, "API responded {}: {}", status, body),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<jsonwebtoken::errors::Error> for SinkError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Auth(err)
    }
}

/// Turns a non-2xx response into `SinkError::Api`, keeping the body for the logs.
pub async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Api { status: status.as_u16(), body })
}

/// Lead sink used when no spreadsheet is configured; every save fails so the
/// caller sees the missing configuration instead of silently losing leads.
pub struct UnconfiguredLeadSink;

impl LeadSink for UnconfiguredLeadSink {
    fn save<'a>(&'a self, _submission: &'a Submission) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async { Err(SinkError::NotConfigured("Google Sheets")) })
    }
}

pub struct NoopConversionSink;

impl ConversionSink for NoopConversionSink {
    fn track<'a>(
        &'a self,
        _email: &'a str,
        prize_amount: u32,
        _context: &'a RequestContext,
    ) -> BoxFuture<'a, TrackingOutcome> {
        Box::pin(async move {
            debug!("Conversion tracking disabled, skipping prize {} lead", prize_amount);
            TrackingOutcome::default()
        })
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
