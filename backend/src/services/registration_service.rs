use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use shared::shared_wheel_game::{SessionError, SpinSession, Submission};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Level};

use crate::request_context::RequestContext;
use crate::services::sinks::{SinkError, Sinks, TrackingOutcome};

#[derive(Debug)]
pub enum RegistrationError {
    Session(SessionError),
    LeadCapture(SinkError),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(e) => write!(f, "{}", e),
            Self::LeadCapture(e) => write!(f, "Failed to capture lead: {}", e),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session(e) => Some(e),
            Self::LeadCapture(e) => Some(e),
        }
    }
}

impl From<SessionError> for RegistrationError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

pub struct RegistrationOutcome {
    pub submission: Submission,
    /// Conversion reporting keeps running after the response is sent; await
    /// this only when the outcome matters.
    pub tracking: JoinHandle<TrackingOutcome>,
}

/// Level for the line logged once conversion reporting finishes. A disabled
/// sink was already announced at start-up.
pub fn tracking_log_level(outcome: TrackingOutcome, sink_enabled: bool) -> Level {
    if outcome.lead_sent && outcome.purchase_sent {
        Level::INFO
    } else if sink_enabled {
        Level::WARN
    } else {
        Level::DEBUG
    }
}

/// Reports the lead to the conversion sink on its own task. Never retried,
/// failures only show up in the logs.
pub fn spawn_conversion_tracking(
    sinks: &Sinks,
    submission: &Submission,
    context: &RequestContext,
) -> JoinHandle<TrackingOutcome> {
    let sink = Arc::clone(&sinks.conversion);
    let email = submission.email.clone();
    let prize_amount = submission.prize_amount;
    let context = context.clone();

    tokio::spawn(async move {
        let outcome = sink.track(&email, prize_amount, &context).await;
        let level = tracking_log_level(outcome, sink.is_enabled());
        if level == Level::INFO {
            info!("Conversion events sent for a prize of {}", prize_amount);
        } else if level == Level::WARN {
            warn!(
                "Conversion tracking incomplete for a prize of {} (lead: {}, purchase: {})",
                prize_amount, outcome.lead_sent, outcome.purchase_sent
            );
        } else {
            debug!("Conversion tracking disabled, prize {} not reported", prize_amount);
        }
        outcome
    })
}

/// Stores the submission with the lead sink and, only once it is stored,
/// reports it to the conversion sink. A failed save reports nothing, so a
/// retry never produces duplicate conversions.
pub async fn capture_lead(
    submission: &Submission,
    context: &RequestContext,
    sinks: &Sinks,
) -> Result<JoinHandle<TrackingOutcome>, SinkError> {
    sinks.lead.save(submission).await?;
    Ok(spawn_conversion_tracking(sinks, submission, context))
}

/// Registers `email` against a resolved session.
///
/// The session only becomes `Registered` once the lead sink has stored the
/// submission. When the lead sink fails the session stays `Resolved` so the
/// user can submit again, and nothing has been reported for that attempt.
pub async fn register(
    session: &mut SpinSession,
    email: &str,
    birthday: Option<NaiveDate>,
    context: &RequestContext,
    sinks: &Sinks,
) -> Result<RegistrationOutcome, RegistrationError> {
    let submission = session.prepare_registration(email, birthday, context.client.clone(), Utc::now())?;

    let tracking = capture_lead(&submission, context, sinks)
        .await
        .map_err(RegistrationError::LeadCapture)?;

    session.mark_registered(submission.clone())?;
    info!("Registered a prize of {}", submission.prize_amount);
    Ok(RegistrationOutcome { submission, tracking })
}
