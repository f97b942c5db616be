use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::prize_table::{PrizeResolver, PrizeTable, FULL_CIRCLE};
use crate::validation::{validate_birthday, validate_email};

// Defaults for the spin animation the browser plays
pub const MIN_REVOLUTIONS: u32 = 5;
pub const SPIN_DURATION_MS: u64 = 10_000;
pub const SETTLE_DELAY_MS: u64 = 500;

/// Where a session is in the spin → resolve → register journey.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpinPhase {
    Idle,
    Spinning,
    Resolved,
    Registered,
}

impl SpinPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Spinning => "spinning",
            Self::Resolved => "resolved",
            Self::Registered => "registered",
        }
    }
}

impl fmt::Display for SpinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinConfig {
    pub min_revolutions: u32,
    pub spin_duration: Duration,
    pub settle_delay: Duration,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            min_revolutions: MIN_REVOLUTIONS,
            spin_duration: Duration::from_millis(SPIN_DURATION_MS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
        }
    }
}

impl SpinConfig {
    /// Time from the start of a spin until the prize may be resolved.
    pub fn time_to_resolve(&self) -> Duration {
        self.spin_duration + self.settle_delay
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    IllegalTransition { from: SpinPhase, action: &'static str },
    AlreadySpinning,
    StillSpinning,
    InvalidEmail,
    InvalidBirthday,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalTransition { from, action } => {
                write!(f, "cannot {} while the session is {}", action, from)
            }
            Self::AlreadySpinning => write!(f, "the wheel is already spinning"),
            Self::StillSpinning => write!(f, "the wheel has not stopped yet"),
            Self::InvalidEmail => write!(f, "invalid email format"),
            Self::InvalidBirthday => write!(f, "invalid birthday"),
        }
    }
}

impl std::error::Error for SessionError {}

/// What the HTTP layer knows about whoever is registering.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ClientInfo {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A captured lead, handed to the sinks once and then frozen on the session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Submission {
    pub email: String,
    pub prize_amount: u32,
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
}

impl Submission {
    /// Validates the raw form fields and stamps the record with `now`.
    pub fn new(
        email: &str,
        prize_amount: u32,
        birthday: Option<NaiveDate>,
        client: ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let email = email.trim();
        validate_email(email).map_err(|_| SessionError::InvalidEmail)?;
        if let Some(date) = birthday {
            validate_birthday(date, now.date_naive()).map_err(|_| SessionError::InvalidBirthday)?;
        }

        Ok(Self {
            email: email.to_string(),
            prize_amount,
            timestamp: now,
            client_ip: client.client_ip,
            user_agent: client.user_agent,
            birthday,
        })
    }
}

/// One user's interaction with the wheel, from the first spin to the email
/// registration. Phases only move forward; a second spin needs a new session.
pub struct SpinSession {
    phase: SpinPhase,
    terminal_angle: Option<f64>,
    prize_amount: Option<u32>,
    wheel_in_motion: bool,
    submission: Option<Submission>,
    resolver: Arc<dyn PrizeResolver>,
    config: SpinConfig,
}

impl fmt::Debug for SpinSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinSession")
            .field("phase", &self.phase)
            .field("terminal_angle", &self.terminal_angle)
            .field("prize_amount", &self.prize_amount)
            .field("wheel_in_motion", &self.wheel_in_motion)
            .field("submission", &self.submission)
            .field("config", &self.config)
            .finish()
    }
}

impl SpinSession {
    pub fn new(resolver: Arc<dyn PrizeResolver>, config: SpinConfig) -> Self {
        Self {
            phase: SpinPhase::Idle,
            terminal_angle: None,
            prize_amount: None,
            wheel_in_motion: false,
            submission: None,
            resolver,
            config,
        }
    }

    pub fn with_default_table() -> Self {
        Self::new(Arc::new(PrizeTable::default()), SpinConfig::default())
    }

    pub fn phase(&self) -> SpinPhase {
        self.phase
    }

    pub fn terminal_angle(&self) -> Option<f64> {
        self.terminal_angle
    }

    pub fn prize_amount(&self) -> Option<u32> {
        self.prize_amount
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn config(&self) -> &SpinConfig {
        &self.config
    }

    pub fn is_wheel_in_motion(&self) -> bool {
        self.wheel_in_motion
    }

    pub fn has_resolved(&self) -> bool {
        matches!(self.phase, SpinPhase::Resolved | SpinPhase::Registered)
    }

    /// Picks a uniformly random resting position in `[0, 360)` and adds the
    /// configured number of full revolutions on top.
    pub fn start_spin<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f64, SessionError> {
        self.check_can_start()?;
        let landing = rng.gen_range(0.0..FULL_CIRCLE);
        let angle = landing + FULL_CIRCLE * self.config.min_revolutions as f64;
        self.start_spin_at(angle)
    }

    /// Starts a spin that will come to rest at `terminal_angle`.
    pub fn start_spin_at(&mut self, terminal_angle: f64) -> Result<f64, SessionError> {
        self.check_can_start()?;
        self.phase = SpinPhase::Spinning;
        self.terminal_angle = Some(terminal_angle);
        self.prize_amount = None;
        self.wheel_in_motion = true;
        log::debug!("Spin started, terminal angle {}", terminal_angle);
        Ok(terminal_angle)
    }

    fn check_can_start(&self) -> Result<(), SessionError> {
        match self.phase {
            SpinPhase::Idle => Ok(()),
            SpinPhase::Spinning => Err(SessionError::AlreadySpinning),
            from => Err(SessionError::IllegalTransition { from, action: "start a spin" }),
        }
    }

    /// The wheel has visually come to rest.
    pub fn finish_spin(&mut self) -> Result<(), SessionError> {
        match self.phase {
            SpinPhase::Idle => Err(SessionError::IllegalTransition {
                from: SpinPhase::Idle,
                action: "finish a spin",
            }),
            SpinPhase::Spinning => {
                self.wheel_in_motion = false;
                Ok(())
            }
            SpinPhase::Resolved | SpinPhase::Registered => Ok(()),
        }
    }

    /// Binds the prize for the current spin. Once resolved, further calls hand
    /// back the bound prize without consulting the resolver again.
    pub fn complete_spin(&mut self) -> Result<u32, SessionError> {
        match (self.phase, self.prize_amount) {
            (SpinPhase::Resolved | SpinPhase::Registered, Some(amount)) => Ok(amount),
            (SpinPhase::Spinning, _) if self.wheel_in_motion => Err(SessionError::StillSpinning),
            (SpinPhase::Spinning, _) => {
                let angle = self.terminal_angle.unwrap_or_default();
                let amount = self.resolver.resolve_prize(angle);
                self.prize_amount = Some(amount);
                self.phase = SpinPhase::Resolved;
                log::info!("Spin resolved at {} degrees for a prize of {}", angle, amount);
                Ok(amount)
            }
            (from, _) => Err(SessionError::IllegalTransition { from, action: "complete a spin" }),
        }
    }

    /// Builds the submission for a registration attempt without changing the
    /// session; a rejected email leaves the session exactly as it was.
    pub fn prepare_registration(
        &self,
        email: &str,
        birthday: Option<NaiveDate>,
        client: ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<Submission, SessionError> {
        let amount = match (self.phase, self.prize_amount) {
            (SpinPhase::Resolved, Some(amount)) => amount,
            (from, _) => return Err(SessionError::IllegalTransition { from, action: "register" }),
        };
        Submission::new(email, amount, birthday, client, now)
    }

    /// Commits the registration once the lead has been captured.
    pub fn mark_registered(&mut self, submission: Submission) -> Result<(), SessionError> {
        if self.phase != SpinPhase::Resolved {
            return Err(SessionError::IllegalTransition { from: self.phase, action: "register" });
        }
        self.phase = SpinPhase::Registered;
        self.submission = Some(submission);
        Ok(())
    }
}

// === API Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct NewSpinResponse {
    pub session_id: String,
    pub phase: SpinPhase,
    pub terminal_angle: f64,
    pub spin_duration_ms: u64,
    pub settle_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpinStatusResponse {
    pub session_id: String,
    pub phase: SpinPhase,
    pub terminal_angle: Option<f64>,
    pub prize_amount: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteSpinResponse {
    pub phase: SpinPhase,
    pub prize_amount: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub prize_amount: u32,
}

/// Body of the stateless email form post.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveEmailRequest {
    #[serde(default)]
    #[validate(custom = "crate::validation::validate_email")]
    pub email: String,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub prize_amount: u32,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveEmailResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrizeSegmentView {
    pub min_degree: f64,
    pub max_degree: f64,
    pub amount: u32,
    pub probability: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrizeListResponse {
    pub amounts: Vec<u32>,
    pub segments: Vec<PrizeSegmentView>,
}

impl PrizeListResponse {
    pub fn from_table(table: &PrizeTable) -> Self {
        Self {
            amounts: table.list_prize_amounts(),
            segments: table
                .segments()
                .iter()
                .map(|s| PrizeSegmentView {
                    min_degree: s.min_degree,
                    max_degree: s.max_degree,
                    amount: s.amount,
                    probability: s.width() / FULL_CIRCLE,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prize_table::PrizeSegment;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl PrizeResolver for CountingResolver {
        fn resolve_prize(&self, angle_degrees: f64) -> u32 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PrizeTable::default().resolve_prize(angle_degrees)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    fn resolved_session(angle: f64) -> SpinSession {
        let mut session = SpinSession::with_default_table();
        session.start_spin_at(angle).unwrap();
        session.finish_spin().unwrap();
        session.complete_spin().unwrap();
        session
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = SpinSession::with_default_table();
        assert_eq!(session.phase(), SpinPhase::Idle);
        assert_eq!(session.terminal_angle(), None);
        assert!(!session.has_resolved());
    }

    #[test]
    fn test_random_spin_makes_full_revolutions() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let mut session = SpinSession::with_default_table();
            let angle = session.start_spin(&mut rng).unwrap();
            assert!(angle >= 360.0 * 5.0 && angle < 360.0 * 6.0);
            assert_eq!(session.phase(), SpinPhase::Spinning);
            assert!(session.is_wheel_in_motion());
        }
    }

    #[test]
    fn test_narrow_fractional_segment_pays_out_by_width() {
        let table = Arc::new(
            PrizeTable::new(vec![PrizeSegment::new(0.0, 0.5, 1000), PrizeSegment::new(0.5, 360.0, 5)]).unwrap(),
        );
        let advertised = table.probability_of(1000);
        assert!((advertised - 0.5 / 360.0).abs() < 1e-12);

        let mut rng = StdRng::seed_from_u64(7);
        let runs = 72_000;
        let mut wins = 0;
        for _ in 0..runs {
            let mut session = SpinSession::new(table.clone(), SpinConfig::default());
            session.start_spin(&mut rng).unwrap();
            session.finish_spin().unwrap();
            if session.complete_spin().unwrap() == 1000 {
                wins += 1;
            }
        }

        // Expect about 100 wins; a whole-degree draw would land near 200
        assert!((60..=140).contains(&wins), "wins = {}", wins);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut session = SpinSession::with_default_table();
        session.start_spin_at(1845.0).unwrap();
        assert_eq!(session.start_spin_at(100.0), Err(SessionError::AlreadySpinning));
        assert_eq!(session.terminal_angle(), Some(1845.0));

        let mut resolved = resolved_session(725.0);
        assert_eq!(
            resolved.start_spin_at(10.0),
            Err(SessionError::IllegalTransition { from: SpinPhase::Resolved, action: "start a spin" })
        );
    }

    #[test]
    fn test_complete_requires_wheel_at_rest() {
        let mut session = SpinSession::with_default_table();
        assert!(matches!(
            session.complete_spin(),
            Err(SessionError::IllegalTransition { from: SpinPhase::Idle, .. })
        ));

        session.start_spin_at(725.0).unwrap();
        assert_eq!(session.complete_spin(), Err(SessionError::StillSpinning));
        assert_eq!(session.phase(), SpinPhase::Spinning);

        session.finish_spin().unwrap();
        assert_eq!(session.complete_spin(), Ok(100));
        assert_eq!(session.phase(), SpinPhase::Resolved);
        assert!(session.has_resolved());
    }

    #[test]
    fn test_duplicate_completion_resolves_once() {
        let resolver = Arc::new(CountingResolver { calls: AtomicUsize::new(0) });
        let mut session = SpinSession::new(resolver.clone(), SpinConfig::default());
        session.start_spin_at(1845.0).unwrap();
        session.finish_spin().unwrap();

        let first = session.complete_spin().unwrap();
        session.finish_spin().unwrap();
        let second = session.complete_spin().unwrap();

        assert_eq!(first, 500);
        assert_eq!(first, second);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_email_keeps_session_resolved() {
        let session = resolved_session(725.0);
        let result = session.prepare_registration("not-an-email", None, ClientInfo::default(), now());
        assert_eq!(result, Err(SessionError::InvalidEmail));
        assert_eq!(session.phase(), SpinPhase::Resolved);
        assert!(session.submission().is_none());
    }

    #[test]
    fn test_registration_flow() {
        let mut session = resolved_session(725.0);
        let client = ClientInfo {
            client_ip: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        };
        let submission = session
            .prepare_registration(" user@example.com ", None, client, now())
            .unwrap();
        assert_eq!(submission.email, "user@example.com");
        assert_eq!(submission.prize_amount, 100);
        assert_eq!(submission.timestamp, now());
        assert_eq!(submission.client_ip.as_deref(), Some("203.0.113.7"));

        session.mark_registered(submission.clone()).unwrap();
        assert_eq!(session.phase(), SpinPhase::Registered);
        assert_eq!(session.submission(), Some(&submission));
        assert_eq!(session.complete_spin(), Ok(100));

        assert!(matches!(
            session.prepare_registration("user@example.com", None, ClientInfo::default(), now()),
            Err(SessionError::IllegalTransition { from: SpinPhase::Registered, .. })
        ));
        assert!(session.mark_registered(submission).is_err());
    }

    #[test]
    fn test_register_before_resolution_is_illegal() {
        let mut session = SpinSession::with_default_table();
        session.start_spin_at(725.0).unwrap();
        assert!(matches!(
            session.prepare_registration("user@example.com", None, ClientInfo::default(), now()),
            Err(SessionError::IllegalTransition { from: SpinPhase::Spinning, .. })
        ));
    }

    #[test]
    fn test_birthday_is_validated() {
        let session = resolved_session(45.0);
        let future = NaiveDate::from_ymd_opt(2030, 1, 1);
        assert_eq!(
            session.prepare_registration("user@example.com", future, ClientInfo::default(), now()),
            Err(SessionError::InvalidBirthday)
        );

        let birthday = NaiveDate::from_ymd_opt(1990, 6, 2);
        let submission = session
            .prepare_registration("user@example.com", birthday, ClientInfo::default(), now())
            .unwrap();
        assert_eq!(submission.birthday, birthday);
        assert_eq!(submission.prize_amount, 500);
    }

    #[test]
    fn test_save_email_request_validation() {
        let request: SaveEmailRequest =
            serde_json::from_str(r#"{"email": "user@example.com", "prizeAmount": 300}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.birthday, None);

        let bad: SaveEmailRequest =
            serde_json::from_str(r#"{"email": "not-an-email", "prizeAmount": 300}"#).unwrap();
        assert!(bad.validate().is_err());

        let missing: SaveEmailRequest = serde_json::from_str(r#"{"email": "user@example.com"}"#).unwrap();
        assert_eq!(missing.prize_amount, 0);
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_prize_list_response() {
        let response = PrizeListResponse::from_table(&PrizeTable::default());
        assert_eq!(response.amounts, vec![500, 300, 200, 100, 100, 50, 20]);
        let total: f64 = response.segments.iter().map(|s| s.probability).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }
}
