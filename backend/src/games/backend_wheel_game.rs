use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::constants::{EMAIL_SAVED_MESSAGE, INVALID_BODY_ERROR};
use shared::prize_table::PrizeTable;
use shared::shared_wheel_game::*;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::games::spin_timer::SpinTimer;
use crate::request_context::RequestContext;
use crate::services::registration_service;
use crate::services::sinks::Sinks;

pub const SESSION_TIMEOUT: Duration = Duration::from_secs(3600);
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// A session plus the timer that will resolve it.
pub struct SessionSlot {
    pub session: SpinSession,
    pub started_at: Instant,
    timer: Option<SpinTimer>,
}

#[derive(Clone)]
pub struct SessionHandle {
    pub created_at: Instant,
    pub slot: Arc<Mutex<SessionSlot>>,
}

pub struct WheelGameState {
    pub sessions: Arc<Mutex<HashMap<Uuid, SessionHandle>>>,
    pub prize_table: Arc<PrizeTable>,
    pub spin_config: SpinConfig,
    pub sinks: Sinks,
}

impl WheelGameState {
    pub fn new(prize_table: Arc<PrizeTable>, spin_config: SpinConfig, sinks: Sinks) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            prize_table,
            spin_config,
            sinks,
        }
    }

    /// Creates a session, starts its spin and schedules the resolution.
    pub async fn start_session(&self) -> Result<(Uuid, f64), Error> {
        let mut session = SpinSession::new(self.prize_table.clone(), self.spin_config);
        let terminal_angle = session.start_spin(&mut rand::thread_rng())?;
        let id = Uuid::new_v4();

        let slot = Arc::new(Mutex::new(SessionSlot {
            session,
            started_at: Instant::now(),
            timer: None,
        }));
        let timer = schedule_resolution(id, Arc::downgrade(&slot), self.spin_config.time_to_resolve());
        slot.lock().await.timer = Some(timer);

        self.sessions.lock().await.insert(
            id,
            SessionHandle {
                created_at: Instant::now(),
                slot,
            },
        );
        info!("🎡 Spin {} started, landing at {} degrees", id, terminal_angle);
        Ok((id, terminal_angle))
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Mutex<SessionSlot>>> {
        self.sessions.lock().await.get(id).map(|handle| handle.slot.clone())
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    pub async fn cleanup_expired_sessions(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, handle| handle.created_at.elapsed() < SESSION_TIMEOUT);
        before - sessions.len()
    }
}

fn schedule_resolution(id: Uuid, slot: Weak<Mutex<SessionSlot>>, delay: Duration) -> SpinTimer {
    SpinTimer::schedule(delay, move || async move {
        let Some(slot) = slot.upgrade() else {
            return;
        };
        let mut slot = slot.lock().await;
        let outcome = slot.session.finish_spin().and_then(|_| slot.session.complete_spin());
        match outcome {
            Ok(amount) => info!("🎡 Spin {} resolved by timer: prize {}", id, amount),
            Err(e) => warn!("Spin {} could not be resolved by timer: {}", id, e),
        }
        slot.timer = None;
    })
}

pub fn create_router() -> Router<Arc<WheelGameState>> {
    Router::new()
        .route("/", post(start_spin))
        .route("/:id", get(spin_status).delete(abandon_spin))
        .route("/:id/complete", post(complete_spin))
        .route("/:id/register", post(register))
}

async fn start_spin(State(state): State<Arc<WheelGameState>>) -> Result<Json<NewSpinResponse>, Error> {
    let (id, terminal_angle) = state.start_session().await?;
    Ok(Json(NewSpinResponse {
        session_id: id.to_string(),
        phase: SpinPhase::Spinning,
        terminal_angle,
        spin_duration_ms: state.spin_config.spin_duration.as_millis() as u64,
        settle_delay_ms: state.spin_config.settle_delay.as_millis() as u64,
    }))
}

async fn spin_status(
    State(state): State<Arc<WheelGameState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SpinStatusResponse>, Error> {
    let slot = state.get(&id).await.ok_or(Error::NotFound)?;
    let slot = slot.lock().await;
    Ok(Json(SpinStatusResponse {
        session_id: id.to_string(),
        phase: slot.session.phase(),
        terminal_angle: slot.session.terminal_angle(),
        prize_amount: slot.session.prize_amount(),
    }))
}

/// The browser reports that its wheel animation ended. Accepted once the spin
/// duration has elapsed; before that the wheel is still turning.
async fn complete_spin(
    State(state): State<Arc<WheelGameState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompleteSpinResponse>, Error> {
    let slot = state.get(&id).await.ok_or(Error::NotFound)?;
    let mut slot = slot.lock().await;

    if slot.started_at.elapsed() >= state.spin_config.spin_duration {
        slot.session.finish_spin()?;
    }
    let prize_amount = slot.session.complete_spin()?;
    if let Some(timer) = slot.timer.take() {
        timer.cancel();
    }

    Ok(Json(CompleteSpinResponse {
        phase: slot.session.phase(),
        prize_amount,
    }))
}

async fn register(
    State(state): State<Arc<WheelGameState>>,
    Path(id): Path<Uuid>,
    context: RequestContext,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, Error> {
    let Json(request) = payload.map_err(|rejection| {
        debug!("Rejected register body for spin {}: {}", id, rejection);
        Error::Validation(INVALID_BODY_ERROR)
    })?;
    let slot = state.get(&id).await.ok_or(Error::NotFound)?;
    let mut slot = slot.lock().await;

    let outcome = registration_service::register(
        &mut slot.session,
        &request.email,
        request.birthday,
        &context,
        &state.sinks,
    )
    .await?;

    info!("📧 Spin {} registered for a prize of {}", id, outcome.submission.prize_amount);
    Ok(Json(RegisterResponse {
        success: true,
        message: EMAIL_SAVED_MESSAGE.to_string(),
        prize_amount: outcome.submission.prize_amount,
    }))
}

async fn abandon_spin(
    State(state): State<Arc<WheelGameState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Error> {
    if state.remove(&id).await {
        info!("Spin {} abandoned", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound)
    }
}
