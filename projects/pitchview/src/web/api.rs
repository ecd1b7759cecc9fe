use crate::error::EngineError;
use crate::overlay::projector::{ObjectInfo, ProjectedFrame};
use crate::overlay::types::{Point, Size, Surface, ViewKind};
use crate::overlay::viewport::{DisplayRect, ViewportGeometry};
use crate::session::{PlayerSession, SessionSnapshot};
use crate::tracking::homography::FieldPoint;
use crate::web::error::{ApiError, ApiResult};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

pub type SharedSession = Arc<Mutex<PlayerSession>>;

fn lock(session: &SharedSession) -> ApiResult<MutexGuard<'_, PlayerSession>> {
    session
        .lock()
        .map_err(|_| ApiError::Internal("session lock poisoned".to_string()))
}

fn parse_surface(raw: &str) -> ApiResult<Surface> {
    raw.parse().map_err(ApiError::not_found)
}

fn parse_view(raw: &str) -> ApiResult<ViewKind> {
    raw.parse().map_err(ApiError::not_found)
}

#[derive(Serialize)]
pub struct CommandResponse {
    pub snapshot: SessionSnapshot,
    /// Engines that rejected the command; the rest of the group carried on.
    pub failures: Vec<String>,
}

impl CommandResponse {
    fn new(session: &PlayerSession, failures: Vec<EngineError>) -> Self {
        Self {
            snapshot: session.snapshot(),
            failures: failures.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Deserialize)]
pub struct SeekRequest {
    pub position_ms: u64,
}

#[derive(Deserialize)]
pub struct StepRequest {
    pub delta: i64,
}

#[derive(Deserialize)]
pub struct FrameRequest {
    pub frame: i64,
}

#[derive(Deserialize)]
pub struct ViewportRequest {
    #[serde(default)]
    pub native: Option<Size>,
    pub display: DisplayRect,
}

#[derive(Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[derive(Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Deserialize)]
pub struct PointQuery {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize)]
pub struct HitResponse {
    pub object: Option<ObjectInfo>,
    pub text: Option<String>,
}

pub async fn get_status(State(session): State<SharedSession>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(lock(&session)?.snapshot()))
}

pub async fn get_overlays(State(session): State<SharedSession>) -> ApiResult<Json<ProjectedFrame>> {
    let mut session = lock(&session)?;
    Ok(Json(session.project().clone()))
}

pub async fn get_overlays_for_frame(
    State(session): State<SharedSession>,
    Path(frame): Path<i64>,
) -> ApiResult<Json<ProjectedFrame>> {
    Ok(Json(lock(&session)?.overlays_for(frame)))
}

pub async fn playback_command(
    State(session): State<SharedSession>,
    Path(command): Path<String>,
) -> ApiResult<Json<CommandResponse>> {
    let mut session = lock(&session)?;
    let failures = match command.as_str() {
        "play" => session.play(),
        "pause" => session.pause(),
        "stop" => session.stop(),
        other => return Err(ApiError::bad_request(format!("unknown command: {}", other))),
    };
    Ok(Json(CommandResponse::new(&session, failures)))
}

pub async fn seek(
    State(session): State<SharedSession>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let mut session = lock(&session)?;
    let failures = session.seek(req.position_ms);
    Ok(Json(CommandResponse::new(&session, failures)))
}

pub async fn step(
    State(session): State<SharedSession>,
    Json(req): Json<StepRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let mut session = lock(&session)?;
    let failures = session.step(req.delta)?;
    Ok(Json(CommandResponse::new(&session, failures)))
}

pub async fn go_to_frame(
    State(session): State<SharedSession>,
    Json(req): Json<FrameRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let mut session = lock(&session)?;
    let failures = session.go_to_frame(req.frame)?;
    Ok(Json(CommandResponse::new(&session, failures)))
}

pub async fn viewport_changed(
    State(session): State<SharedSession>,
    Path(surface): Path<String>,
    Json(req): Json<ViewportRequest>,
) -> ApiResult<Json<ViewportGeometry>> {
    let surface = parse_surface(&surface)?;
    let geometry = lock(&session)?.viewport_changed(surface, req.native, req.display)?;
    Ok(Json(geometry))
}

pub async fn detach_view(
    State(session): State<SharedSession>,
    Path(view): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let view = parse_view(&view)?;
    let mut session = lock(&session)?;
    session.detach(view)?;
    Ok(Json(session.snapshot()))
}

pub async fn reattach_view(
    State(session): State<SharedSession>,
    Path(view): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let view = parse_view(&view)?;
    let mut session = lock(&session)?;
    session.reattach(view)?;
    Ok(Json(session.snapshot()))
}

pub async fn set_visibility(
    State(session): State<SharedSession>,
    Path(surface): Path<String>,
    Json(req): Json<VisibilityRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let surface = parse_surface(&surface)?;
    let mut session = lock(&session)?;
    session.set_visible(surface, req.visible)?;
    Ok(Json(session.snapshot()))
}

pub async fn set_muted(
    State(session): State<SharedSession>,
    Path(view): Path<String>,
    Json(req): Json<MuteRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let view = parse_view(&view)?;
    let mut session = lock(&session)?;
    session.set_muted(view, req.muted)?;
    Ok(Json(session.snapshot()))
}

#[derive(Serialize)]
pub struct ClearFaultResponse {
    /// False when the view's engine had no fault recorded.
    pub cleared: bool,
    pub snapshot: SessionSnapshot,
}

pub async fn clear_fault(
    State(session): State<SharedSession>,
    Path(view): Path<String>,
) -> ApiResult<Json<ClearFaultResponse>> {
    let view = parse_view(&view)?;
    let mut session = lock(&session)?;
    let cleared = session.clear_fault(view)?;
    Ok(Json(ClearFaultResponse {
        cleared,
        snapshot: session.snapshot(),
    }))
}

pub async fn reverse_point(
    State(session): State<SharedSession>,
    Query(q): Query<PointQuery>,
) -> ApiResult<Json<FieldPoint>> {
    Ok(Json(lock(&session)?.reverse(Point::new(q.x, q.y))?))
}

pub async fn hit_test(
    State(session): State<SharedSession>,
    Path(surface): Path<String>,
    Query(q): Query<PointQuery>,
) -> ApiResult<Json<HitResponse>> {
    let surface = parse_surface(&surface)?;
    let object = lock(&session)?.hit_test(surface, Point::new(q.x, q.y))?;
    let text = object.as_ref().map(ToString::to_string);
    Ok(Json(HitResponse { object, text }))
}
