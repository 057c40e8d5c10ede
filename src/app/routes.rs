// ==========================================
// 单车道客运站 - HTTP 路由
// ==========================================
// 职责: JSON 接口与 SSE 推送，连接外部终端与 API 层
// 约定: rusqlite 阻塞调用一律放入 spawn_blocking
// 约定: 请求体字段使用 camelCase（与现有终端保持一致）
// ==========================================

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;

use crate::api::error::{ApiError, ApiResult};
use crate::api::{
    ApplyResponse, ClearResponse, LiftResponse, PenaltyListResponse, PresentResponse,
    QueueingResponse, ReservationResponse, ScanResponse, SweepRunResponse, TransferResponse,
};
use crate::app::state::AppState;
use crate::domain::entry_log::{DashboardCounts, EntryLogEntry, SystemSnapshot};
use crate::domain::reservation::{
    QueueingEntry, Reservation, ReservationCandidate, UpcomingReservations,
};
use crate::domain::vehicle::VehicleStatusCheck;
use crate::engine::sweep::SweepStatus;

/// 组装路由
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // 车道
        .route("/api/vehicles/search", post(search_vehicle))
        .route("/api/vehicles/clear", post(clear_vehicle))
        .route("/api/vehicles/check-status", post(check_vehicle_status))
        .route("/api/vehicles/update-pass", post(update_pass))
        .route("/api/entry-logs/update-fd", post(update_fd))
        .route("/api/system/state", get(system_state))
        .route("/api/system/events", get(system_events))
        .route("/api/queue/next", get(next_queue_number))
        // 扫码
        .route("/api/validate-qr/:fd", post(validate_qr))
        // 处罚
        .route("/api/penalties", get(list_penalties))
        .route("/api/penalties/apply", post(apply_penalty))
        .route("/api/penalties/lift", post(lift_penalty))
        // 看板
        .route("/api/entry-logs", get(recent_entry_logs))
        .route("/api/entry-logs/search", get(search_entry_logs))
        .route("/api/dashboard/counts", get(dashboard_counts))
        // 清扫
        .route("/api/sweep/status", get(sweep_status))
        .route("/api/sweep/run", post(run_sweep))
        // 预约与排班
        .route("/api/reservations", post(create_reservation))
        .route("/api/reservations/upcoming", get(upcoming_reservations))
        .route("/api/reservations/past", get(past_reservations))
        .route("/api/reservations/vehicle-status", get(reservation_candidates))
        .route("/api/reservations/transfer-to-queueing", post(transfer_to_queueing))
        .route("/api/reservations/:id", delete(cancel_reservation))
        .route("/api/queueing", post(create_walk_in))
        .route("/api/queueing/today", get(today_queueing))
        .route("/api/queueing/:id/time-out", put(update_time_out))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Router::new().route("/health", get(health)).merge(api)
}

// ==========================================
// 请求体
// ==========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierRequest {
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    pub plate_number: String,
    #[serde(default)]
    pub is_exit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePassRequest {
    pub plate_number: String,
    pub pass: String,
    pub queue_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFdRequest {
    pub plate_number: String,
    pub fd: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRequest {
    pub qr_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPenaltyRequest {
    pub plate_number: String,
    pub touchdown: String,
    pub entry_log_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftPenaltyRequest {
    pub plate_number: String,
    pub entry_log_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryLogSearchQuery {
    pub plate_number: String,
    pub touchdown: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    #[serde(default)]
    pub driver_name: String,
    pub plate_number: String,
    pub reservation_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastReservationQuery {
    pub date: Option<String>,
    pub plate_number: Option<String>,
    pub driver_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateFragmentQuery {
    #[serde(default)]
    pub plate_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkInRequest {
    #[serde(default)]
    pub driver_name: String,
    pub plate_number: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQueueNumberResponse {
    pub next_queue_number: i64,
}

// ==========================================
// 公共工具
// ==========================================

/// 在阻塞线程池执行 API 调用
async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::InternalError(format!("任务执行失败: {}", e)))?
}

async fn health() -> &'static str {
    "ok"
}

// ==========================================
// 车道
// ==========================================

async fn search_vehicle(
    State(state): State<AppState>,
    Json(req): Json<IdentifierRequest>,
) -> ApiResult<Json<PresentResponse>> {
    let api = state.lane_api.clone();
    run_blocking(move || api.search_vehicle(&req.identifier))
        .await
        .map(Json)
}

async fn clear_vehicle(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> ApiResult<Json<ClearResponse>> {
    let api = state.lane_api.clone();
    run_blocking(move || api.clear_vehicle(&req.plate_number, req.is_exit))
        .await
        .map(Json)
}

async fn check_vehicle_status(
    State(state): State<AppState>,
    Json(req): Json<IdentifierRequest>,
) -> ApiResult<Json<VehicleStatusCheck>> {
    let api = state.lane_api.clone();
    run_blocking(move || api.check_vehicle_status(&req.identifier))
        .await
        .map(Json)
}

async fn update_pass(
    State(state): State<AppState>,
    Json(req): Json<UpdatePassRequest>,
) -> ApiResult<Json<EntryLogEntry>> {
    let api = state.lane_api.clone();
    run_blocking(move || api.update_pass(&req.plate_number, &req.pass, req.queue_number))
        .await
        .map(Json)
}

async fn update_fd(
    State(state): State<AppState>,
    Json(req): Json<UpdateFdRequest>,
) -> ApiResult<Json<EntryLogEntry>> {
    let api = state.lane_api.clone();
    run_blocking(move || api.update_fd(&req.plate_number, &req.fd))
        .await
        .map(Json)
}

async fn system_state(State(state): State<AppState>) -> ApiResult<Json<SystemSnapshot>> {
    let api = state.lane_api.clone();
    run_blocking(move || api.get_system_state()).await.map(Json)
}

async fn next_queue_number(
    State(state): State<AppState>,
) -> ApiResult<Json<NextQueueNumberResponse>> {
    let api = state.lane_api.clone();
    let next_queue_number = run_blocking(move || api.next_queue_number()).await?;
    Ok(Json(NextQueueNumberResponse { next_queue_number }))
}

/// SSE 推送: 每个车道事件一条消息，event 字段为事件名
async fn system_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(e) => tracing::warn!(error = %e, "SSE 事件序列化失败"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE 订阅者落后，已丢弃旧事件");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ==========================================
// 扫码
// ==========================================

async fn validate_qr(
    State(state): State<AppState>,
    Path(fd): Path<String>,
    Json(req): Json<QrRequest>,
) -> ApiResult<Json<ScanResponse>> {
    let api = state.scan_api.clone();
    run_blocking(move || api.validate_qr(&req.qr_data, &fd))
        .await
        .map(Json)
}

// ==========================================
// 处罚
// ==========================================

async fn list_penalties(State(state): State<AppState>) -> ApiResult<Json<PenaltyListResponse>> {
    let api = state.penalty_api.clone();
    run_blocking(move || api.list_penalties()).await.map(Json)
}

async fn apply_penalty(
    State(state): State<AppState>,
    Json(req): Json<ApplyPenaltyRequest>,
) -> ApiResult<Json<ApplyResponse>> {
    let api = state.penalty_api.clone();
    run_blocking(move || api.apply_penalty(&req.plate_number, &req.touchdown, req.entry_log_id))
        .await
        .map(Json)
}

async fn lift_penalty(
    State(state): State<AppState>,
    Json(req): Json<LiftPenaltyRequest>,
) -> ApiResult<Json<LiftResponse>> {
    let api = state.penalty_api.clone();
    run_blocking(move || api.lift_penalty(&req.plate_number, req.entry_log_id))
        .await
        .map(Json)
}

// ==========================================
// 看板
// ==========================================

async fn recent_entry_logs(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<EntryLogEntry>>> {
    let api = state.dashboard_api.clone();
    run_blocking(move || api.recent_entry_logs(query.limit))
        .await
        .map(Json)
}

async fn search_entry_logs(
    State(state): State<AppState>,
    Query(query): Query<EntryLogSearchQuery>,
) -> ApiResult<Json<Vec<EntryLogEntry>>> {
    let api = state.dashboard_api.clone();
    run_blocking(move || api.find_by_plate_and_touchdown(&query.plate_number, &query.touchdown))
        .await
        .map(Json)
}

async fn dashboard_counts(State(state): State<AppState>) -> ApiResult<Json<DashboardCounts>> {
    let api = state.dashboard_api.clone();
    run_blocking(move || api.get_counts()).await.map(Json)
}

// ==========================================
// 清扫
// ==========================================

async fn sweep_status(State(state): State<AppState>) -> ApiResult<Json<SweepStatus>> {
    let api = state.sweep_api.clone();
    run_blocking(move || api.get_status()).await.map(Json)
}

async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepRunResponse>> {
    let api = state.sweep_api.clone();
    run_blocking(move || api.run_now()).await.map(Json)
}

// ==========================================
// 预约与排班
// ==========================================

async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<ReservationRequest>,
) -> ApiResult<Json<ReservationResponse>> {
    let api = state.reservation_api.clone();
    run_blocking(move || {
        api.create_reservation(&req.driver_name, &req.plate_number, &req.reservation_date)
    })
    .await
    .map(Json)
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationResponse>> {
    let api = state.reservation_api.clone();
    run_blocking(move || api.cancel_reservation(&id)).await.map(Json)
}

async fn upcoming_reservations(
    State(state): State<AppState>,
) -> ApiResult<Json<UpcomingReservations>> {
    let api = state.reservation_api.clone();
    run_blocking(move || api.upcoming_reservations()).await.map(Json)
}

async fn past_reservations(
    State(state): State<AppState>,
    Query(query): Query<PastReservationQuery>,
) -> ApiResult<Json<Vec<Reservation>>> {
    let api = state.reservation_api.clone();
    run_blocking(move || {
        api.past_reservations(
            query.date.as_deref(),
            query.plate_number.as_deref(),
            query.driver_name.as_deref(),
        )
    })
    .await
    .map(Json)
}

async fn reservation_candidates(
    State(state): State<AppState>,
    Query(query): Query<PlateFragmentQuery>,
) -> ApiResult<Json<Vec<ReservationCandidate>>> {
    let api = state.reservation_api.clone();
    run_blocking(move || api.vehicle_candidates(&query.plate_number))
        .await
        .map(Json)
}

async fn transfer_to_queueing(State(state): State<AppState>) -> ApiResult<Json<TransferResponse>> {
    let api = state.reservation_api.clone();
    run_blocking(move || api.transfer_to_queueing()).await.map(Json)
}

async fn today_queueing(State(state): State<AppState>) -> ApiResult<Json<Vec<QueueingEntry>>> {
    let api = state.reservation_api.clone();
    run_blocking(move || api.today_queueing()).await.map(Json)
}

async fn create_walk_in(
    State(state): State<AppState>,
    Json(req): Json<WalkInRequest>,
) -> ApiResult<Json<QueueingResponse>> {
    let api = state.reservation_api.clone();
    run_blocking(move || api.create_walk_in(&req.driver_name, &req.plate_number))
        .await
        .map(Json)
}

async fn update_time_out(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<QueueingResponse>> {
    let api = state.reservation_api.clone();
    run_blocking(move || api.update_time_out(&id)).await.map(Json)
}
