//! 打卡 API 处理器

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use chrono::Utc;
use tracing::instrument;
use validator::Validate;

use crate::{
    dto::{ApiResponse, CheckInRequest},
    error::GamificationError,
    extract::CurrentUser,
    models::{Attendance, TodayStatus},
    service::CheckInOutcome,
    state::AppState,
};

/// 到店打卡
///
/// POST /api/v1/attendance/check-in
///
/// 同一自然日重复打卡返回已有记录，`alreadyCheckedIn = true`
#[instrument(skip(state, body), fields(user_id = %user.as_str()))]
pub async fn check_in(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<Json<CheckInRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CheckInOutcome>>, GamificationError> {
    let Json(req) = body?;
    req.validate()?;

    let outcome = state
        .attendance
        .check_in(req.into_command(user.0), Utc::now())
        .await?;

    let message = if outcome.already_checked_in {
        "今日已打卡"
    } else {
        "打卡成功"
    };
    Ok(Json(ApiResponse::success_with_message(outcome, message)))
}

/// 签退
///
/// POST /api/v1/attendance/check-out
#[instrument(skip(state), fields(user_id = %user.as_str()))]
pub async fn check_out(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Attendance>>, GamificationError> {
    let attendance = state.attendance.check_out(user.as_str(), Utc::now()).await?;
    Ok(Json(ApiResponse::success(attendance)))
}

/// 今日打卡状态
///
/// GET /api/v1/attendance/today
pub async fn today(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<TodayStatus>>, GamificationError> {
    let status = state.attendance.today_status(user.as_str(), Utc::now()).await?;
    Ok(Json(ApiResponse::success(status)))
}
