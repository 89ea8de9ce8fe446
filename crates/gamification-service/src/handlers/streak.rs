//! 连续打卡 API 处理器

use axum::{Json, extract::State};

use crate::{
    dto::ApiResponse, error::GamificationError, extract::CurrentUser, models::Streak,
    state::AppState,
};

/// 当前连续打卡状态，含可用保护卡数量
///
/// GET /api/v1/streak
pub async fn current(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Streak>>, GamificationError> {
    let streak = state.streaks.get(user.as_str()).await?;
    Ok(Json(ApiResponse::success(streak)))
}
