//! 成就 API 处理器

use axum::{Json, extract::State};

use crate::{
    dto::ApiResponse,
    error::GamificationError,
    extract::CurrentUser,
    models::{AchievementDefinition, UserAchievementView},
    state::AppState,
};

/// 我的成就：每个启用成就的进度与解锁状态
///
/// GET /api/v1/achievements/me
pub async fn mine(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<UserAchievementView>>>, GamificationError> {
    let views = state.achievements.list_for_user(user.as_str()).await?;
    Ok(Json(ApiResponse::success(views)))
}

/// 成就目录
///
/// GET /api/v1/achievements
pub async fn catalog(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<AchievementDefinition>>>, GamificationError> {
    let definitions = state.achievements.catalog().await?;
    Ok(Json(ApiResponse::success(definitions)))
}
