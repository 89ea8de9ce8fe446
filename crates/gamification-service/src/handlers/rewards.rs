//! 奖励 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use chrono::Utc;
use tracing::instrument;
use validator::Validate;

use crate::{
    dto::{ApiResponse, ClaimRewardRequest, ClaimRewardResponse, ClaimedRewardFilter},
    error::GamificationError,
    extract::CurrentUser,
    models::{ClaimedReward, RewardDefinition},
    state::AppState,
};

/// 奖励目录
///
/// GET /api/v1/rewards
pub async fn catalog(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<RewardDefinition>>>, GamificationError> {
    let rewards = state.rewards.catalog().await?;
    Ok(Json(ApiResponse::success(rewards)))
}

/// 领取奖励
///
/// POST /api/v1/rewards/claim
#[instrument(skip(state, body), fields(user_id = %user.as_str()))]
pub async fn claim(
    State(state): State<AppState>,
    user: CurrentUser,
    body: Result<Json<ClaimRewardRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ClaimRewardResponse>>, GamificationError> {
    let Json(req) = body?;
    req.validate()?;

    let outcome = state
        .rewards
        .claim(req.into_command(user.0), Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(outcome.into())))
}

/// 我的已领取奖励
///
/// GET /api/v1/rewards/claimed?status=ACTIVE
pub async fn list_claimed(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<ClaimedRewardFilter>,
) -> Result<Json<ApiResponse<Vec<ClaimedReward>>>, GamificationError> {
    let claims = state
        .rewards
        .list_claimed(user.as_str(), filter.status)
        .await?;
    Ok(Json(ApiResponse::success(claims)))
}

/// 激活待激活的奖励
///
/// POST /api/v1/rewards/claimed/{id}/activate
#[instrument(skip(state), fields(user_id = %user.as_str()))]
pub async fn activate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ClaimedReward>>, GamificationError> {
    let claim = state.rewards.activate(user.as_str(), id, Utc::now()).await?;
    Ok(Json(ApiResponse::success(claim)))
}

/// 核销奖励
///
/// POST /api/v1/rewards/claimed/{id}/use
#[instrument(skip(state), fields(user_id = %user.as_str()))]
pub async fn mark_used(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ClaimedReward>>, GamificationError> {
    let claim = state.rewards.mark_used(user.as_str(), id, Utc::now()).await?;
    Ok(Json(ApiResponse::success(claim)))
}
