//! 运营后台 API 处理器
//!
//! 所有写操作以 `x-operator-id` 记录操作人

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    dto::{AdjustTokensRequest, ApiResponse, ReevaluateRequest},
    error::GamificationError,
    extract::Operator,
    models::{TokenLedgerEntry, UnlockedAchievement},
    service::LedgerVerification,
    state::AppState,
};

/// 运营调整代币（补发、扣回、退款）
///
/// POST /api/admin/tokens/adjust
#[instrument(skip(state, body), fields(operator = %operator.0))]
pub async fn adjust_tokens(
    State(state): State<AppState>,
    operator: Operator,
    body: Result<Json<AdjustTokensRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<TokenLedgerEntry>>, GamificationError> {
    let Json(req) = body?;
    req.validate()?;

    let entry = state.ledger.adjust(req.into_command(operator.0)).await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// 校验用户流水链并返回余额
///
/// GET /api/admin/tokens/{userId}/verify
#[instrument(skip(state, _operator))]
pub async fn verify_ledger(
    State(state): State<AppState>,
    _operator: Operator,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<LedgerVerification>>, GamificationError> {
    let verification = state.ledger.verified_balance(&user_id).await?;
    Ok(Json(ApiResponse::success(verification)))
}

/// 重算用户成就（成就定义变更后补偿）
///
/// POST /api/admin/achievements/reevaluate
#[instrument(skip(state, body), fields(operator = %operator.0))]
pub async fn reevaluate_achievements(
    State(state): State<AppState>,
    operator: Operator,
    body: Result<Json<ReevaluateRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Vec<UnlockedAchievement>>>, GamificationError> {
    let Json(req) = body?;
    req.validate()?;

    let unlocked = state
        .achievements
        .reevaluate(&req.user_id, req.trigger)
        .await?;
    info!(user_id = %req.user_id, unlocked = unlocked.len(), "运营触发成就重算");
    Ok(Json(ApiResponse::success(unlocked)))
}
