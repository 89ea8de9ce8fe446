//! 代币 API 处理器

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    dto::{ApiResponse, PageResponse, PaginationParams},
    error::GamificationError,
    extract::CurrentUser,
    models::{TokenLedgerEntry, TokenStats},
    state::AppState,
};

/// 代币流水（最新在前）
///
/// GET /api/v1/tokens/ledger?page=1&pageSize=20
pub async fn ledger(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PageResponse<TokenLedgerEntry>>>, GamificationError> {
    let (page, limit) = (params.page(), params.limit());
    let (items, total) = state.ledger.history(user.as_str(), page, limit).await?;
    Ok(Json(ApiResponse::success(PageResponse::new(
        items, total, page, limit,
    ))))
}

/// 代币统计
///
/// GET /api/v1/tokens/stats
pub async fn stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<TokenStats>>, GamificationError> {
    let stats = state.ledger.stats(user.as_str()).await?;
    Ok(Json(ApiResponse::success(stats)))
}
