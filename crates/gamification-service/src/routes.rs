//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router, middleware,
    routing::{get, post},
};
use fitquest_shared::observability::middleware as obs_middleware;

use crate::{handlers, state::AppState};

/// 打卡路由
fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/attendance/check-in",
            post(handlers::attendance::check_in),
        )
        .route(
            "/attendance/check-out",
            post(handlers::attendance::check_out),
        )
        .route("/attendance/today", get(handlers::attendance::today))
}

/// 代币与连续打卡路由
fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/tokens/ledger", get(handlers::tokens::ledger))
        .route("/tokens/stats", get(handlers::tokens::stats))
        .route("/streak", get(handlers::streak::current))
}

/// 奖励路由
fn reward_routes() -> Router<AppState> {
    Router::new()
        .route("/rewards", get(handlers::rewards::catalog))
        .route("/rewards/claim", post(handlers::rewards::claim))
        .route("/rewards/claimed", get(handlers::rewards::list_claimed))
        .route(
            "/rewards/claimed/{id}/activate",
            post(handlers::rewards::activate),
        )
        .route(
            "/rewards/claimed/{id}/use",
            post(handlers::rewards::mark_used),
        )
}

/// 成就路由
fn achievement_routes() -> Router<AppState> {
    Router::new()
        .route("/achievements", get(handlers::achievements::catalog))
        .route("/achievements/me", get(handlers::achievements::mine))
}

/// C 端路由，挂载在 `/api/v1`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(attendance_routes())
        .merge(token_routes())
        .merge(reward_routes())
        .merge(achievement_routes())
}

/// 运营后台路由，挂载在 `/api/admin`
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/tokens/adjust", post(handlers::admin::adjust_tokens))
        .route(
            "/tokens/{user_id}/verify",
            get(handlers::admin::verify_ledger),
        )
        .route(
            "/achievements/reevaluate",
            post(handlers::admin::reevaluate_achievements),
        )
}

/// 组装业务路由与可观测性中间件
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .nest("/api/admin", admin_routes())
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
