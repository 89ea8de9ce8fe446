//! 健身游戏化账本服务
//!
//! 提供打卡、代币、连续打卡、成就与奖励领取的 REST API。

use std::sync::Arc;

use axum::{Json, Router, http::HeaderValue, routing::get};
use fitquest_shared::{
    cache::Cache, config::AppConfig, database::Database, kafka::KafkaProducer, observability,
};
use gamification::{
    GamificationSettings,
    events::{EventPublisher, KafkaEventPublisher, LogEventPublisher},
    repository::PgDirectory,
    routes,
    state::AppState,
    worker::RewardExpireWorker,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const SERVICE_NAME: &str = "gamification-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(SERVICE_NAME)?;
    let settings = GamificationSettings::load(SERVICE_NAME)?;

    let _guard = observability::init(&config.observability, &config.service_name).await?;
    info!("Starting {} on {}", SERVICE_NAME, config.server_addr());

    let db = Database::connect(&config.database).await?;
    let cache = Arc::new(Cache::new(&config.redis)?);

    // Kafka 关闭时事件只写日志
    let publisher: Arc<dyn EventPublisher> = if config.kafka.enabled {
        Arc::new(KafkaEventPublisher::new(KafkaProducer::new(&config.kafka)?))
    } else {
        warn!("Kafka 未启用，领域事件仅写入日志");
        Arc::new(LogEventPublisher)
    };

    let directory = Arc::new(PgDirectory::new(db.pool().clone()));
    let expire_settings = settings.expire_worker.clone();
    let state = AppState::new(
        db.pool().clone(),
        cache.clone(),
        settings,
        publisher,
        directory.clone(),
        directory,
    );

    if expire_settings.enabled {
        let worker = RewardExpireWorker::new(state.rewards.clone(), &expire_settings);
        tokio::spawn(async move {
            worker.run().await;
        });
    }

    let cors = cors_layer();

    let app = Router::new()
        .merge(routes::app(state))
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let db_for_ready = db.clone();
                let cache_for_ready = cache;
                move || readiness_check(db_for_ready.clone(), cache_for_ready.clone())
            }),
        )
        .layer(cors);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// CORS：`FITQUEST_CORS_ORIGINS` 逗号分隔，`*` 表示允许任意来源
fn cors_layer() -> CorsLayer {
    let allowed_origins = std::env::var("FITQUEST_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    if allowed_origins == "*" {
        info!("CORS allowed_origins: * (all origins)");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    info!("CORS allowed_origins: {}", allowed_origins);
    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 监听关闭信号（SIGTERM 或 Ctrl+C）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": SERVICE_NAME
    }))
}

/// 就绪探针：检查数据库和 Redis
///
/// Redis 只承载缓存，故障时服务仍可处理请求，状态标记为 degraded
async fn readiness_check(db: Database, cache: Arc<Cache>) -> Json<serde_json::Value> {
    let db_ok = db.health_check().await.is_ok();
    let cache_ok = cache.health_check().await.is_ok();

    Json(serde_json::json!({
        "status": if db_ok && cache_ok { "ok" } else { "degraded" },
        "service": SERVICE_NAME,
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "redis": if cache_ok { "ok" } else { "fail" }
        },
        "pool": db.status()
    }))
}
