//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// 全局 Prometheus handle
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("check_ins_total", "Check-in attempts by outcome");
    metrics::describe_histogram!("check_in_duration_seconds", "Check-in duration in seconds");

    metrics::describe_counter!("ledger_entries_total", "Token ledger entries by reason");
    metrics::describe_counter!("ledger_tokens_total", "Absolute token volume by reason");

    metrics::describe_counter!("reward_claims_total", "Reward claim attempts by outcome");
    metrics::describe_histogram!(
        "reward_claim_duration_seconds",
        "Reward claim duration in seconds"
    );

    metrics::describe_counter!("achievement_unlocks_total", "Achievement unlocks");
    metrics::describe_counter!("streak_transitions_total", "Streak transitions by kind");
    metrics::describe_counter!("rewards_expired_total", "Claimed rewards flipped to EXPIRED");
    metrics::describe_counter!("events_published_total", "Domain events by delivery status");
    metrics::describe_gauge!("worker_last_run_timestamp", "Last run of background workers");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录打卡结果（outcome 为 ADMITTED / DUPLICATE / 拒绝码）
#[inline]
pub fn record_check_in(outcome: &str, duration_secs: f64) {
    metrics::counter!("check_ins_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("check_in_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// 记录账本流水
#[inline]
pub fn record_ledger_entry(reason: &str, delta: i64) {
    metrics::counter!("ledger_entries_total", "reason" => reason.to_string()).increment(1);
    metrics::counter!("ledger_tokens_total", "reason" => reason.to_string())
        .increment(delta.unsigned_abs());
}

/// 记录奖励领取
#[inline]
pub fn record_reward_claim(outcome: &str, duration_secs: f64) {
    metrics::counter!("reward_claims_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("reward_claim_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// 记录成就解锁
#[inline]
pub fn record_achievement_unlock(code: &str) {
    metrics::counter!("achievement_unlocks_total", "code" => code.to_string()).increment(1);
}

/// 记录连续打卡状态迁移
#[inline]
pub fn record_streak_transition(kind: &str) {
    metrics::counter!("streak_transitions_total", "kind" => kind.to_string()).increment(1);
}

/// 记录过期处理数量
#[inline]
pub fn record_rewards_expired(count: u64) {
    metrics::counter!("rewards_expired_total").increment(count);
}

/// 记录事件投递
#[inline]
pub fn record_event_published(event_type: &str, status: &str) {
    metrics::counter!(
        "events_published_total",
        "event_type" => event_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录后台 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string())
        .set(chrono::Utc::now().timestamp() as f64);
}
