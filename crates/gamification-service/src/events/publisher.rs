//! 事件发布
//!
//! `EventPublisher` 是单向出口：生产环境写 Kafka，未启用 Kafka 时写日志。
//! `EventDispatcher` 在后台任务里按顺序发布，失败按退避策略重试。

use std::sync::Arc;

use async_trait::async_trait;
use fitquest_shared::error::SharedError;
use fitquest_shared::events::EventEnvelope;
use fitquest_shared::kafka::{KafkaProducer, topics};
use fitquest_shared::observability::metrics;
use fitquest_shared::retry::{RetryPolicy, retry_with_policy};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 事件发布接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), SharedError>;
}

/// Kafka 发布器
pub struct KafkaEventPublisher {
    producer: KafkaProducer,
    topic: String,
}

impl KafkaEventPublisher {
    pub fn new(producer: KafkaProducer) -> Self {
        Self {
            producer,
            topic: topics::GAMIFICATION_EVENTS.to_string(),
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), SharedError> {
        let version = event.version.to_string();
        let mut headers = vec![
            ("event_type", event.event_type.as_str()),
            ("event_version", version.as_str()),
        ];
        if let Some(trace_id) = event.trace_id.as_deref() {
            headers.push(("trace_id", trace_id));
        }

        self.producer
            .send_json(&self.topic, event.partition_key(), event, &headers)
            .await?;
        Ok(())
    }
}

/// 日志发布器，未启用 Kafka 时使用
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), SharedError> {
        info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            user_id = %event.user_id,
            data = %event.data,
            "领域事件"
        );
        Ok(())
    }
}

/// 事件分发器
#[derive(Clone)]
pub struct EventDispatcher {
    publisher: Arc<dyn EventPublisher>,
    policy: RetryPolicy,
}

impl EventDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 在后台按顺序发布一组事件（fire-and-forget）
    ///
    /// 返回的句柄仅供测试等待完成
    pub fn dispatch(&self, events: Vec<EventEnvelope>) -> Option<JoinHandle<()>> {
        if events.is_empty() {
            return None;
        }

        let publisher = self.publisher.clone();
        let policy = self.policy.clone();

        Some(tokio::spawn(async move {
            for event in events {
                let result = retry_with_policy(
                    &policy,
                    "publish_event",
                    SharedError::is_retryable,
                    || publisher.publish(&event),
                )
                .await;

                match result {
                    Ok(()) => metrics::record_event_published(event.event_type.as_str(), "ok"),
                    Err(e) => {
                        metrics::record_event_published(event.event_type.as_str(), "failed");
                        error!(
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            user_id = %event.user_id,
                            error = %e,
                            "领域事件发布失败"
                        );
                    }
                }
            }
        }))
    }
}
