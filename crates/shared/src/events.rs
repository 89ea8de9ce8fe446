//! 领域事件信封
//!
//! 定义游戏化引擎对外发布事件的统一信封格式和事件类型。
//! 事件是单向通知：下游（推送、实时刷新、数据分析）消费失败不会影响已提交的业务结果。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 当前信封结构版本，字段发生不兼容变更时递增
pub const ENVELOPE_VERSION: u16 = 1;

/// 领域事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEventType {
    /// 打卡记录已创建
    AttendanceRecorded,
    /// 代币余额变动（任意原因）
    TokensUpdated,
    /// 连续打卡天数延续或重新开始
    StreakUpdated,
    /// 连续打卡中断，旧值移入 lastValue
    StreakLost,
    /// 成就解锁
    AchievementUnlocked,
    /// 奖励领取成功
    RewardClaimed,
    /// 已领取奖励状态流转（激活、使用、过期）
    RewardStatusChanged,
}

impl DomainEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttendanceRecorded => "ATTENDANCE_RECORDED",
            Self::TokensUpdated => "TOKENS_UPDATED",
            Self::StreakUpdated => "STREAK_UPDATED",
            Self::StreakLost => "STREAK_LOST",
            Self::AchievementUnlocked => "ACHIEVEMENT_UNLOCKED",
            Self::RewardClaimed => "REWARD_CLAIMED",
            Self::RewardStatusChanged => "REWARD_STATUS_CHANGED",
        }
    }
}

impl std::fmt::Display for DomainEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通用事件信封
///
/// - `event_id` 使用 UUID v7，时间有序，消费端据此去重
/// - `version` 标识信封结构版本
/// - `data` 以 JSON 承载各事件类型的业务字段
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: String,
    pub event_type: DomainEventType,
    pub version: u16,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
    /// 事件来源服务
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl EventEnvelope {
    pub fn new(
        event_type: DomainEventType,
        user_id: impl Into<String>,
        data: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            event_type,
            version: ENVELOPE_VERSION,
            user_id: user_id.into(),
            occurred_at: Utc::now(),
            data,
            source: source.into(),
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Kafka 分区键：同一用户的事件落在同一分区，保证消费顺序
    pub fn partition_key(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_serialization_matches_display() {
        let all = [
            DomainEventType::AttendanceRecorded,
            DomainEventType::TokensUpdated,
            DomainEventType::StreakUpdated,
            DomainEventType::StreakLost,
            DomainEventType::AchievementUnlocked,
            DomainEventType::RewardClaimed,
            DomainEventType::RewardStatusChanged,
        ];
        for event_type in all {
            let serialized = serde_json::to_value(event_type).unwrap();
            assert_eq!(serialized, json!(event_type.to_string()));
        }
    }

    #[test]
    fn test_envelope_camel_case_and_version() {
        let envelope = EventEnvelope::new(
            DomainEventType::TokensUpdated,
            "user-1",
            json!({ "delta": 10, "balance": 110 }),
            "gamification-service",
        );
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["eventType"], "TOKENS_UPDATED");
        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["version"], ENVELOPE_VERSION);
        assert_eq!(value["data"]["balance"], 110);
        assert!(value.get("traceId").is_none());
        assert_eq!(envelope.partition_key(), "user-1");
    }

    #[test]
    fn test_event_id_is_uuid_v7() {
        let envelope = EventEnvelope::new(DomainEventType::StreakUpdated, "u", json!({}), "s");
        let parsed = Uuid::parse_str(&envelope.event_id).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }
}
