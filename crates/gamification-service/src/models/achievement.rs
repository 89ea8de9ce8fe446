//! 成就定义与进度

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AchievementCategory, MetricType};

/// 成就定义
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDefinition {
    pub code: String,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
    pub category: AchievementCategory,
    pub metric_type: MetricType,
    /// 达成阈值（> 0）
    pub target_value: i64,
    /// 解锁时发放的代币，0 表示不发放
    pub token_reward: i64,
    pub is_active: bool,
    pub sort_order: i32,
}

/// 用户成就进度
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievementProgress {
    pub user_id: String,
    pub achievement_code: String,
    pub current_value: i64,
    #[sqlx(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserAchievementProgress {
    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }
}

/// 触发重算的业务动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementTrigger {
    CheckIn,
    TokensChanged,
    RewardClaimed,
    /// 全量重算
    Full,
}

impl AchievementTrigger {
    /// 该动作可能影响的度量
    pub fn metric_types(&self) -> &'static [MetricType] {
        match self {
            Self::CheckIn => &[
                MetricType::AttendanceCount,
                MetricType::StreakValue,
                MetricType::TokensEarned,
            ],
            Self::TokensChanged => &[MetricType::TokensEarned],
            Self::RewardClaimed => &[MetricType::RewardsClaimed, MetricType::TokensEarned],
            Self::Full => &MetricType::ALL,
        }
    }
}

/// 进度展示
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    pub value: i64,
    pub denominator: i64,
    /// 0 ~ 100，保留一位小数
    pub percentage: f64,
}

impl AchievementProgress {
    pub fn new(current: i64, target: i64, unlocked: bool) -> Self {
        let denominator = target.max(1);
        let value = if unlocked {
            denominator
        } else {
            current.clamp(0, denominator)
        };
        let percentage = ((value as f64 / denominator as f64) * 1000.0).round() / 10.0;
        Self {
            value,
            denominator,
            percentage,
        }
    }
}

/// 单个成就的进度更新决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// 度量没有超过已记录的进度
    Unchanged,
    /// 进度前进但未达成
    Advance(i64),
    /// 达成阈值，需要解锁
    Unlock(i64),
    /// 已解锁，进度冻结
    Frozen,
}

/// 根据权威度量计算进度更新
///
/// 进度只增不减，达到阈值即解锁，解锁后不再变化
pub fn evaluate_progress(
    definition: &AchievementDefinition,
    previous: Option<&UserAchievementProgress>,
    metric: i64,
) -> ProgressUpdate {
    if previous.is_some_and(UserAchievementProgress::is_unlocked) {
        return ProgressUpdate::Frozen;
    }

    let recorded = previous.map(|p| p.current_value).unwrap_or(0);
    let value = recorded.max(metric);

    if value >= definition.target_value {
        ProgressUpdate::Unlock(value)
    } else if value > recorded {
        ProgressUpdate::Advance(value)
    } else {
        ProgressUpdate::Unchanged
    }
}

/// 本次解锁的成就
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedAchievement {
    pub code: String,
    pub name: String,
    pub token_reward: i64,
    pub unlocked_at: DateTime<Utc>,
}

/// 用户成就视图
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievementView {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: AchievementCategory,
    pub metric_type: MetricType,
    pub token_reward: i64,
    pub progress: AchievementProgress,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl UserAchievementView {
    pub fn build(
        definition: &AchievementDefinition,
        progress: Option<&UserAchievementProgress>,
    ) -> Self {
        let unlocked_at = progress.and_then(|p| p.unlocked_at);
        let current = progress.map(|p| p.current_value).unwrap_or(0);
        Self {
            code: definition.code.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            category: definition.category,
            metric_type: definition.metric_type,
            token_reward: definition.token_reward,
            progress: AchievementProgress::new(
                current,
                definition.target_value,
                unlocked_at.is_some(),
            ),
            unlocked: unlocked_at.is_some(),
            unlocked_at,
        }
    }
}
