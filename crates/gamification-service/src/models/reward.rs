//! 奖励定义、已领取奖励与领取资格规则

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{ClaimStatus, RewardType};
use crate::error::{GamificationError, Result};
use crate::settings::RewardSettings;

/// 有效期、冷却期与免费入场天数上限
pub const MAX_EFFECT_DAYS: i64 = 3650;
/// 限时倍率持续时长上限（小时）
pub const MAX_EFFECT_HOURS: i64 = 24 * 366;

/// `at + days`，溢出时返回内部错误
pub fn checked_add_days(at: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_days(days)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| GamificationError::Internal(format!("时间计算溢出: {at} + {days} 天")))
}

/// `at + hours`，溢出时返回内部错误
pub fn checked_add_hours(at: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_hours(hours)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| GamificationError::Internal(format!("时间计算溢出: {at} + {hours} 小时")))
}

/// 奖励定义
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardDefinition {
    pub id: i64,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
    pub reward_type: RewardType,
    /// 奖励效果（JSON，按 `type` 区分结构）
    pub effect: Value,
    pub token_cost: i64,
    /// 同一奖励两次领取的最小间隔
    #[sqlx(default)]
    pub cooldown_days: Option<i32>,
    /// 不限量，忽略 stock
    pub is_unlimited: bool,
    pub requires_premium: bool,
    pub is_stackable: bool,
    pub max_stack: i32,
    /// 剩余库存（null 表示不限量）
    #[sqlx(default)]
    pub stock: Option<i32>,
    #[sqlx(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl RewardDefinition {
    /// 解析奖励效果，并校验与奖励类型一致
    pub fn parse_effect(&self) -> Result<RewardEffect> {
        let effect: RewardEffect = serde_json::from_value(self.effect.clone()).map_err(|e| {
            GamificationError::Internal(format!("奖励 {} 效果配置无效: {}", self.id, e))
        })?;
        if effect.reward_type() != self.reward_type {
            return Err(GamificationError::Internal(format!(
                "奖励 {} 效果类型与奖励类型不一致",
                self.id
            )));
        }
        effect.validate().map_err(|e| {
            GamificationError::Internal(format!("奖励 {} 效果配置无效: {}", self.id, e))
        })?;
        Ok(effect)
    }

    /// 是否受库存约束
    pub fn tracks_stock(&self) -> bool {
        !self.is_unlimited && self.stock.is_some()
    }

    /// 上下架与有效期检查
    pub fn check_availability(&self, now: DateTime<Utc>) -> Result<()> {
        let reason = if !self.is_active {
            Some("奖励已下架")
        } else if self.valid_from.is_some_and(|from| now < from) {
            Some("奖励尚未开放")
        } else if self.valid_until.is_some_and(|until| now >= until) {
            Some("奖励已结束")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(GamificationError::RewardUnavailable {
                reward_id: self.id,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// 奖励效果，领取时按类型分派一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RewardEffect {
    /// 折扣券
    Discount {
        percent: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validity_days: Option<i64>,
    },
    /// 免费入场若干天
    FreePass { days: i64 },
    /// 实物商品，需到店激活
    Product { sku: String },
    /// 限时代币倍率
    TokenMultiplier { factor: f64, duration_hours: i64 },
    /// 连续打卡保护卡
    StreakSaver,
}

impl RewardEffect {
    pub fn reward_type(&self) -> RewardType {
        match self {
            Self::Discount { .. } => RewardType::Discount,
            Self::FreePass { .. } => RewardType::FreePass,
            Self::Product { .. } => RewardType::Product,
            Self::TokenMultiplier { .. } => RewardType::TokenMultiplier,
            Self::StreakSaver => RewardType::StreakSaver,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Discount {
                percent,
                validity_days,
            } => {
                if !(1..=100).contains(percent) {
                    return Err(format!("percent 超出范围: {percent}"));
                }
                if validity_days.is_some_and(|d| !(1..=MAX_EFFECT_DAYS).contains(&d)) {
                    return Err(format!("validityDays 必须在 1..={MAX_EFFECT_DAYS} 之间"));
                }
            }
            Self::FreePass { days } if !(1..=MAX_EFFECT_DAYS).contains(days) => {
                return Err(format!("days 必须在 1..={MAX_EFFECT_DAYS} 之间"));
            }
            Self::Product { sku } if sku.trim().is_empty() => {
                return Err("sku 不能为空".to_string());
            }
            Self::TokenMultiplier {
                factor,
                duration_hours,
            } => {
                if !factor.is_finite() || *factor < 1.0 {
                    return Err(format!("factor 必须不小于 1: {factor}"));
                }
                if !(1..=MAX_EFFECT_HOURS).contains(duration_hours) {
                    return Err(format!("durationHours 必须在 1..={MAX_EFFECT_HOURS} 之间"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// 计算领取后的初始状态、过期时间与附带效果
    ///
    /// 可叠加奖励（以及保护卡）计入用户库存，受 `maxStack` 约束
    pub fn plan(
        &self,
        claimed_at: DateTime<Utc>,
        settings: &RewardSettings,
        stackable: bool,
    ) -> Result<ClaimPlan> {
        let mut plan = match self {
            Self::Discount { validity_days, .. } => ClaimPlan::active_until(checked_add_days(
                claimed_at,
                validity_days.unwrap_or(settings.default_validity_days),
            )?),
            Self::FreePass { days } => ClaimPlan::active_until(checked_add_days(claimed_at, *days)?),
            Self::Product { .. } => ClaimPlan {
                status: ClaimStatus::Pending,
                expires_at: Some(checked_add_days(claimed_at, settings.pending_activation_days)?),
                timed_effect: None,
                adds_inventory: false,
            },
            Self::TokenMultiplier { duration_hours, .. } => {
                let expires_at = checked_add_hours(claimed_at, *duration_hours)?;
                ClaimPlan {
                    timed_effect: Some(EffectWindow {
                        starts_at: claimed_at,
                        expires_at,
                    }),
                    ..ClaimPlan::active_until(expires_at)
                }
            }
            Self::StreakSaver => ClaimPlan {
                status: ClaimStatus::Active,
                expires_at: None,
                timed_effect: None,
                adds_inventory: true,
            },
        };
        plan.adds_inventory |= stackable;
        Ok(plan)
    }
}

/// 限时效果生效窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectWindow {
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 领取计划
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimPlan {
    pub status: ClaimStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// 需要登记的限时效果
    pub timed_effect: Option<EffectWindow>,
    /// 是否计入用户库存（可叠加奖励）
    pub adds_inventory: bool,
}

impl ClaimPlan {
    fn active_until(expires_at: DateTime<Utc>) -> Self {
        Self {
            status: ClaimStatus::Active,
            expires_at: Some(expires_at),
            timed_effect: None,
            adds_inventory: false,
        }
    }
}

/// 已领取奖励
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedReward {
    pub id: i64,
    pub user_id: String,
    pub reward_id: i64,
    pub reward_type: RewardType,
    /// 客户端领取凭证，同一用户内唯一
    #[sqlx(default)]
    pub code_id: Option<String>,
    pub claimed_at: DateTime<Utc>,
    pub status: ClaimStatus,
    pub tokens_spent: i64,
    #[sqlx(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub used_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ClaimedReward {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_reward_expired(self.status, self.expires_at, now)
    }

    /// 校验状态迁移
    pub fn ensure_transition(&self, to: ClaimStatus) -> Result<()> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(GamificationError::InvalidTransition {
                claimed_reward_id: self.id,
                from: self.status,
                to,
            })
        }
    }
}

/// 过期判定：仍处于 PENDING/ACTIVE 且过期时间已到
pub fn is_reward_expired(
    status: ClaimStatus,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    matches!(status, ClaimStatus::Pending | ClaimStatus::Active)
        && expires_at.is_some_and(|at| at <= now)
}

/// 用户奖励库存（可叠加奖励）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RewardInventoryItem {
    pub user_id: String,
    pub reward_id: i64,
    pub quantity: i32,
    pub max_stack: i32,
}

/// 限时生效中的奖励效果
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRewardEffect {
    pub id: i64,
    pub user_id: String,
    pub claimed_reward_id: i64,
    pub effect: Value,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 领取资格检查所需的用户状态，在用户锁内读取
#[derive(Debug, Clone, Copy)]
pub struct ClaimContext {
    pub now: DateTime<Utc>,
    pub last_claimed_at: Option<DateTime<Utc>>,
    pub inventory_quantity: i32,
    pub balance: i64,
}

/// 锁内资格检查，依次为冷却、叠加上限、代币、库存
pub fn check_claim_eligibility(reward: &RewardDefinition, ctx: &ClaimContext) -> Result<()> {
    if let (Some(days), Some(last)) = (reward.cooldown_days, ctx.last_claimed_at) {
        let available_at = checked_add_days(last, days as i64)?;
        if days > 0 && ctx.now < available_at {
            return Err(GamificationError::OnCooldown {
                reward_id: reward.id,
                available_at,
            });
        }
    }

    if reward.is_stackable && ctx.inventory_quantity >= reward.max_stack {
        return Err(GamificationError::StackLimitReached {
            reward_id: reward.id,
            max_stack: reward.max_stack,
        });
    }

    if ctx.balance < reward.token_cost {
        return Err(GamificationError::InsufficientTokens {
            required: reward.token_cost,
            available: ctx.balance,
        });
    }

    if reward.tracks_stock() && reward.stock == Some(0) {
        return Err(GamificationError::OutOfStock(reward.id));
    }

    Ok(())
}

/// 打卡奖励 = 基础代币 × 倍率（倍率限制在 [1, max]，向下取整）
pub fn attendance_reward(base: i64, multiplier: Option<f64>, max_multiplier: f64) -> i64 {
    let factor = multiplier
        .filter(|f| f.is_finite())
        .unwrap_or(1.0)
        .clamp(1.0, max_multiplier.max(1.0));
    ((base as f64) * factor).floor() as i64
}
