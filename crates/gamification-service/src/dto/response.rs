//! 响应 DTO 定义

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ClaimStatus, UnlockedAchievement};
use crate::service::ClaimOutcome;

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 领取奖励响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRewardResponse {
    pub claimed_reward_id: i64,
    pub reward_id: i64,
    pub status: ClaimStatus,
    pub claimed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub tokens_spent: i64,
    pub balance: i64,
    pub already_claimed: bool,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
}

impl From<ClaimOutcome> for ClaimRewardResponse {
    fn from(outcome: ClaimOutcome) -> Self {
        let claim = outcome.claimed_reward;
        Self {
            claimed_reward_id: claim.id,
            reward_id: claim.reward_id,
            status: claim.status,
            claimed_at: claim.claimed_at,
            expires_at: claim.expires_at,
            tokens_spent: claim.tokens_spent,
            balance: outcome.balance,
            already_claimed: outcome.already_claimed,
            unlocked_achievements: outcome.unlocked_achievements,
        }
    }
}
