//! 请求 DTO 定义

use serde::Deserialize;
use validator::Validate;

use crate::models::{AchievementTrigger, ClaimStatus, LedgerReason};
use crate::service::{AdjustCommand, CheckInCommand, ClaimCommand};

/// 打卡请求
///
/// 字段均为可选，缺失字段由服务层统一以 `MISSING_FIELDS` 返回
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub gym_id: Option<i64>,
    #[validate(range(min = -90.0, max = 90.0, message = "纬度必须在 -90 到 90 之间"))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "经度必须在 -180 到 180 之间"))]
    pub longitude: Option<f64>,
    #[validate(range(min = 0.0, message = "定位精度不能为负数"))]
    pub accuracy: Option<f64>,
}

impl CheckInRequest {
    pub fn into_command(self, user_id: String) -> CheckInCommand {
        CheckInCommand {
            user_id,
            gym_id: self.gym_id,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
        }
    }
}

/// 领取奖励请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRewardRequest {
    #[validate(range(min = 1, message = "rewardId 无效"))]
    pub reward_id: i64,
    /// 客户端领取凭证，重试时携带相同值
    #[validate(length(min = 1, max = 64, message = "code 长度必须在1-64个字符之间"))]
    pub code: Option<String>,
}

impl ClaimRewardRequest {
    pub fn into_command(self, user_id: String) -> ClaimCommand {
        ClaimCommand {
            user_id,
            reward_id: self.reward_id,
            code: self.code,
        }
    }
}

/// 运营调整代币请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustTokensRequest {
    #[validate(length(min = 1, max = 64, message = "userId 长度必须在1-64个字符之间"))]
    pub user_id: String,
    pub delta: i64,
    pub reason: LedgerReason,
    #[validate(length(max = 255, message = "备注不能超过255个字符"))]
    pub note: Option<String>,
}

impl AdjustTokensRequest {
    pub fn into_command(self, operator_id: String) -> AdjustCommand {
        AdjustCommand {
            user_id: self.user_id,
            delta: self.delta,
            reason: self.reason,
            note: self.note,
            operator_id,
        }
    }
}

/// 运营触发成就重算
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReevaluateRequest {
    #[validate(length(min = 1, max = 64, message = "userId 长度必须在1-64个字符之间"))]
    pub user_id: String,
    #[serde(default = "default_trigger")]
    pub trigger: AchievementTrigger,
}

fn default_trigger() -> AchievementTrigger {
    AchievementTrigger::Full
}

/// 已领取奖励过滤
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedRewardFilter {
    pub status: Option<ClaimStatus>,
}

/// 分页参数
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// 页码上限，超出时按最后一页处理
pub const MAX_PAGE: i64 = 100_000;

impl PaginationParams {
    pub fn page(&self) -> i64 {
        self.page.clamp(1, MAX_PAGE)
    }

    /// 获取限制条数（最大100）
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }
}
