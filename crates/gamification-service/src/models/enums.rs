//! 游戏化领域枚举
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 账本流水原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerReason {
    /// 有效打卡奖励（+）
    AttendanceReward,
    /// 成就解锁奖励（+）
    AchievementUnlocked,
    /// 领取奖励消耗（-）
    RewardClaimed,
    /// 运营手工调整（±）
    AdminAdjustment,
    /// 退款补偿（+）
    Refund,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttendanceReward => "ATTENDANCE_REWARD",
            Self::AchievementUnlocked => "ACHIEVEMENT_UNLOCKED",
            Self::RewardClaimed => "REWARD_CLAIMED",
            Self::AdminAdjustment => "ADMIN_ADJUSTMENT",
            Self::Refund => "REFUND",
        }
    }

    /// 是否允许通过管理接口写入
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::AdminAdjustment | Self::Refund)
    }

    /// 该原因允许的变动方向是否包含给定符号
    pub fn accepts_delta(&self, delta: i64) -> bool {
        match self {
            Self::AttendanceReward | Self::AchievementUnlocked | Self::Refund => delta > 0,
            Self::RewardClaimed => delta < 0,
            Self::AdminAdjustment => delta != 0,
        }
    }
}

/// 流水关联对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefType {
    Attendance,
    Achievement,
    ClaimedReward,
    /// 运营操作，ref_id 为操作人
    Operator,
}

/// 已领取奖励状态
///
/// PENDING -> ACTIVE -> USED；PENDING/ACTIVE -> EXPIRED；USED 与 EXPIRED 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// 待激活（需到店核销）
    Pending,
    /// 可使用
    Active,
    /// 已使用
    Used,
    /// 已过期
    Expired,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Used => "USED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Used | Self::Expired)
    }

    /// 状态机合法迁移
    pub fn can_transition_to(&self, to: ClaimStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Active)
                | (Self::Active, Self::Used)
                | (Self::Pending, Self::Expired)
                | (Self::Active, Self::Expired)
        )
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 成就度量类型，决定进度从哪个权威数据源重算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    /// 累计打卡次数
    AttendanceCount,
    /// 当前连续打卡天数
    StreakValue,
    /// 累计获得代币（正向流水之和）
    TokensEarned,
    /// 累计领取奖励次数
    RewardsClaimed,
}

impl MetricType {
    pub const ALL: [MetricType; 4] = [
        Self::AttendanceCount,
        Self::StreakValue,
        Self::TokensEarned,
        Self::RewardsClaimed,
    ];
}

/// 成就分类（仅用于展示分组）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementCategory {
    Attendance,
    Consistency,
    Tokens,
    Rewards,
    Special,
}

/// 奖励类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    /// 合作商户折扣
    Discount,
    /// 免费入场券
    FreePass,
    /// 实物商品（到店领取）
    Product,
    /// 限时代币倍率
    TokenMultiplier,
    /// 连续打卡保护卡（可叠加）
    StreakSaver,
}
