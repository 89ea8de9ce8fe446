//! 游戏化领域模型
//!
//! 实体定义，以及不依赖数据库的纯规则（账本推导、连续打卡推进、成就进度、领取资格）

pub mod achievement;
pub mod attendance;
pub mod enums;
pub mod gym;
pub mod ledger;
pub mod reward;
pub mod streak;

pub use achievement::{
    AchievementDefinition, AchievementProgress, AchievementTrigger, ProgressUpdate,
    UnlockedAchievement, UserAchievementProgress, UserAchievementView, evaluate_progress,
};
pub use attendance::{Attendance, NewAttendance, TodayStatus};
pub use enums::{AchievementCategory, ClaimStatus, LedgerReason, MetricType, RefType, RewardType};
pub use gym::{Coordinates, Gym};
pub use ledger::{LedgerHead, NewLedgerEntry, TokenLedgerEntry, TokenStats, verify_chain};
pub use reward::{
    ActiveRewardEffect, ClaimContext, ClaimPlan, ClaimedReward, EffectWindow, RewardDefinition,
    RewardEffect, RewardInventoryItem, attendance_reward, check_claim_eligibility,
    is_reward_expired,
};
pub use streak::{Streak, StreakTransition};
