//! 服务层
//!
//! 协调仓储、用户锁与事件发布，实现打卡后的全部结算。
//!
//! ## 模块结构
//!
//! - `dto`: 服务层命令与结果
//! - `attendance_service`: 打卡 / 签退
//! - `ledger_service`: 代币账本
//! - `streak_service`: 连续打卡
//! - `achievement_service`: 成就评估
//! - `reward_service`: 奖励领取与状态机

pub mod achievement_service;
pub mod attendance_service;
pub mod dto;
pub mod ledger_service;
pub mod reward_service;
pub mod streak_service;

pub use achievement_service::{AchievementEvaluation, AchievementEvaluator};
pub use attendance_service::AttendanceRecorder;
pub use dto::*;
pub use ledger_service::TokenLedger;
pub use reward_service::RewardClaimManager;
pub use streak_service::{StreakTracker, StreakUpdate};
