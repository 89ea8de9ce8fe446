//! 服务层输入输出

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GamificationError, Result};
use crate::models::{
    Attendance, ClaimedReward, Coordinates, Gym, LedgerReason, Streak, UnlockedAchievement,
};

/// 打卡命令，字段缺失在服务层统一判定
#[derive(Debug, Clone, Default)]
pub struct CheckInCommand {
    pub user_id: String,
    pub gym_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
}

impl CheckInCommand {
    /// 取出必填字段，缺失时返回 `MissingFields`
    pub fn required(&self) -> Result<(i64, Coordinates)> {
        let missing: Vec<&str> = [
            ("gymId", self.gym_id.is_none()),
            ("latitude", self.latitude.is_none()),
            ("longitude", self.longitude.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (self.gym_id, self.latitude, self.longitude) {
            (Some(gym_id), Some(latitude), Some(longitude)) => {
                Ok((gym_id, Coordinates::new(latitude, longitude)))
            }
            _ => Err(GamificationError::MissingFields(missing.join(", "))),
        }
    }
}

/// 打卡涉及的健身房摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GymSummary {
    pub id: i64,
    pub name: String,
}

impl From<&Gym> for GymSummary {
    fn from(gym: &Gym) -> Self {
        Self {
            id: gym.id,
            name: gym.name.clone(),
        }
    }
}

/// 打卡结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInOutcome {
    pub attendance: Attendance,
    pub gym: GymSummary,
    /// 当天已打过卡，本次未产生任何变动
    pub already_checked_in: bool,
    pub tokens_awarded: i64,
    pub balance: i64,
    pub streak: Streak,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
}

/// 领取命令
#[derive(Debug, Clone)]
pub struct ClaimCommand {
    pub user_id: String,
    pub reward_id: i64,
    /// 客户端领取凭证，重试时携带相同值
    pub code: Option<String>,
}

/// 领取结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub claimed_reward: ClaimedReward,
    pub balance: i64,
    /// 凭证已使用过，返回的是之前的领取记录
    pub already_claimed: bool,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
}

/// 运营调整命令
#[derive(Debug, Clone)]
pub struct AdjustCommand {
    pub user_id: String,
    pub delta: i64,
    pub reason: LedgerReason,
    pub note: Option<String>,
    pub operator_id: String,
}

/// 账本校验结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerification {
    pub user_id: String,
    pub balance: i64,
    pub entry_count: usize,
    pub verified_at: DateTime<Utc>,
}
