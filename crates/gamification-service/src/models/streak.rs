//! 连续打卡
//!
//! 按日增量推进，`last_counted_day` 是幂等键：同一天重复推进不生效，
//! 晚到的旧日期直接忽略。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 用户连续打卡状态
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub user_id: String,
    /// 当前连续天数
    pub value: i32,
    /// 上一次中断前的连续天数
    pub last_value: i32,
    #[sqlx(default)]
    pub last_counted_day: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
    /// 可用保护卡数量，来自奖励库存，不落在本表
    #[sqlx(skip)]
    pub recovery_items: i32,
}

/// 一次推进的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// 首次打卡
    Started,
    /// 连续的下一天
    Extended,
    /// 断档后消耗一张保护卡衔接
    Bridged { missed_days: i64 },
    /// 断档且无保护卡，重新计数
    Reset { previous: i32 },
    /// 当天已计入
    SameDay,
    /// 早于已计入日期的晚到记录
    Stale,
}

impl StreakTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Extended => "extended",
            Self::Bridged { .. } => "bridged",
            Self::Reset { .. } => "reset",
            Self::SameDay => "same_day",
            Self::Stale => "stale",
        }
    }

    /// 是否修改了连续状态
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::SameDay | Self::Stale)
    }

    pub fn consumes_recovery(&self) -> bool {
        matches!(self, Self::Bridged { .. })
    }
}

impl Streak {
    /// 从未打卡用户的初始状态
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            value: 0,
            last_value: 0,
            last_counted_day: None,
            updated_at: Utc::now(),
            recovery_items: 0,
        }
    }

    /// 计入某个自然日，返回新的状态与迁移类型
    pub fn advance(&self, day: NaiveDate) -> (Streak, StreakTransition) {
        let mut next = self.clone();

        let transition = match self.last_counted_day {
            None => {
                next.value = 1;
                StreakTransition::Started
            }
            Some(last) if day == last => return (next, StreakTransition::SameDay),
            Some(last) if day < last => return (next, StreakTransition::Stale),
            Some(last) => {
                let gap = (day - last).num_days();
                if gap == 1 {
                    next.value += 1;
                    StreakTransition::Extended
                } else if self.recovery_items > 0 {
                    next.value += 1;
                    next.recovery_items -= 1;
                    StreakTransition::Bridged {
                        missed_days: gap - 1,
                    }
                } else {
                    next.last_value = self.value;
                    next.value = 1;
                    StreakTransition::Reset {
                        previous: self.value,
                    }
                }
            }
        };

        next.last_counted_day = Some(day);
        next.updated_at = Utc::now();
        (next, transition)
    }
}
