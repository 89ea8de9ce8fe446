//! 连续打卡服务

use chrono::{DateTime, NaiveDate, Utc};
use fitquest_shared::observability::metrics;
use sqlx::{PgConnection, PgPool};
use tracing::warn;

use crate::error::Result;
use crate::models::{ClaimedReward, Streak, StreakTransition};
use crate::repository::{RewardRepository, StreakRepository};

/// 一次推进的结果
#[derive(Debug, Clone)]
pub struct StreakUpdate {
    pub streak: Streak,
    pub transition: StreakTransition,
    /// 本次消耗的保护卡
    pub consumed_saver: Option<ClaimedReward>,
}

pub struct StreakTracker {
    pool: PgPool,
    repo: StreakRepository,
}

impl StreakTracker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: StreakRepository::new(pool.clone()),
            pool,
        }
    }

    /// 读取当前状态并附带保护卡数量
    pub async fn current_in_tx(conn: &mut PgConnection, user_id: &str) -> Result<Streak> {
        let mut streak = StreakRepository::get_for_update_in_tx(&mut *conn, user_id)
            .await?
            .unwrap_or_else(|| Streak::empty(user_id));
        streak.recovery_items = RewardRepository::streak_saver_units_in_tx(&mut *conn, user_id).await?;
        Ok(streak)
    }

    /// 在调用方事务中计入一个打卡日，调用方必须已持有该用户的锁
    pub async fn record_attendance_day_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<StreakUpdate> {
        let current = Self::current_in_tx(&mut *conn, user_id).await?;
        let (mut next, mut transition) = current.advance(day);

        let mut consumed_saver = None;
        if transition.consumes_recovery() {
            consumed_saver = RewardRepository::consume_streak_saver_in_tx(&mut *conn, user_id, now).await?;
            if consumed_saver.is_none() {
                // 库存有数量但没有可用的领取记录，按无保护卡处理
                warn!(user_id, "保护卡库存与领取记录不一致");
                let without_items = Streak {
                    recovery_items: 0,
                    ..current
                };
                (next, transition) = without_items.advance(day);
            }
        }

        if transition.is_change() {
            StreakRepository::upsert_in_tx(&mut *conn, &next).await?;
        }
        metrics::record_streak_transition(transition.as_str());

        Ok(StreakUpdate {
            streak: next,
            transition,
            consumed_saver,
        })
    }

    /// 当前连续打卡状态
    pub async fn get(&self, user_id: &str) -> Result<Streak> {
        let mut streak = self
            .repo
            .get(user_id)
            .await?
            .unwrap_or_else(|| Streak::empty(user_id));

        let mut conn = self.pool.acquire().await?;
        streak.recovery_items = RewardRepository::streak_saver_units_in_tx(&mut conn, user_id).await?;
        Ok(streak)
    }
}
