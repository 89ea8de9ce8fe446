//! 连续打卡仓储

use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::Streak;

pub struct StreakRepository {
    pool: PgPool,
}

impl StreakRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<Streak>> {
        let streak = sqlx::query_as::<_, Streak>(
            r#"
            SELECT user_id, value, last_value, last_counted_day, updated_at
            FROM streaks
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(streak)
    }

    /// 在事务中读取并锁定连续打卡行
    pub async fn get_for_update_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
    ) -> Result<Option<Streak>> {
        let streak = sqlx::query_as::<_, Streak>(
            r#"
            SELECT user_id, value, last_value, last_counted_day, updated_at
            FROM streaks
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(streak)
    }

    /// 在事务中写入连续打卡状态
    pub async fn upsert_in_tx(conn: &mut PgConnection, streak: &Streak) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO streaks (user_id, value, last_value, last_counted_day, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET value = EXCLUDED.value,
                last_value = EXCLUDED.last_value,
                last_counted_day = EXCLUDED.last_counted_day,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&streak.user_id)
        .bind(streak.value)
        .bind(streak.last_value)
        .bind(streak.last_counted_day)
        .bind(streak.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// 当前连续天数
    pub async fn value_in_tx(conn: &mut PgConnection, user_id: &str) -> Result<i64> {
        let value: Option<i32> = sqlx::query_scalar("SELECT value FROM streaks WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;

        Ok(value.unwrap_or(0) as i64)
    }
}
