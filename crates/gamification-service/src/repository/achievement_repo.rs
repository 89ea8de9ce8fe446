//! 成就仓储

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::{AchievementDefinition, UserAchievementProgress};

const DEFINITION_COLUMNS: &str = "code, name, description, category, metric_type, target_value, \
                                  token_reward, is_active, sort_order";

pub struct AchievementRepository {
    pool: PgPool,
}

impl AchievementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 启用中的成就定义
    pub async fn list_active_definitions(&self) -> Result<Vec<AchievementDefinition>> {
        let definitions = sqlx::query_as::<_, AchievementDefinition>(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM achievement_definitions \
             WHERE is_active = TRUE ORDER BY sort_order, code"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(definitions)
    }

    pub async fn list_active_definitions_in_tx(
        conn: &mut PgConnection,
    ) -> Result<Vec<AchievementDefinition>> {
        let definitions = sqlx::query_as::<_, AchievementDefinition>(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM achievement_definitions \
             WHERE is_active = TRUE ORDER BY sort_order, code"
        ))
        .fetch_all(conn)
        .await?;

        Ok(definitions)
    }

    /// 用户全部成就进度
    pub async fn list_progress(&self, user_id: &str) -> Result<Vec<UserAchievementProgress>> {
        let progress = sqlx::query_as::<_, UserAchievementProgress>(
            r#"
            SELECT user_id, achievement_code, current_value, unlocked_at, updated_at
            FROM user_achievements
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(progress)
    }

    pub async fn list_progress_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
    ) -> Result<Vec<UserAchievementProgress>> {
        let progress = sqlx::query_as::<_, UserAchievementProgress>(
            r#"
            SELECT user_id, achievement_code, current_value, unlocked_at, updated_at
            FROM user_achievements
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(progress)
    }

    /// 推进未解锁成就的进度，进度只增不减
    pub async fn advance_progress_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        code: &str,
        value: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_achievements (user_id, achievement_code, current_value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, achievement_code) DO UPDATE
            SET current_value = GREATEST(user_achievements.current_value, EXCLUDED.current_value),
                updated_at = NOW()
            WHERE user_achievements.unlocked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(value)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// 条件解锁，仅当尚未解锁时成功
    ///
    /// 返回 true 表示本次调用完成了解锁
    pub async fn try_unlock_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        code: &str,
        value: i64,
        unlocked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let unlocked: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO user_achievements (user_id, achievement_code, current_value, unlocked_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_id, achievement_code) DO UPDATE
            SET current_value = GREATEST(user_achievements.current_value, EXCLUDED.current_value),
                unlocked_at = EXCLUDED.unlocked_at,
                updated_at = EXCLUDED.updated_at
            WHERE user_achievements.unlocked_at IS NULL
            RETURNING achievement_code
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(value)
        .bind(unlocked_at)
        .fetch_optional(conn)
        .await?;

        Ok(unlocked.is_some())
    }
}
