//! 外部目录的 PostgreSQL 实现
//!
//! 读取由健身房/订阅系统同步过来的只读表

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::traits::{GymDirectory, MembershipDirectory};
use crate::error::Result;
use crate::models::Gym;

/// 高级会员等级
const PREMIUM_TIERS: &[&str] = &["PREMIUM", "VIP"];

pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GymDirectory for PgDirectory {
    async fn find_gym(&self, gym_id: i64) -> Result<Option<Gym>> {
        let gym = sqlx::query_as::<_, Gym>(
            r#"
            SELECT id, name, latitude, longitude, geofence_radius_meters, is_active
            FROM gyms
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(gym_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(gym)
    }
}

#[async_trait]
impl MembershipDirectory for PgDirectory {
    async fn has_active_subscription(
        &self,
        user_id: &str,
        gym_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM gym_subscriptions
                WHERE user_id = $1 AND gym_id = $2
                  AND valid_from <= $3
                  AND (valid_until IS NULL OR valid_until > $3)
            )
            "#,
        )
        .bind(user_id)
        .bind(gym_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn is_premium(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let tiers: Vec<String> = PREMIUM_TIERS.iter().map(|t| t.to_string()).collect();
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_memberships
                WHERE user_id = $1
                  AND tier = ANY($2)
                  AND (valid_until IS NULL OR valid_until > $3)
            )
            "#,
        )
        .bind(user_id)
        .bind(&tiers)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
