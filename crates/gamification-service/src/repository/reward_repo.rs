//! 奖励仓储
//!
//! 奖励定义、已领取奖励、用户库存与限时效果

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};

use crate::error::{GamificationError, Result};
use crate::models::{ClaimStatus, ClaimedReward, EffectWindow, RewardDefinition, RewardType};

const REWARD_COLUMNS: &str = "id, name, description, reward_type, effect, token_cost, cooldown_days, \
                              is_unlimited, requires_premium, is_stackable, max_stack, stock, \
                              valid_from, valid_until, is_active";

const CLAIM_COLUMNS: &str = "id, user_id, reward_id, reward_type, code_id, claimed_at, status, \
                             tokens_spent, activated_at, used_at, expires_at";

/// 待写入的领取记录
#[derive(Debug, Clone)]
pub struct NewClaimedReward {
    pub user_id: String,
    pub reward_id: i64,
    pub reward_type: RewardType,
    pub code_id: Option<String>,
    pub claimed_at: DateTime<Utc>,
    pub status: ClaimStatus,
    pub tokens_spent: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct RewardRepository {
    pool: PgPool,
}

impl RewardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== 奖励定义 ====================

    pub async fn get_definition(&self, reward_id: i64) -> Result<Option<RewardDefinition>> {
        let reward = sqlx::query_as::<_, RewardDefinition>(&format!(
            "SELECT {REWARD_COLUMNS} FROM reward_definitions WHERE id = $1"
        ))
        .bind(reward_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reward)
    }

    /// 在事务中重新读取奖励定义（库存以锁内读取为准）
    pub async fn get_definition_in_tx(
        conn: &mut PgConnection,
        reward_id: i64,
    ) -> Result<Option<RewardDefinition>> {
        let reward = sqlx::query_as::<_, RewardDefinition>(&format!(
            "SELECT {REWARD_COLUMNS} FROM reward_definitions WHERE id = $1"
        ))
        .bind(reward_id)
        .fetch_optional(conn)
        .await?;

        Ok(reward)
    }

    /// 上架中的奖励目录
    pub async fn list_active_definitions(&self) -> Result<Vec<RewardDefinition>> {
        let rewards = sqlx::query_as::<_, RewardDefinition>(&format!(
            "SELECT {REWARD_COLUMNS} FROM reward_definitions WHERE is_active = TRUE ORDER BY token_cost, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rewards)
    }

    /// 条件扣减库存，库存为 0 时返回 false
    pub async fn decrement_stock_in_tx(conn: &mut PgConnection, reward_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reward_definitions
            SET stock = stock - 1, updated_at = NOW()
            WHERE id = $1 AND stock > 0
            "#,
        )
        .bind(reward_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // ==================== 已领取奖励 ====================

    pub async fn find_claim_by_code_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        code_id: &str,
    ) -> Result<Option<ClaimedReward>> {
        let claim = sqlx::query_as::<_, ClaimedReward>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claimed_rewards WHERE user_id = $1 AND code_id = $2"
        ))
        .bind(user_id)
        .bind(code_id)
        .fetch_optional(conn)
        .await?;

        Ok(claim)
    }

    /// 用户最近一次领取该奖励的时间
    pub async fn last_claimed_at_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        reward_id: i64,
    ) -> Result<Option<DateTime<Utc>>> {
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MAX(claimed_at) FROM claimed_rewards WHERE user_id = $1 AND reward_id = $2",
        )
        .bind(user_id)
        .bind(reward_id)
        .fetch_one(conn)
        .await?;

        Ok(last)
    }

    pub async fn insert_claim_in_tx(
        conn: &mut PgConnection,
        new: &NewClaimedReward,
    ) -> Result<ClaimedReward> {
        let claim = sqlx::query_as::<_, ClaimedReward>(&format!(
            r#"
            INSERT INTO claimed_rewards (user_id, reward_id, reward_type, code_id, claimed_at,
                                         status, tokens_spent, activated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CLAIM_COLUMNS}
            "#
        ))
        .bind(&new.user_id)
        .bind(new.reward_id)
        .bind(new.reward_type)
        .bind(&new.code_id)
        .bind(new.claimed_at)
        .bind(new.status)
        .bind(new.tokens_spent)
        .bind((new.status == ClaimStatus::Active).then_some(new.claimed_at))
        .bind(new.expires_at)
        .fetch_one(conn)
        .await
        .map_err(GamificationError::from_db)?;

        Ok(claim)
    }

    /// 在事务中读取并锁定用户的某条领取记录
    pub async fn get_claim_for_update_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        claimed_reward_id: i64,
    ) -> Result<Option<ClaimedReward>> {
        let claim = sqlx::query_as::<_, ClaimedReward>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claimed_rewards WHERE id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(claimed_reward_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(claim)
    }

    /// 更新状态并记录对应的时间戳
    pub async fn update_status_in_tx(
        conn: &mut PgConnection,
        claimed_reward_id: i64,
        status: ClaimStatus,
        at: DateTime<Utc>,
    ) -> Result<ClaimedReward> {
        let claim = sqlx::query_as::<_, ClaimedReward>(&format!(
            r#"
            UPDATE claimed_rewards
            SET status = $2,
                activated_at = CASE WHEN $2 = 'ACTIVE' THEN $3 ELSE activated_at END,
                used_at = CASE WHEN $2 = 'USED' THEN $3 ELSE used_at END,
                updated_at = $3
            WHERE id = $1
            RETURNING {CLAIM_COLUMNS}
            "#
        ))
        .bind(claimed_reward_id)
        .bind(status)
        .bind(at)
        .fetch_one(conn)
        .await?;

        Ok(claim)
    }

    /// 用户已领取的奖励，最新在前
    pub async fn list_claims(
        &self,
        user_id: &str,
        status: Option<ClaimStatus>,
    ) -> Result<Vec<ClaimedReward>> {
        let claims = sqlx::query_as::<_, ClaimedReward>(&format!(
            r#"
            SELECT {CLAIM_COLUMNS}
            FROM claimed_rewards
            WHERE user_id = $1 AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY claimed_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(claims)
    }

    /// 累计领取次数
    pub async fn count_claims_in_tx(conn: &mut PgConnection, user_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM claimed_rewards WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(conn)
                .await?;

        Ok(count)
    }

    // ==================== 库存与效果 ====================

    pub async fn inventory_quantity_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        reward_id: i64,
    ) -> Result<i32> {
        let quantity: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM reward_inventory WHERE user_id = $1 AND reward_id = $2",
        )
        .bind(user_id)
        .bind(reward_id)
        .fetch_optional(conn)
        .await?;

        Ok(quantity.unwrap_or(0))
    }

    /// 库存 +1，已达上限时返回 false
    pub async fn increment_inventory_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        reward_id: i64,
        max_stack: i32,
    ) -> Result<bool> {
        let quantity: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO reward_inventory (user_id, reward_id, quantity, max_stack, updated_at)
            VALUES ($1, $2, 1, $3, NOW())
            ON CONFLICT (user_id, reward_id) DO UPDATE
            SET quantity = reward_inventory.quantity + 1,
                max_stack = EXCLUDED.max_stack,
                updated_at = NOW()
            WHERE reward_inventory.quantity < EXCLUDED.max_stack
            RETURNING quantity
            "#,
        )
        .bind(user_id)
        .bind(reward_id)
        .bind(max_stack)
        .fetch_optional(conn)
        .await?;

        Ok(quantity.is_some())
    }

    /// 登记限时效果
    pub async fn insert_effect_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        claimed_reward_id: i64,
        effect: &Value,
        window: EffectWindow,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO active_reward_effects (user_id, claimed_reward_id, effect, starts_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(claimed_reward_id)
        .bind(effect)
        .bind(window.starts_at)
        .bind(window.expires_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// 当前生效的最大代币倍率，仅统计仍为 ACTIVE 的领取记录
    pub async fn active_multiplier_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let factor: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT MAX((e.effect->>'factor')::FLOAT8)
            FROM active_reward_effects e
            JOIN claimed_rewards c ON c.id = e.claimed_reward_id
            WHERE e.user_id = $1
              AND e.effect->>'type' = 'TOKEN_MULTIPLIER'
              AND c.status = 'ACTIVE'
              AND e.starts_at <= $2 AND e.expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_one(conn)
        .await?;

        Ok(factor)
    }

    /// 用户持有的保护卡数量
    pub async fn streak_saver_units_in_tx(conn: &mut PgConnection, user_id: &str) -> Result<i32> {
        let units: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(inv.quantity), 0)::BIGINT
            FROM reward_inventory inv
            JOIN reward_definitions d ON d.id = inv.reward_id
            WHERE inv.user_id = $1 AND d.reward_type = 'STREAK_SAVER'
            "#,
        )
        .bind(user_id)
        .fetch_one(conn)
        .await?;

        Ok(units.clamp(0, i32::MAX as i64) as i32)
    }

    /// 消耗一张保护卡：最早领取的 ACTIVE 记录置为 USED，对应库存 -1
    pub async fn consume_streak_saver_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ClaimedReward>> {
        let claim_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM claimed_rewards
            WHERE user_id = $1 AND reward_type = 'STREAK_SAVER' AND status = 'ACTIVE'
            ORDER BY claimed_at, id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(claim_id) = claim_id else {
            return Ok(None);
        };

        let claim = Self::update_status_in_tx(&mut *conn, claim_id, ClaimStatus::Used, at).await?;
        Self::release_inventory_in_tx(&mut *conn, user_id, claim.reward_id).await?;

        Ok(Some(claim))
    }

    /// 可叠加奖励离开 PENDING/ACTIVE 时库存 -1，无库存行时不做任何事
    pub async fn release_inventory_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        reward_id: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE reward_inventory
            SET quantity = quantity - 1, updated_at = NOW()
            WHERE user_id = $1 AND reward_id = $2 AND quantity > 0
            "#,
        )
        .bind(user_id)
        .bind(reward_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    // ==================== 过期清理 ====================

    /// 锁定一批已到期的记录，跳过被其他事务锁住的行
    pub async fn lock_expirable_batch_in_tx(
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ClaimedReward>> {
        let claims = sqlx::query_as::<_, ClaimedReward>(&format!(
            r#"
            SELECT {CLAIM_COLUMNS}
            FROM claimed_rewards
            WHERE status IN ('PENDING', 'ACTIVE')
              AND expires_at IS NOT NULL AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(claims)
    }

    pub async fn mark_expired_in_tx(
        conn: &mut PgConnection,
        ids: &[i64],
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE claimed_rewards
            SET status = 'EXPIRED', updated_at = $2
            WHERE id = ANY($1) AND status IN ('PENDING', 'ACTIVE')
            "#,
        )
        .bind(ids)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
