//! 代币账本仓储
//!
//! 只有插入与查询，没有更新和删除

use sqlx::{PgConnection, PgPool};

use crate::error::{GamificationError, Result};
use crate::models::{LedgerHead, NewLedgerEntry, TokenLedgerEntry, TokenStats};

const LEDGER_COLUMNS: &str =
    "id, user_id, seq, delta, balance_after, reason, ref_type, ref_id, remark, created_at";

pub struct TokenLedgerRepository {
    pool: PgPool,
}

impl TokenLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中读取账本头，无流水时为 (0, 0)
    pub async fn head_in_tx(conn: &mut PgConnection, user_id: &str) -> Result<LedgerHead> {
        let head = sqlx::query_as::<_, LedgerHead>(
            r#"
            SELECT seq, balance_after
            FROM token_ledger
            WHERE user_id = $1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(head.unwrap_or_default())
    }

    /// 在事务中插入一条流水
    ///
    /// `(user_id, seq)` 唯一约束冲突说明出现了未加锁的并发写入
    pub async fn insert_in_tx(
        conn: &mut PgConnection,
        entry: &NewLedgerEntry,
        head: LedgerHead,
    ) -> Result<TokenLedgerEntry> {
        let inserted = sqlx::query_as::<_, TokenLedgerEntry>(&format!(
            r#"
            INSERT INTO token_ledger (user_id, seq, delta, balance_after, reason, ref_type, ref_id, remark)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {LEDGER_COLUMNS}
            "#
        ))
        .bind(&entry.user_id)
        .bind(head.seq)
        .bind(entry.delta)
        .bind(head.balance_after)
        .bind(entry.reason)
        .bind(entry.ref_type)
        .bind(&entry.ref_id)
        .bind(&entry.remark)
        .fetch_one(conn)
        .await
        .map_err(GamificationError::from_db)?;

        Ok(inserted)
    }

    /// 当前余额（最新一条流水的 balance_after）
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            "SELECT balance_after FROM token_ledger WHERE user_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or(0))
    }

    /// 收支统计
    pub async fn stats(&self, user_id: &str) -> Result<TokenStats> {
        let stats = sqlx::query_as::<_, TokenStats>(
            r#"
            SELECT COALESCE(SUM(delta), 0)::BIGINT AS balance,
                   COALESCE(SUM(delta) FILTER (WHERE delta > 0), 0)::BIGINT AS total_earned,
                   COALESCE(-SUM(delta) FILTER (WHERE delta < 0), 0)::BIGINT AS total_spent
            FROM token_ledger
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    /// 分页查询流水，按序号倒序
    pub async fn history(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TokenLedgerEntry>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token_ledger WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let entries = sqlx::query_as::<_, TokenLedgerEntry>(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM token_ledger
            WHERE user_id = $1
            ORDER BY seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((entries, total))
    }

    /// 用户全部流水，按序号升序（用于校验）
    pub async fn list_all(&self, user_id: &str) -> Result<Vec<TokenLedgerEntry>> {
        let entries = sqlx::query_as::<_, TokenLedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM token_ledger WHERE user_id = $1 ORDER BY seq ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// 累计获得代币
    pub async fn tokens_earned_in_tx(conn: &mut PgConnection, user_id: &str) -> Result<i64> {
        let earned: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0)::BIGINT FROM token_ledger WHERE user_id = $1 AND delta > 0",
        )
        .bind(user_id)
        .fetch_one(conn)
        .await?;

        Ok(earned)
    }
}
