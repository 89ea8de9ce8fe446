//! 代币账本服务
//!
//! 所有余额变动都经过 `append_in_tx`：调用方先持有用户锁，
//! 再在锁内读取账本头、计算新余额并追加一条流水。

use std::sync::Arc;

use chrono::Utc;
use fitquest_shared::observability::metrics;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};

use super::achievement_service::AchievementEvaluator;
use super::dto::{AdjustCommand, LedgerVerification};
use crate::error::{GamificationError, Result};
use crate::events::{self, EventDispatcher};
use crate::lock::UserLock;
use crate::models::{
    AchievementTrigger, NewLedgerEntry, RefType, TokenLedgerEntry, TokenStats, verify_chain,
};
use crate::repository::TokenLedgerRepository;

pub struct TokenLedger {
    pool: PgPool,
    repo: TokenLedgerRepository,
    achievements: Arc<AchievementEvaluator>,
    dispatcher: EventDispatcher,
    lock_timeout_ms: u64,
}

impl TokenLedger {
    pub fn new(
        pool: PgPool,
        achievements: Arc<AchievementEvaluator>,
        dispatcher: EventDispatcher,
        lock_timeout_ms: u64,
    ) -> Self {
        Self {
            repo: TokenLedgerRepository::new(pool.clone()),
            pool,
            achievements,
            dispatcher,
            lock_timeout_ms,
        }
    }

    /// 在调用方事务中追加流水，调用方必须已持有该用户的锁
    pub async fn append_in_tx(
        conn: &mut PgConnection,
        entry: NewLedgerEntry,
    ) -> Result<TokenLedgerEntry> {
        if !entry.reason.accepts_delta(entry.delta) {
            return Err(GamificationError::Validation(format!(
                "{} 不允许变动量 {}",
                entry.reason.as_str(),
                entry.delta
            )));
        }

        let head = TokenLedgerRepository::head_in_tx(&mut *conn, &entry.user_id).await?;
        let next = head.apply(entry.delta)?;
        let inserted = TokenLedgerRepository::insert_in_tx(&mut *conn, &entry, next).await?;

        metrics::record_ledger_entry(entry.reason.as_str(), entry.delta);
        Ok(inserted)
    }

    /// 独立事务追加一条流水
    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, delta = entry.delta))]
    pub async fn append(&self, entry: NewLedgerEntry) -> Result<TokenLedgerEntry> {
        let mut tx = self.pool.begin().await?;
        UserLock::acquire_in_tx(&mut tx, &entry.user_id, self.lock_timeout_ms).await?;
        let inserted = Self::append_in_tx(&mut tx, entry).await?;
        tx.commit().await?;

        self.dispatcher.dispatch(vec![events::tokens_updated(&inserted)]);
        Ok(inserted)
    }

    /// 当前余额
    pub async fn balance_of(&self, user_id: &str) -> Result<i64> {
        self.repo.balance(user_id).await
    }

    /// 全链校验后的余额
    ///
    /// 逐条核对序号与余额快照，并与快速路径读到的余额比对
    #[instrument(skip(self))]
    pub async fn verified_balance(&self, user_id: &str) -> Result<LedgerVerification> {
        let entries = self.repo.list_all(user_id).await?;
        let verified = verify_chain(user_id, &entries)?;

        let stats = self.repo.stats(user_id).await?;
        if stats.balance != verified {
            return Err(GamificationError::LedgerIntegrityViolation {
                user_id: user_id.to_string(),
                detail: format!("流水合计 {} 与余额快照 {} 不一致", stats.balance, verified),
            });
        }

        Ok(LedgerVerification {
            user_id: user_id.to_string(),
            balance: verified,
            entry_count: entries.len(),
            verified_at: Utc::now(),
        })
    }

    pub async fn stats(&self, user_id: &str) -> Result<TokenStats> {
        self.repo.stats(user_id).await
    }

    /// 分页流水，最新在前
    pub async fn history(
        &self,
        user_id: &str,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<TokenLedgerEntry>, i64)> {
        self.repo
            .history(user_id, page_size, page_offset(page, page_size))
            .await
    }

    /// 运营调整与退款
    ///
    /// 正向调整可能跨过代币类成就阈值，需要在同一事务内重算
    #[instrument(skip(self, cmd), fields(user_id = %cmd.user_id, delta = cmd.delta, operator = %cmd.operator_id))]
    pub async fn adjust(&self, cmd: AdjustCommand) -> Result<TokenLedgerEntry> {
        if !cmd.reason.is_manual() {
            return Err(GamificationError::Validation(format!(
                "不支持手工写入 {}",
                cmd.reason.as_str()
            )));
        }

        let entry = NewLedgerEntry::new(&cmd.user_id, cmd.delta, cmd.reason)
            .with_ref(RefType::Operator, &cmd.operator_id)
            .with_remark(cmd.note.clone());

        let mut tx = self.pool.begin().await?;
        UserLock::acquire_in_tx(&mut tx, &cmd.user_id, self.lock_timeout_ms).await?;
        let inserted = Self::append_in_tx(&mut tx, entry).await?;

        let evaluation = if cmd.delta > 0 {
            AchievementEvaluator::reevaluate_in_tx(
                &mut tx,
                &cmd.user_id,
                AchievementTrigger::TokensChanged,
                Utc::now(),
            )
            .await?
        } else {
            Default::default()
        };
        tx.commit().await?;

        info!(
            seq = inserted.seq,
            balance = inserted.balance_after,
            unlocked = evaluation.unlocked.len(),
            "代币调整完成"
        );

        let mut published = vec![events::tokens_updated(&inserted)];
        published.extend(events::events_for_unlocks(&cmd.user_id, &evaluation.unlocked));
        published.extend(events::events_for_ledger_entries(&evaluation.ledger_entries));
        self.dispatcher.dispatch(published);
        if cmd.delta > 0 {
            self.achievements.invalidate_user(&cmd.user_id).await;
        }

        Ok(inserted)
    }
}

/// 分页偏移量，超大页码饱和而不是溢出
fn page_offset(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(page_size.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(0, 20), 0);
        assert_eq!(page_offset(i64::MAX, 100), i64::MAX);
        assert_eq!(page_offset(5, -1), 0);
    }
}
