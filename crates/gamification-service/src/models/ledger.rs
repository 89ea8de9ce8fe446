//! 代币账本
//!
//! 账本只追加不修改，每条流水携带用户内序号和变动后余额，
//! 余额永远从最新一条流水推导。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{LedgerReason, RefType};
use crate::error::{GamificationError, Result};

/// 代币流水
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TokenLedgerEntry {
    /// 全局递增 ID
    pub id: i64,
    pub user_id: String,
    /// 用户内序号，从 1 开始连续递增
    pub seq: i64,
    /// 变动量（正为收入，负为支出，不为 0）
    pub delta: i64,
    /// 变动后余额
    pub balance_after: i64,
    pub reason: LedgerReason,
    #[sqlx(default)]
    pub ref_type: Option<RefType>,
    #[sqlx(default)]
    pub ref_id: Option<String>,
    #[sqlx(default)]
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的流水
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub user_id: String,
    pub delta: i64,
    pub reason: LedgerReason,
    pub ref_type: Option<RefType>,
    pub ref_id: Option<String>,
    pub remark: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(user_id: impl Into<String>, delta: i64, reason: LedgerReason) -> Self {
        Self {
            user_id: user_id.into(),
            delta,
            reason,
            ref_type: None,
            ref_id: None,
            remark: None,
        }
    }

    /// 收入
    pub fn credit(user_id: impl Into<String>, amount: i64, reason: LedgerReason) -> Self {
        Self::new(user_id, amount, reason)
    }

    /// 支出
    pub fn debit(user_id: impl Into<String>, amount: i64, reason: LedgerReason) -> Self {
        Self::new(user_id, -amount, reason)
    }

    pub fn with_ref(mut self, ref_type: RefType, ref_id: impl ToString) -> Self {
        self.ref_type = Some(ref_type);
        self.ref_id = Some(ref_id.to_string());
        self
    }

    pub fn with_remark(mut self, remark: Option<String>) -> Self {
        self.remark = remark;
        self
    }
}

/// 账本头：用户最新一条流水的序号与余额
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerHead {
    pub seq: i64,
    pub balance_after: i64,
}

impl LedgerHead {
    /// 计算追加一笔变动后的账本头
    pub fn apply(&self, delta: i64) -> Result<LedgerHead> {
        if delta == 0 {
            return Err(GamificationError::Validation(
                "流水变动量不能为 0".to_string(),
            ));
        }
        let balance_after = self
            .balance_after
            .checked_add(delta)
            .ok_or_else(|| GamificationError::Validation("流水变动量溢出".to_string()))?;
        if balance_after < 0 {
            return Err(GamificationError::InsufficientBalance {
                required: -delta,
                available: self.balance_after,
            });
        }
        Ok(LedgerHead {
            seq: self.seq + 1,
            balance_after,
        })
    }
}

/// 代币统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    pub balance: i64,
    /// 正向流水之和
    pub total_earned: i64,
    /// 负向流水绝对值之和
    pub total_spent: i64,
}

/// 校验用户完整流水链（按 seq 升序），返回推导出的余额
///
/// 要求序号从 1 连续、每条余额等于上一条余额加变动量且不为负
pub fn verify_chain(user_id: &str, entries: &[TokenLedgerEntry]) -> Result<i64> {
    let violation = |detail: String| GamificationError::LedgerIntegrityViolation {
        user_id: user_id.to_string(),
        detail,
    };

    let mut head = LedgerHead::default();
    for entry in entries {
        if entry.seq != head.seq + 1 {
            return Err(violation(format!(
                "序号不连续: 期望 {}, 实际 {}",
                head.seq + 1,
                entry.seq
            )));
        }
        if entry.delta == 0 {
            return Err(violation(format!("seq={} 变动量为 0", entry.seq)));
        }
        let expected = head.balance_after + entry.delta;
        if entry.balance_after != expected || entry.balance_after < 0 {
            return Err(violation(format!(
                "seq={} 余额不一致: 期望 {}, 实际 {}",
                entry.seq, expected, entry.balance_after
            )));
        }
        head = LedgerHead {
            seq: entry.seq,
            balance_after: entry.balance_after,
        };
    }

    Ok(head.balance_after)
}
