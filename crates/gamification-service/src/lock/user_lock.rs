//! 基于 PostgreSQL 事务级 advisory lock 的用户锁

use sqlx::PgConnection;
use tracing::debug;

use crate::error::{GamificationError, Result};

/// 用户锁键
pub fn user_lock_key(user_id: &str) -> String {
    format!("gamification:user:{}", user_id)
}

/// 用户级事务锁
///
/// 锁随事务结束释放，不需要显式解锁；等待超过 `lock_timeout_ms` 返回并发冲突
pub struct UserLock;

impl UserLock {
    pub async fn acquire_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        lock_timeout_ms: u64,
    ) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(GamificationError::Validation("userId 不能为空".to_string()));
        }

        // SET 不支持参数绑定，超时值为数字，直接拼接
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", lock_timeout_ms))
            .execute(&mut *conn)
            .await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(user_lock_key(user_id))
            .execute(&mut *conn)
            .await
            .map_err(GamificationError::from_db)?;

        debug!(user_id, "已获取用户锁");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_lock_key() {
        assert_eq!(user_lock_key("u-42"), "gamification:user:u-42");
        assert_ne!(user_lock_key("u-1"), user_lock_key("u-10"));
    }
}
