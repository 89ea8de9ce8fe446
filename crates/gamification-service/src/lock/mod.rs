//! 用户级事务锁
//!
//! 同一用户的所有写路径（账本、连续打卡、成就解锁、奖励领取）串行执行，
//! 不同用户之间并行。
//!
//! ## 使用示例
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! UserLock::acquire_in_tx(&mut tx, user_id, lock_timeout_ms).await?;
//! // ... 受保护的读写 ...
//! tx.commit().await?; // 提交或回滚时自动释放
//! ```

mod user_lock;

pub use user_lock::{UserLock, user_lock_key};
