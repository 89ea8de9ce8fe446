//! 外部目录 Trait 定义
//!
//! 健身房目录与会员订阅由其他系统维护，服务层只依赖这里的抽象，便于 mock 测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::Gym;

/// 健身房目录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GymDirectory: Send + Sync {
    async fn find_gym(&self, gym_id: i64) -> Result<Option<Gym>>;
}

/// 会员与订阅目录
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// 用户在某一时刻是否持有该健身房的有效订阅
    async fn has_active_subscription(
        &self,
        user_id: &str,
        gym_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// 用户在某一时刻是否为高级会员
    async fn is_premium(&self, user_id: &str, at: DateTime<Utc>) -> Result<bool>;
}
