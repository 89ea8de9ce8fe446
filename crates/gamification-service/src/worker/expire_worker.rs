//! 奖励过期处理 Worker
//!
//! 定期把已到期的 PENDING / ACTIVE 领取记录标记为 EXPIRED。
//! 使用 `FOR UPDATE SKIP LOCKED` 保证多实例部署时不会重复处理。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fitquest_shared::observability::metrics;
use tracing::{error, info};

use crate::service::RewardClaimManager;
use crate::settings::ExpireWorkerSettings;

/// 单次轮询最多处理的批次数，避免积压时长时间不让出
const MAX_BATCHES_PER_TICK: usize = 20;

pub struct RewardExpireWorker {
    rewards: Arc<RewardClaimManager>,
    poll_interval: Duration,
    batch_size: i64,
}

impl RewardExpireWorker {
    pub fn new(rewards: Arc<RewardClaimManager>, settings: &ExpireWorkerSettings) -> Self {
        Self {
            rewards,
            poll_interval: Duration::from_secs(settings.poll_interval_secs.max(1)),
            batch_size: settings.batch_size.max(1),
        }
    }

    /// 主循环：持续处理直到进程退出
    pub async fn run(&self) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "RewardExpireWorker 已启动"
        );

        loop {
            let total = self.tick().await;
            if total > 0 {
                info!(total, "本轮过期处理完成");
            }

            metrics::set_worker_last_run("reward_expire_worker");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 处理一轮：批次未满即认为已清空
    pub async fn tick(&self) -> u64 {
        let mut total = 0;
        for _ in 0..MAX_BATCHES_PER_TICK {
            match self.rewards.expire_due(Utc::now(), self.batch_size).await {
                Ok(count) => {
                    total += count;
                    if (count as i64) < self.batch_size {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "处理过期奖励出错");
                    break;
                }
            }
        }
        total
    }
}
