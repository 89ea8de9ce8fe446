//! 奖励领取服务
//!
//! ## 领取流程
//!
//! 1. 凭证格式 -> 2. 奖励存在与上下架 -> 3. 会员资格（事务外）
//! 4. 开启事务 + 用户锁 -> 5. 凭证幂等 -> 6. 冷却 / 叠加 / 代币 / 库存
//! 7. 扣减库存 -> 8. 写入领取记录 -> 9. 扣除代币 -> 10. 分派奖励效果
//! 11. 重算成就 -> 12. 提交后发布事件
//!
//! 状态机：`PENDING -> ACTIVE -> USED`，`PENDING/ACTIVE -> EXPIRED`

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use fitquest_shared::cache::{Cache, CacheKey};
use fitquest_shared::observability::metrics;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use super::achievement_service::AchievementEvaluator;
use super::dto::{ClaimCommand, ClaimOutcome};
use super::ledger_service::TokenLedger;
use crate::error::{GamificationError, Result};
use crate::events::{self, EventDispatcher};
use crate::lock::UserLock;
use crate::models::{
    AchievementTrigger, ClaimContext, ClaimStatus, ClaimedReward, LedgerReason, NewLedgerEntry,
    RefType, RewardDefinition, RewardType, check_claim_eligibility,
};
use crate::repository::{
    MembershipDirectory, NewClaimedReward, RewardRepository, TokenLedgerRepository,
};
use crate::settings::GamificationSettings;

/// 领取凭证最大长度
const MAX_CODE_LEN: usize = 64;

/// 校验并规整领取凭证
fn normalize_code(code: Option<&str>) -> Result<Option<String>> {
    let Some(code) = code else {
        return Ok(None);
    };
    let code = code.trim();
    if code.is_empty() {
        return Err(GamificationError::Validation("code 不能为空".to_string()));
    }
    if code.chars().count() > MAX_CODE_LEN {
        return Err(GamificationError::Validation(format!(
            "code 长度不能超过 {MAX_CODE_LEN}"
        )));
    }
    Ok(Some(code.to_string()))
}

pub struct RewardClaimManager {
    pool: PgPool,
    repo: RewardRepository,
    membership: Arc<dyn MembershipDirectory>,
    cache: Arc<Cache>,
    achievements: Arc<AchievementEvaluator>,
    dispatcher: EventDispatcher,
    settings: Arc<GamificationSettings>,
}

impl RewardClaimManager {
    pub fn new(
        pool: PgPool,
        membership: Arc<dyn MembershipDirectory>,
        cache: Arc<Cache>,
        achievements: Arc<AchievementEvaluator>,
        dispatcher: EventDispatcher,
        settings: Arc<GamificationSettings>,
    ) -> Self {
        Self {
            repo: RewardRepository::new(pool.clone()),
            pool,
            membership,
            cache,
            achievements,
            dispatcher,
            settings,
        }
    }

    /// 领取奖励
    #[instrument(skip(self, cmd), fields(user_id = %cmd.user_id, reward_id = cmd.reward_id))]
    pub async fn claim(&self, cmd: ClaimCommand, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let started = Instant::now();
        let result = self.do_claim(&cmd, now).await;

        let outcome = match &result {
            Ok(o) if o.already_claimed => "duplicate",
            Ok(_) => "claimed",
            Err(e) => e.error_code(),
        };
        metrics::record_reward_claim(outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn do_claim(&self, cmd: &ClaimCommand, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let code = normalize_code(cmd.code.as_deref())?;
        let user_id = cmd.user_id.as_str();

        let reward = self
            .repo
            .get_definition(cmd.reward_id)
            .await?
            .ok_or(GamificationError::RewardNotFound(cmd.reward_id))?;
        reward.check_availability(now)?;
        let effect = reward.parse_effect()?;

        if reward.requires_premium && !self.membership.is_premium(user_id, now).await? {
            return Err(GamificationError::PremiumRequired(reward.id));
        }

        let mut tx = self.pool.begin().await?;
        UserLock::acquire_in_tx(&mut tx, user_id, self.settings.lock_timeout_ms).await?;

        let existing = match &code {
            Some(code) => RewardRepository::find_claim_by_code_in_tx(&mut tx, user_id, code).await?,
            None => None,
        };
        if let Some(existing) = existing {
            if existing.reward_id != reward.id {
                return Err(GamificationError::Validation(
                    "code 已用于其他奖励".to_string(),
                ));
            }
            let balance = TokenLedgerRepository::head_in_tx(&mut tx, user_id).await?.balance_after;
            tx.commit().await?;

            info!(claimed_reward_id = existing.id, "领取凭证已使用，返回原记录");
            return Ok(ClaimOutcome {
                claimed_reward: existing,
                balance,
                already_claimed: true,
                unlocked_achievements: Vec::new(),
            });
        }

        // 锁内重新读取，库存与上下架以此为准
        let reward = RewardRepository::get_definition_in_tx(&mut tx, reward.id)
            .await?
            .ok_or(GamificationError::RewardNotFound(reward.id))?;
        reward.check_availability(now)?;

        let ctx = ClaimContext {
            now,
            last_claimed_at: RewardRepository::last_claimed_at_in_tx(&mut tx, user_id, reward.id)
                .await?,
            inventory_quantity: if reward.is_stackable {
                RewardRepository::inventory_quantity_in_tx(&mut tx, user_id, reward.id).await?
            } else {
                0
            },
            balance: TokenLedgerRepository::head_in_tx(&mut tx, user_id).await?.balance_after,
        };
        check_claim_eligibility(&reward, &ctx)?;

        if reward.tracks_stock() && !RewardRepository::decrement_stock_in_tx(&mut tx, reward.id).await? {
            return Err(GamificationError::OutOfStock(reward.id));
        }

        let plan = effect.plan(now, &self.settings.rewards, reward.is_stackable)?;
        let claim = RewardRepository::insert_claim_in_tx(
            &mut tx,
            &NewClaimedReward {
                user_id: user_id.to_string(),
                reward_id: reward.id,
                reward_type: reward.reward_type,
                code_id: code,
                claimed_at: now,
                status: plan.status,
                tokens_spent: reward.token_cost,
                expires_at: plan.expires_at,
            },
        )
        .await?;

        let debit = TokenLedger::append_in_tx(
            &mut tx,
            NewLedgerEntry::debit(user_id, reward.token_cost, LedgerReason::RewardClaimed)
                .with_ref(RefType::ClaimedReward, claim.id),
        )
        .await?;

        if let Some(window) = plan.timed_effect {
            RewardRepository::insert_effect_in_tx(&mut tx, user_id, claim.id, &reward.effect, window)
                .await?;
        }
        if plan.adds_inventory
            && !RewardRepository::increment_inventory_in_tx(&mut tx, user_id, reward.id, reward.max_stack)
                .await?
        {
            return Err(GamificationError::StackLimitReached {
                reward_id: reward.id,
                max_stack: reward.max_stack,
            });
        }

        let evaluation = AchievementEvaluator::reevaluate_in_tx(
            &mut tx,
            user_id,
            AchievementTrigger::RewardClaimed,
            now,
        )
        .await?;

        tx.commit().await?;

        let balance = evaluation.latest_balance().unwrap_or(debit.balance_after);
        info!(
            claimed_reward_id = claim.id,
            status = %claim.status,
            tokens_spent = claim.tokens_spent,
            balance,
            "奖励领取完成"
        );

        let mut published = vec![events::reward_claimed(&claim, balance)];
        published.push(events::tokens_updated(&debit));
        published.extend(events::events_for_unlocks(user_id, &evaluation.unlocked));
        published.extend(events::events_for_ledger_entries(&evaluation.ledger_entries));
        self.dispatcher.dispatch(published);
        self.achievements.invalidate_user(user_id).await;
        if reward.tracks_stock() {
            self.invalidate_catalog().await;
        }

        Ok(ClaimOutcome {
            claimed_reward: claim,
            balance,
            already_claimed: false,
            unlocked_achievements: evaluation.unlocked,
        })
    }

    /// 激活待激活的奖励：`PENDING -> ACTIVE`
    #[instrument(skip(self))]
    pub async fn activate(
        &self,
        user_id: &str,
        claimed_reward_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ClaimedReward> {
        self.transition(user_id, claimed_reward_id, ClaimStatus::Active, now)
            .await
    }

    /// 核销：`ACTIVE -> USED`
    #[instrument(skip(self))]
    pub async fn mark_used(
        &self,
        user_id: &str,
        claimed_reward_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ClaimedReward> {
        self.transition(user_id, claimed_reward_id, ClaimStatus::Used, now)
            .await
    }

    async fn transition(
        &self,
        user_id: &str,
        claimed_reward_id: i64,
        to: ClaimStatus,
        now: DateTime<Utc>,
    ) -> Result<ClaimedReward> {
        let mut tx = self.pool.begin().await?;
        UserLock::acquire_in_tx(&mut tx, user_id, self.settings.lock_timeout_ms).await?;

        let claim = RewardRepository::get_claim_for_update_in_tx(&mut tx, user_id, claimed_reward_id)
            .await?
            .ok_or(GamificationError::ClaimedRewardNotFound(claimed_reward_id))?;

        // 已到期但清理任务尚未处理：先落 EXPIRED，再拒绝本次迁移
        if claim.is_expired(now) {
            let expired = RewardRepository::update_status_in_tx(
                &mut tx,
                claim.id,
                ClaimStatus::Expired,
                now,
            )
            .await?;
            RewardRepository::release_inventory_in_tx(&mut tx, user_id, claim.reward_id).await?;
            tx.commit().await?;

            self.dispatcher
                .dispatch(vec![events::reward_status_changed(&expired, claim.status)]);
            return Err(GamificationError::InvalidTransition {
                claimed_reward_id: claim.id,
                from: ClaimStatus::Expired,
                to,
            });
        }

        if to == ClaimStatus::Used && claim.reward_type == RewardType::StreakSaver {
            return Err(GamificationError::Validation(
                "保护卡在断档时自动使用，不能手动核销".to_string(),
            ));
        }
        claim.ensure_transition(to)?;

        let updated = RewardRepository::update_status_in_tx(&mut tx, claim.id, to, now).await?;
        if to == ClaimStatus::Used {
            RewardRepository::release_inventory_in_tx(&mut tx, user_id, claim.reward_id).await?;
        }
        tx.commit().await?;

        info!(claimed_reward_id = updated.id, from = %claim.status, to = %updated.status, "奖励状态变更");
        self.dispatcher
            .dispatch(vec![events::reward_status_changed(&updated, claim.status)]);
        Ok(updated)
    }

    /// 用户已领取的奖励，可按状态过滤
    pub async fn list_claimed(
        &self,
        user_id: &str,
        status: Option<ClaimStatus>,
    ) -> Result<Vec<ClaimedReward>> {
        self.repo.list_claims(user_id, status).await
    }

    /// 奖励目录（缓存，Redis 不可用时直接读库）
    pub async fn catalog(&self) -> Result<Vec<RewardDefinition>> {
        let cached = self
            .cache
            .get_or_set(
                &CacheKey::reward_catalog(),
                self.settings.catalog_cache_ttl(),
                || self.repo.list_active_definitions(),
            )
            .await;

        match cached {
            Ok(rewards) => Ok(rewards),
            Err(GamificationError::Infrastructure(e)) => {
                warn!(error = %e, "奖励目录缓存不可用，直接读库");
                self.repo.list_active_definitions().await
            }
            Err(e) => Err(e),
        }
    }

    async fn invalidate_catalog(&self) {
        if let Err(e) = self.cache.delete(&CacheKey::reward_catalog()).await {
            warn!(error = %e, "奖励目录缓存清除失败");
        }
    }

    /// 批量过期到期的奖励，返回本批处理数量
    ///
    /// 行锁使用 `SKIP LOCKED`，多实例并行清理互不阻塞
    #[instrument(skip(self))]
    pub async fn expire_due(&self, now: DateTime<Utc>, batch_size: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let due = RewardRepository::lock_expirable_batch_in_tx(&mut tx, now, batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = due.iter().map(|c| c.id).collect();
        let expired = RewardRepository::mark_expired_in_tx(&mut tx, &ids, now).await?;
        for claim in &due {
            RewardRepository::release_inventory_in_tx(&mut tx, &claim.user_id, claim.reward_id)
                .await?;
        }
        tx.commit().await?;

        metrics::record_rewards_expired(expired);
        info!(count = expired, "奖励过期处理完成");

        let published = due
            .into_iter()
            .map(|claim| {
                let from = claim.status;
                let expired = ClaimedReward {
                    status: ClaimStatus::Expired,
                    ..claim
                };
                events::reward_status_changed(&expired, from)
            })
            .collect();
        self.dispatcher.dispatch(published);

        Ok(expired)
    }
}
