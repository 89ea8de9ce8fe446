//! 成就评估服务
//!
//! 进度始终从权威数据源重算（打卡次数、连续天数、正向流水合计、领取次数），
//! 解锁通过 `unlocked_at IS NULL` 条件更新保证只发生一次。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fitquest_shared::cache::{Cache, CacheKey};
use fitquest_shared::observability::metrics;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, instrument, warn};

use super::ledger_service::TokenLedger;
use crate::error::{GamificationError, Result};
use crate::events::{self, EventDispatcher};
use crate::lock::UserLock;
use crate::models::{
    AchievementDefinition, AchievementTrigger, LedgerReason, MetricType, NewLedgerEntry,
    ProgressUpdate, RefType, TokenLedgerEntry, UnlockedAchievement, UserAchievementProgress,
    UserAchievementView, evaluate_progress,
};
use crate::repository::{
    AchievementRepository, AttendanceRepository, RewardRepository, StreakRepository,
    TokenLedgerRepository,
};
use crate::settings::GamificationSettings;

/// 一次重算的结果
#[derive(Debug, Default)]
pub struct AchievementEvaluation {
    pub unlocked: Vec<UnlockedAchievement>,
    /// 解锁奖励产生的流水
    pub ledger_entries: Vec<TokenLedgerEntry>,
}

impl AchievementEvaluation {
    /// 最新余额（没有新流水时为 None）
    pub fn latest_balance(&self) -> Option<i64> {
        self.ledger_entries.last().map(|e| e.balance_after)
    }
}

pub struct AchievementEvaluator {
    pool: PgPool,
    repo: AchievementRepository,
    cache: Arc<Cache>,
    dispatcher: EventDispatcher,
    settings: Arc<GamificationSettings>,
}

impl AchievementEvaluator {
    pub fn new(
        pool: PgPool,
        cache: Arc<Cache>,
        dispatcher: EventDispatcher,
        settings: Arc<GamificationSettings>,
    ) -> Self {
        Self {
            repo: AchievementRepository::new(pool.clone()),
            pool,
            cache,
            dispatcher,
            settings,
        }
    }

    /// 读取一个度量的当前值
    async fn load_metric_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        metric: MetricType,
    ) -> Result<i64> {
        match metric {
            MetricType::AttendanceCount => AttendanceRepository::count_in_tx(conn, user_id).await,
            MetricType::StreakValue => StreakRepository::value_in_tx(conn, user_id).await,
            MetricType::TokensEarned => TokenLedgerRepository::tokens_earned_in_tx(conn, user_id).await,
            MetricType::RewardsClaimed => RewardRepository::count_claims_in_tx(conn, user_id).await,
        }
    }

    /// 在调用方事务中重算成就，调用方必须已持有该用户的锁
    ///
    /// 解锁奖励会改变累计代币，因此在有新奖励入账时继续重算代币类成就，
    /// 直到某一轮没有新的解锁
    pub async fn reevaluate_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        trigger: AchievementTrigger,
        now: DateTime<Utc>,
    ) -> Result<AchievementEvaluation> {
        let definitions = AchievementRepository::list_active_definitions_in_tx(&mut *conn).await?;
        if definitions.is_empty() {
            return Ok(AchievementEvaluation::default());
        }

        let mut progress: HashMap<String, UserAchievementProgress> =
            AchievementRepository::list_progress_in_tx(&mut *conn, user_id)
                .await?
                .into_iter()
                .map(|p| (p.achievement_code.clone(), p))
                .collect();

        let mut evaluation = AchievementEvaluation::default();
        let mut metric_types: Vec<MetricType> = trigger.metric_types().to_vec();

        for _round in 0..=definitions.len() {
            let mut values = HashMap::with_capacity(metric_types.len());
            for metric in &metric_types {
                values.insert(*metric, Self::load_metric_in_tx(&mut *conn, user_id, *metric).await?);
            }

            let mut credited = false;
            for definition in definitions
                .iter()
                .filter(|d| values.contains_key(&d.metric_type))
            {
                let metric = values[&definition.metric_type];
                match evaluate_progress(definition, progress.get(&definition.code), metric) {
                    ProgressUpdate::Unchanged | ProgressUpdate::Frozen => {}
                    ProgressUpdate::Advance(value) => {
                        AchievementRepository::advance_progress_in_tx(
                            &mut *conn,
                            user_id,
                            &definition.code,
                            value,
                        )
                        .await?;
                        Self::remember(&mut progress, user_id, definition, value, None, now);
                    }
                    ProgressUpdate::Unlock(value) => {
                        let unlocked = AchievementRepository::try_unlock_in_tx(
                            &mut *conn,
                            user_id,
                            &definition.code,
                            value,
                            now,
                        )
                        .await?;
                        Self::remember(&mut progress, user_id, definition, value, Some(now), now);
                        if !unlocked {
                            continue;
                        }

                        if definition.token_reward > 0 {
                            let entry = TokenLedger::append_in_tx(
                                &mut *conn,
                                NewLedgerEntry::credit(
                                    user_id,
                                    definition.token_reward,
                                    LedgerReason::AchievementUnlocked,
                                )
                                .with_ref(RefType::Achievement, &definition.code),
                            )
                            .await?;
                            evaluation.ledger_entries.push(entry);
                            credited = true;
                        }

                        metrics::record_achievement_unlock(&definition.code);
                        debug!(user_id, code = %definition.code, "成就解锁");
                        evaluation.unlocked.push(UnlockedAchievement {
                            code: definition.code.clone(),
                            name: definition.name.clone(),
                            token_reward: definition.token_reward,
                            unlocked_at: now,
                        });
                    }
                }
            }

            if !credited {
                break;
            }
            metric_types = vec![MetricType::TokensEarned];
        }

        Ok(evaluation)
    }

    fn remember(
        progress: &mut HashMap<String, UserAchievementProgress>,
        user_id: &str,
        definition: &AchievementDefinition,
        value: i64,
        unlocked_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let entry = progress
            .entry(definition.code.clone())
            .or_insert_with(|| UserAchievementProgress {
                user_id: user_id.to_string(),
                achievement_code: definition.code.clone(),
                current_value: 0,
                unlocked_at: None,
                updated_at: now,
            });
        entry.current_value = entry.current_value.max(value);
        if entry.unlocked_at.is_none() {
            entry.unlocked_at = unlocked_at;
        }
        entry.updated_at = now;
    }

    /// 独立事务重算（运营补偿、定义变更后使用）
    #[instrument(skip(self))]
    pub async fn reevaluate(
        &self,
        user_id: &str,
        trigger: AchievementTrigger,
    ) -> Result<Vec<UnlockedAchievement>> {
        let mut tx = self.pool.begin().await?;
        UserLock::acquire_in_tx(&mut tx, user_id, self.settings.lock_timeout_ms).await?;
        let evaluation = Self::reevaluate_in_tx(&mut tx, user_id, trigger, Utc::now()).await?;
        tx.commit().await?;

        info!(unlocked = evaluation.unlocked.len(), "成就重算完成");
        let mut published = events::events_for_unlocks(user_id, &evaluation.unlocked);
        published.extend(events::events_for_ledger_entries(&evaluation.ledger_entries));
        self.dispatcher.dispatch(published);
        self.invalidate_user(user_id).await;

        Ok(evaluation.unlocked)
    }

    /// 成就目录（缓存，Redis 不可用时直接读库）
    pub async fn catalog(&self) -> Result<Vec<AchievementDefinition>> {
        let cached = self
            .cache
            .get_or_set(
                &CacheKey::achievement_catalog(),
                self.settings.catalog_cache_ttl(),
                || self.repo.list_active_definitions(),
            )
            .await;

        match cached {
            Ok(definitions) => Ok(definitions),
            Err(GamificationError::Infrastructure(e)) => {
                warn!(error = %e, "成就目录缓存不可用，直接读库");
                self.repo.list_active_definitions().await
            }
            Err(e) => Err(e),
        }
    }

    /// 用户成就列表：每个启用成就的进度与解锁状态
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserAchievementView>> {
        let key = CacheKey::user_achievements(user_id);
        match self.cache.get::<Vec<UserAchievementView>>(&key).await {
            Ok(Some(views)) => return Ok(views),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "用户成就缓存读取失败"),
        }

        let definitions = self.catalog().await?;
        let progress: HashMap<String, UserAchievementProgress> = self
            .repo
            .list_progress(user_id)
            .await?
            .into_iter()
            .map(|p| (p.achievement_code.clone(), p))
            .collect();

        let views: Vec<UserAchievementView> = definitions
            .iter()
            .map(|d| UserAchievementView::build(d, progress.get(&d.code)))
            .collect();

        if let Err(e) = self
            .cache
            .set(&key, &views, self.settings.catalog_cache_ttl())
            .await
        {
            warn!(error = %e, "用户成就缓存写入失败");
        }
        Ok(views)
    }

    /// 用户进度变化后清除缓存视图
    pub async fn invalidate_user(&self, user_id: &str) {
        if let Err(e) = self.cache.delete(&CacheKey::user_achievements(user_id)).await {
            warn!(user_id, error = %e, "用户成就缓存清除失败");
        }
    }
}
