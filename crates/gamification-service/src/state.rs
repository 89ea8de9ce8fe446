//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use fitquest_shared::cache::Cache;
use sqlx::PgPool;

use crate::events::{EventDispatcher, EventPublisher};
use crate::geofence::GeofenceValidator;
use crate::repository::{GymDirectory, MembershipDirectory};
use crate::service::{
    AchievementEvaluator, AttendanceRecorder, RewardClaimManager, StreakTracker, TokenLedger,
};
use crate::settings::GamificationSettings;

/// Axum 应用共享状态
///
/// 各服务通过 Arc 在 handler 间共享，共用同一个连接池与事件分发器
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cache: Arc<Cache>,
    pub settings: Arc<GamificationSettings>,
    pub attendance: Arc<AttendanceRecorder>,
    pub ledger: Arc<TokenLedger>,
    pub streaks: Arc<StreakTracker>,
    pub achievements: Arc<AchievementEvaluator>,
    pub rewards: Arc<RewardClaimManager>,
}

impl AppState {
    /// 组装全部服务
    pub fn new(
        pool: PgPool,
        cache: Arc<Cache>,
        settings: GamificationSettings,
        publisher: Arc<dyn EventPublisher>,
        gyms: Arc<dyn GymDirectory>,
        membership: Arc<dyn MembershipDirectory>,
    ) -> Self {
        let settings = Arc::new(settings);
        let dispatcher = EventDispatcher::new(publisher);

        let achievements = Arc::new(AchievementEvaluator::new(
            pool.clone(),
            cache.clone(),
            dispatcher.clone(),
            settings.clone(),
        ));
        let geofence = GeofenceValidator::new(membership.clone(), settings.geofence.clone());
        let attendance = Arc::new(AttendanceRecorder::new(
            pool.clone(),
            gyms,
            geofence,
            achievements.clone(),
            dispatcher.clone(),
            settings.clone(),
        ));
        let ledger = Arc::new(TokenLedger::new(
            pool.clone(),
            achievements.clone(),
            dispatcher.clone(),
            settings.lock_timeout_ms,
        ));
        let rewards = Arc::new(RewardClaimManager::new(
            pool.clone(),
            membership,
            cache.clone(),
            achievements.clone(),
            dispatcher,
            settings.clone(),
        ));

        Self {
            streaks: Arc::new(StreakTracker::new(pool.clone())),
            pool,
            cache,
            settings,
            attendance,
            ledger,
            achievements,
            rewards,
        }
    }
}
