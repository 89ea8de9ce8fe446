//! 打卡服务
//!
//! ## 核心流程
//!
//! 1. 必填字段 -> 2. 查询健身房 -> 3. 地理围栏与订阅校验（均在事务外）
//! 4. 开启事务 + 用户锁 -> 5. 同日幂等检查 -> 6. 写入打卡
//! 7. 代币入账 -> 8. 推进连续打卡 -> 9. 重算成就 -> 10. 提交
//! 11. 提交后发布事件
//!
//! 任一步骤的基础设施故障都会回滚整个事务，并以 `ASSISTANCE_REGISTRATION_FAILED` 返回。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use fitquest_shared::observability::metrics;
use sqlx::PgPool;
use tracing::{error, info, instrument};

use super::achievement_service::AchievementEvaluator;
use super::dto::{CheckInCommand, CheckInOutcome, GymSummary};
use super::ledger_service::TokenLedger;
use super::streak_service::StreakTracker;
use crate::error::{GamificationError, Result};
use crate::events::{self, EventDispatcher};
use crate::geofence::GeofenceValidator;
use crate::lock::UserLock;
use crate::models::{
    AchievementTrigger, Attendance, Gym, LedgerReason, NewAttendance, NewLedgerEntry, RefType,
    TodayStatus, attendance_reward,
};
use crate::repository::{
    AttendanceRepository, GymDirectory, RewardRepository, TokenLedgerRepository,
};
use crate::settings::GamificationSettings;

pub struct AttendanceRecorder {
    pool: PgPool,
    repo: AttendanceRepository,
    gyms: Arc<dyn GymDirectory>,
    geofence: GeofenceValidator,
    achievements: Arc<AchievementEvaluator>,
    dispatcher: EventDispatcher,
    settings: Arc<GamificationSettings>,
}

/// 非业务错误统一归为打卡登记失败
fn registration_error(err: GamificationError) -> GamificationError {
    if err.is_business_error() {
        return err;
    }
    error!(error = %err, "打卡登记失败");
    match err {
        GamificationError::AttendanceRegistrationFailed(_) => err,
        other => GamificationError::AttendanceRegistrationFailed(other.to_string()),
    }
}

impl AttendanceRecorder {
    pub fn new(
        pool: PgPool,
        gyms: Arc<dyn GymDirectory>,
        geofence: GeofenceValidator,
        achievements: Arc<AchievementEvaluator>,
        dispatcher: EventDispatcher,
        settings: Arc<GamificationSettings>,
    ) -> Self {
        Self {
            repo: AttendanceRepository::new(pool.clone()),
            pool,
            gyms,
            geofence,
            achievements,
            dispatcher,
            settings,
        }
    }

    /// 到店打卡
    #[instrument(skip(self, cmd), fields(user_id = %cmd.user_id, gym_id = ?cmd.gym_id))]
    pub async fn check_in(&self, cmd: CheckInCommand, now: DateTime<Utc>) -> Result<CheckInOutcome> {
        let started = Instant::now();
        let result = self.do_check_in(&cmd, now).await.map_err(registration_error);

        let outcome = match &result {
            Ok(o) if o.already_checked_in => "duplicate",
            Ok(_) => "recorded",
            Err(e) => e.error_code(),
        };
        metrics::record_check_in(outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn do_check_in(&self, cmd: &CheckInCommand, now: DateTime<Utc>) -> Result<CheckInOutcome> {
        let (gym_id, position) = cmd.required()?;
        let gym = self
            .gyms
            .find_gym(gym_id)
            .await?
            .ok_or(GamificationError::GymNotFound(gym_id))?;

        self.geofence
            .validate(&cmd.user_id, &position, cmd.accuracy, &gym, now)
            .await?
            .into_result()?;

        let user_id = cmd.user_id.as_str();
        let day = self.settings.attendance.calendar_day(now);

        let mut tx = self.pool.begin().await?;
        UserLock::acquire_in_tx(&mut tx, user_id, self.settings.lock_timeout_ms).await?;

        // 同日重复打卡：原样返回已有记录，不产生任何变动
        if let Some(existing) = AttendanceRepository::find_by_day_in_tx(&mut tx, user_id, day).await? {
            let balance = TokenLedgerRepository::head_in_tx(&mut tx, user_id).await?.balance_after;
            let streak = StreakTracker::current_in_tx(&mut tx, user_id).await?;
            tx.commit().await?;

            info!(attendance_id = existing.id, "当日已打卡");
            return Ok(CheckInOutcome {
                gym: self.summary_for(&existing, &gym).await,
                attendance: existing,
                already_checked_in: true,
                tokens_awarded: 0,
                balance,
                streak,
                unlocked_achievements: Vec::new(),
            });
        }

        let accuracy = cmd
            .accuracy
            .unwrap_or(self.settings.geofence.max_accuracy_meters);
        let attendance = AttendanceRepository::insert_in_tx(
            &mut tx,
            &NewAttendance {
                user_id: user_id.to_string(),
                gym_id: gym.id,
                attendance_date: day,
                entered_at: now,
                position,
                accuracy,
            },
        )
        .await?;

        let multiplier = RewardRepository::active_multiplier_in_tx(&mut tx, user_id, now).await?;
        let amount = attendance_reward(
            self.settings.attendance.base_reward_tokens,
            multiplier,
            self.settings.attendance.max_multiplier,
        );
        let credit = TokenLedger::append_in_tx(
            &mut tx,
            NewLedgerEntry::credit(user_id, amount, LedgerReason::AttendanceReward)
                .with_ref(RefType::Attendance, attendance.id),
        )
        .await?;

        let streak_update =
            StreakTracker::record_attendance_day_in_tx(&mut tx, user_id, day, now).await?;

        let evaluation =
            AchievementEvaluator::reevaluate_in_tx(&mut tx, user_id, AchievementTrigger::CheckIn, now)
                .await?;

        tx.commit().await?;

        let balance = evaluation.latest_balance().unwrap_or(credit.balance_after);
        info!(
            attendance_id = attendance.id,
            tokens = amount,
            balance,
            streak = streak_update.streak.value,
            unlocked = evaluation.unlocked.len(),
            "打卡完成"
        );

        let mut published = vec![
            events::attendance_recorded(&attendance, amount),
            events::tokens_updated(&credit),
        ];
        published.extend(events::streak_events(&streak_update.streak, streak_update.transition));
        if let Some(saver) = &streak_update.consumed_saver {
            published.push(events::reward_status_changed(saver, crate::models::ClaimStatus::Active));
        }
        published.extend(events::events_for_unlocks(user_id, &evaluation.unlocked));
        published.extend(events::events_for_ledger_entries(&evaluation.ledger_entries));
        self.dispatcher.dispatch(published);
        self.achievements.invalidate_user(user_id).await;

        Ok(CheckInOutcome {
            attendance,
            gym: GymSummary::from(&gym),
            already_checked_in: false,
            tokens_awarded: amount,
            balance,
            streak: streak_update.streak,
            unlocked_achievements: evaluation.unlocked,
        })
    }

    /// 已有记录可能在另一家健身房
    async fn summary_for(&self, attendance: &Attendance, requested: &Gym) -> GymSummary {
        if attendance.gym_id == requested.id {
            return GymSummary::from(requested);
        }
        match self.gyms.find_gym(attendance.gym_id).await {
            Ok(Some(gym)) => GymSummary::from(&gym),
            _ => GymSummary {
                id: attendance.gym_id,
                name: String::new(),
            },
        }
    }

    /// 签退：补充今日打卡的离开时间与时长
    #[instrument(skip(self))]
    pub async fn check_out(&self, user_id: &str, now: DateTime<Utc>) -> Result<Attendance> {
        let day = self.settings.attendance.calendar_day(now);

        let mut tx = self.pool.begin().await?;
        UserLock::acquire_in_tx(&mut tx, user_id, self.settings.lock_timeout_ms).await?;

        let attendance = AttendanceRepository::find_by_day_in_tx(&mut tx, user_id, day)
            .await?
            .filter(Attendance::is_open)
            .ok_or(GamificationError::NoOpenAttendance)?;

        let closed = AttendanceRepository::close_in_tx(
            &mut tx,
            attendance.id,
            now,
            attendance.duration_until(now),
        )
        .await?;
        tx.commit().await?;

        info!(attendance_id = closed.id, duration = ?closed.duration_minutes, "签退完成");
        Ok(closed)
    }

    /// 今日打卡状态
    pub async fn today_status(&self, user_id: &str, now: DateTime<Utc>) -> Result<TodayStatus> {
        let day = self.settings.attendance.calendar_day(now);
        let Some(attendance) = self.repo.find_by_day(user_id, day).await? else {
            return Ok(TodayStatus::default());
        };

        let gym_name = self.gyms.find_gym(attendance.gym_id).await?.map(|g| g.name);
        Ok(TodayStatus {
            checked_in: true,
            check_in_time: Some(attendance.entered_at),
            gym_id: Some(attendance.gym_id),
            gym_name,
        })
    }
}
