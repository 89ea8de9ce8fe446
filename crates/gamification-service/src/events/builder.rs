//! 事件信封构建

use fitquest_shared::events::{DomainEventType, EventEnvelope};
use fitquest_shared::observability::tracing::current_trace_id;
use serde_json::json;

use crate::models::{
    Attendance, ClaimStatus, ClaimedReward, Streak, StreakTransition, TokenLedgerEntry,
    UnlockedAchievement,
};

/// 事件来源
pub const SERVICE_SOURCE: &str = "gamification-service";

fn envelope(event_type: DomainEventType, user_id: &str, data: serde_json::Value) -> EventEnvelope {
    EventEnvelope::new(event_type, user_id, data, SERVICE_SOURCE).with_trace_id(current_trace_id())
}

pub fn attendance_recorded(attendance: &Attendance, tokens_awarded: i64) -> EventEnvelope {
    envelope(
        DomainEventType::AttendanceRecorded,
        &attendance.user_id,
        json!({
            "attendanceId": attendance.id,
            "gymId": attendance.gym_id,
            "attendanceDate": attendance.attendance_date,
            "enteredAt": attendance.entered_at,
            "tokensAwarded": tokens_awarded,
        }),
    )
}

pub fn tokens_updated(entry: &TokenLedgerEntry) -> EventEnvelope {
    envelope(
        DomainEventType::TokensUpdated,
        &entry.user_id,
        json!({
            "seq": entry.seq,
            "delta": entry.delta,
            "balance": entry.balance_after,
            "reason": entry.reason,
            "refType": entry.ref_type,
            "refId": entry.ref_id,
        }),
    )
}

pub fn events_for_ledger_entries(entries: &[TokenLedgerEntry]) -> Vec<EventEnvelope> {
    entries.iter().map(tokens_updated).collect()
}

/// 连续打卡事件：中断时先发 STREAK_LOST，再发新的 STREAK_UPDATED
pub fn streak_events(streak: &Streak, transition: StreakTransition) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    if let StreakTransition::Reset { previous } = transition {
        events.push(envelope(
            DomainEventType::StreakLost,
            &streak.user_id,
            json!({ "lastValue": previous, "day": streak.last_counted_day }),
        ));
    }
    if transition.is_change() {
        events.push(envelope(
            DomainEventType::StreakUpdated,
            &streak.user_id,
            json!({
                "value": streak.value,
                "lastValue": streak.last_value,
                "day": streak.last_counted_day,
                "transition": transition.as_str(),
                "recoveryItems": streak.recovery_items,
            }),
        ));
    }
    events
}

pub fn events_for_unlocks(user_id: &str, unlocked: &[UnlockedAchievement]) -> Vec<EventEnvelope> {
    unlocked
        .iter()
        .map(|a| {
            envelope(
                DomainEventType::AchievementUnlocked,
                user_id,
                json!({
                    "code": a.code,
                    "name": a.name,
                    "tokenReward": a.token_reward,
                    "unlockedAt": a.unlocked_at,
                }),
            )
        })
        .collect()
}

pub fn reward_claimed(claim: &ClaimedReward, balance: i64) -> EventEnvelope {
    envelope(
        DomainEventType::RewardClaimed,
        &claim.user_id,
        json!({
            "claimedRewardId": claim.id,
            "rewardId": claim.reward_id,
            "rewardType": claim.reward_type,
            "status": claim.status,
            "tokensSpent": claim.tokens_spent,
            "expiresAt": claim.expires_at,
            "balance": balance,
        }),
    )
}

pub fn reward_status_changed(claim: &ClaimedReward, from: ClaimStatus) -> EventEnvelope {
    envelope(
        DomainEventType::RewardStatusChanged,
        &claim.user_id,
        json!({
            "claimedRewardId": claim.id,
            "rewardId": claim.reward_id,
            "from": from,
            "to": claim.status,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Streak;
    use chrono::NaiveDate;

    #[test]
    fn test_streak_reset_emits_lost_then_updated() {
        let streak = Streak {
            value: 1,
            last_value: 5,
            last_counted_day: NaiveDate::from_ymd_opt(2026, 6, 12),
            ..Streak::empty("u-1")
        };

        let events = streak_events(&streak, StreakTransition::Reset { previous: 5 });
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![DomainEventType::StreakLost, DomainEventType::StreakUpdated]
        );
        assert_eq!(events[0].data["lastValue"], 5);
        assert_eq!(events[1].source, SERVICE_SOURCE);
    }

    #[test]
    fn test_noop_streak_emits_nothing() {
        let streak = Streak::empty("u-1");
        assert!(streak_events(&streak, StreakTransition::SameDay).is_empty());
        assert_eq!(streak_events(&streak, StreakTransition::Extended).len(), 1);
    }

    #[test]
    fn test_unlock_events() {
        let unlocked = vec![UnlockedAchievement {
            code: "VISITS_10".into(),
            name: "十次到店".into(),
            token_reward: 50,
            unlocked_at: chrono::Utc::now(),
        }];
        let events = events_for_unlocks("u-1", &unlocked);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, DomainEventType::AchievementUnlocked);
        assert_eq!(events[0].data["tokenReward"], 50);
        assert_eq!(events[0].partition_key(), "u-1");
    }
}
