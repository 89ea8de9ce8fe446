//! 业务配置
//!
//! 对应配置文件中的 `[gamification]` 段，与基础设施配置共用同一套分层加载顺序。

use chrono::{DateTime, Duration, NaiveDate, Utc};
use config::ConfigError;
use fitquest_shared::config::AppConfig;
use serde::Deserialize;

use crate::models::reward::MAX_EFFECT_DAYS;

/// UTC 偏移允许范围（分钟）
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// 地理围栏配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeofenceSettings {
    /// 定位精度上限（米），精度值越大越不可信
    pub max_accuracy_meters: f64,
    /// 健身房未配置半径时使用的默认围栏半径（米）
    pub default_radius_meters: f64,
}

impl Default for GeofenceSettings {
    fn default() -> Self {
        Self {
            max_accuracy_meters: 50.0,
            default_radius_meters: 150.0,
        }
    }
}

/// 打卡配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttendanceSettings {
    /// 每次有效打卡发放的基础代币
    pub base_reward_tokens: i64,
    /// 业务时区相对 UTC 的偏移（分钟），用于划分自然日
    pub utc_offset_minutes: i32,
    /// 代币倍率上限
    pub max_multiplier: f64,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            base_reward_tokens: 10,
            utc_offset_minutes: 0,
            max_multiplier: 3.0,
        }
    }
}

impl AttendanceSettings {
    /// 按业务时区计算某一时刻所属的自然日
    pub fn calendar_day(&self, at: DateTime<Utc>) -> NaiveDate {
        (at + Duration::minutes(self.utc_offset_minutes as i64)).date_naive()
    }
}

/// 奖励配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardSettings {
    /// 折扣类奖励未声明有效期时的默认有效天数
    pub default_validity_days: i64,
    /// 实物奖励待激活（到店核销）的期限
    pub pending_activation_days: i64,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            default_validity_days: 30,
            pending_activation_days: 7,
        }
    }
}

/// 过期清理 Worker 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpireWorkerSettings {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub batch_size: i64,
}

impl Default for ExpireWorkerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 60,
            batch_size: 500,
        }
    }
}

/// 游戏化业务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GamificationSettings {
    pub geofence: GeofenceSettings,
    pub attendance: AttendanceSettings,
    pub rewards: RewardSettings,
    pub expire_worker: ExpireWorkerSettings,
    /// 成就、奖励目录的缓存时间
    pub catalog_cache_ttl_seconds: u64,
    /// 等待用户级事务锁的上限
    pub lock_timeout_ms: u64,
}

impl Default for GamificationSettings {
    fn default() -> Self {
        Self {
            geofence: GeofenceSettings::default(),
            attendance: AttendanceSettings::default(),
            rewards: RewardSettings::default(),
            expire_worker: ExpireWorkerSettings::default(),
            catalog_cache_ttl_seconds: 300,
            lock_timeout_ms: 5000,
        }
    }
}

impl GamificationSettings {
    /// 加载 `[gamification]` 段，缺省时使用默认值
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let settings = match AppConfig::layered(service_name)?.get::<Self>("gamification") {
            Ok(settings) => settings,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => return Err(e),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attendance.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Message(format!(
                "gamification.attendance.utc_offset_minutes 超出范围: {}",
                self.attendance.utc_offset_minutes
            )));
        }
        if self.attendance.base_reward_tokens <= 0 {
            return Err(ConfigError::Message(
                "gamification.attendance.base_reward_tokens 必须为正数".to_string(),
            ));
        }
        if self.attendance.max_multiplier < 1.0 {
            return Err(ConfigError::Message(
                "gamification.attendance.max_multiplier 不能小于 1".to_string(),
            ));
        }
        for (key, days) in [
            ("default_validity_days", self.rewards.default_validity_days),
            ("pending_activation_days", self.rewards.pending_activation_days),
        ] {
            if !(1..=MAX_EFFECT_DAYS).contains(&days) {
                return Err(ConfigError::Message(format!(
                    "gamification.rewards.{key} 必须在 1..={MAX_EFFECT_DAYS} 之间: {days}"
                )));
            }
        }
        if self.geofence.max_accuracy_meters <= 0.0 || self.geofence.default_radius_meters <= 0.0 {
            return Err(ConfigError::Message(
                "gamification.geofence 阈值必须为正数".to_string(),
            ));
        }
        Ok(())
    }

    pub fn catalog_cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.catalog_cache_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(GamificationSettings::default().validate().is_ok());
    }

    #[test]
    fn test_calendar_day_uses_business_offset() {
        // UTC 2026-03-02 03:30 在 UTC-5 仍是 3 月 1 日
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 3, 30, 0).unwrap();
        let utc = AttendanceSettings::default();
        let bogota = AttendanceSettings {
            utc_offset_minutes: -300,
            ..Default::default()
        };

        assert_eq!(utc.calendar_day(at), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(bogota.calendar_day(at), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = GamificationSettings::default();
        settings.attendance.utc_offset_minutes = 15 * 60;
        assert!(settings.validate().is_err());

        let mut settings = GamificationSettings::default();
        settings.attendance.base_reward_tokens = 0;
        assert!(settings.validate().is_err());

        let mut settings = GamificationSettings::default();
        settings.rewards.default_validity_days = 100_000_000;
        assert!(settings.validate().is_err());

        let mut settings = GamificationSettings::default();
        settings.rewards.pending_activation_days = 0;
        assert!(settings.validate().is_err());

        let mut settings = GamificationSettings::default();
        settings.attendance.max_multiplier = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_section() {
        let settings: GamificationSettings = serde_json::from_value(serde_json::json!({
            "geofence": { "max_accuracy_meters": 30.0 },
            "lock_timeout_ms": 1000
        }))
        .unwrap();

        assert_eq!(settings.geofence.max_accuracy_meters, 30.0);
        assert_eq!(settings.geofence.default_radius_meters, 150.0);
        assert_eq!(settings.lock_timeout_ms, 1000);
        assert_eq!(settings.attendance.base_reward_tokens, 10);
    }
}
