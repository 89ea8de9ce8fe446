//! 打卡记录

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::gym::Coordinates;

/// 到店打卡记录
///
/// 每位用户每个自然日最多一条；创建后只允许补充签退字段
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: i64,
    pub user_id: String,
    pub gym_id: i64,
    pub attendance_date: NaiveDate,
    pub entered_at: DateTime<Utc>,
    #[sqlx(default)]
    pub exited_at: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[sqlx(default)]
    pub duration_minutes: Option<i32>,
}

impl Attendance {
    pub fn is_open(&self) -> bool {
        self.exited_at.is_none()
    }

    /// 签退时长（分钟），时钟回拨时取 0
    pub fn duration_until(&self, exited_at: DateTime<Utc>) -> i32 {
        let minutes = (exited_at - self.entered_at).num_minutes();
        minutes.clamp(0, i32::MAX as i64) as i32
    }
}

/// 新建打卡参数
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub user_id: String,
    pub gym_id: i64,
    pub attendance_date: NaiveDate,
    pub entered_at: DateTime<Utc>,
    pub position: Coordinates,
    pub accuracy: f64,
}

/// 今日打卡状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayStatus {
    pub checked_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_in_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gym_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gym_name: Option<String>,
}
