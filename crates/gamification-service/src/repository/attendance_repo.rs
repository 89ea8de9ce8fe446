//! 打卡记录仓储

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::{GamificationError, Result};
use crate::models::{Attendance, NewAttendance};

const ATTENDANCE_COLUMNS: &str = "id, user_id, gym_id, attendance_date, entered_at, exited_at, \
                                  latitude, longitude, accuracy, duration_minutes";

pub struct AttendanceRepository {
    pool: PgPool,
}

impl AttendanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 查询用户某日的打卡
    pub async fn find_by_day(&self, user_id: &str, day: NaiveDate) -> Result<Option<Attendance>> {
        let attendance = sqlx::query_as::<_, Attendance>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE user_id = $1 AND attendance_date = $2"
        ))
        .bind(user_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attendance)
    }

    /// 在事务中查询用户某日的打卡
    pub async fn find_by_day_in_tx(
        conn: &mut PgConnection,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<Attendance>> {
        let attendance = sqlx::query_as::<_, Attendance>(&format!(
            "SELECT {ATTENDANCE_COLUMNS} FROM attendances \
             WHERE user_id = $1 AND attendance_date = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(day)
        .fetch_optional(conn)
        .await?;

        Ok(attendance)
    }

    /// 在事务中创建打卡
    ///
    /// 同日唯一约束冲突归为并发冲突
    pub async fn insert_in_tx(conn: &mut PgConnection, new: &NewAttendance) -> Result<Attendance> {
        let attendance = sqlx::query_as::<_, Attendance>(&format!(
            r#"
            INSERT INTO attendances (user_id, gym_id, attendance_date, entered_at,
                                     latitude, longitude, accuracy)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        ))
        .bind(&new.user_id)
        .bind(new.gym_id)
        .bind(new.attendance_date)
        .bind(new.entered_at)
        .bind(new.position.latitude)
        .bind(new.position.longitude)
        .bind(new.accuracy)
        .fetch_one(conn)
        .await
        .map_err(GamificationError::from_db)?;

        Ok(attendance)
    }

    /// 在事务中补充签退信息
    pub async fn close_in_tx(
        conn: &mut PgConnection,
        id: i64,
        exited_at: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<Attendance> {
        let attendance = sqlx::query_as::<_, Attendance>(&format!(
            r#"
            UPDATE attendances
            SET exited_at = $2, duration_minutes = $3
            WHERE id = $1 AND exited_at IS NULL
            RETURNING {ATTENDANCE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(exited_at)
        .bind(duration_minutes)
        .fetch_optional(conn)
        .await?;

        attendance.ok_or(GamificationError::NoOpenAttendance)
    }

    /// 累计打卡次数
    pub async fn count_in_tx(conn: &mut PgConnection, user_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendances WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(conn)
            .await?;

        Ok(count)
    }
}
