//! 游戏化服务错误类型
//!
//! 定义业务拒绝与系统错误，并映射为统一的 HTTP 响应

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use fitquest_shared::error::SharedError;
use serde_json::json;
use thiserror::Error;

use crate::geofence::GeofenceRejection;
use crate::models::ClaimStatus;

/// PostgreSQL lock_timeout 触发时的 SQLSTATE
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

/// 游戏化服务错误类型
#[derive(Debug, Error)]
pub enum GamificationError {
    // === 请求错误 ===
    #[error("缺少必填字段: {0}")]
    MissingFields(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("未识别的用户身份: {0}")]
    Unauthorized(String),

    // === 打卡相关错误 ===
    #[error("健身房不存在: {0}")]
    GymNotFound(i64),

    #[error("{0}")]
    CheckInRejected(GeofenceRejection),

    #[error("打卡登记失败: {0}")]
    AttendanceRegistrationFailed(String),

    #[error("今日没有未签退的打卡记录")]
    NoOpenAttendance,

    // === 账本相关错误 ===
    #[error("代币余额不足: 需要 {required}, 可用 {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("账本校验失败: user_id={user_id}, {detail}")]
    LedgerIntegrityViolation { user_id: String, detail: String },

    // === 奖励相关错误 ===
    #[error("奖励不存在: {0}")]
    RewardNotFound(i64),

    #[error("奖励不可领取: reward_id={reward_id}, {reason}")]
    RewardUnavailable { reward_id: i64, reason: String },

    #[error("该奖励仅限高级会员领取: reward_id={0}")]
    PremiumRequired(i64),

    #[error("奖励冷却中: reward_id={reward_id}, 可领取时间 {available_at}")]
    OnCooldown {
        reward_id: i64,
        available_at: DateTime<Utc>,
    },

    #[error("已达到叠加上限: reward_id={reward_id}, max_stack={max_stack}")]
    StackLimitReached { reward_id: i64, max_stack: i32 },

    #[error("代币不足: 需要 {required}, 可用 {available}")]
    InsufficientTokens { required: i64, available: i64 },

    #[error("奖励库存不足: reward_id={0}")]
    OutOfStock(i64),

    #[error("已领取奖励不存在: {0}")]
    ClaimedRewardNotFound(i64),

    #[error("状态不允许此操作: claimed_reward_id={claimed_reward_id}, {from} -> {to}")]
    InvalidTransition {
        claimed_reward_id: i64,
        from: ClaimStatus,
        to: ClaimStatus,
    },

    // === 系统错误 ===
    #[error("并发冲突，请重试")]
    ConcurrencyConflict,

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("基础设施错误: {0}")]
    Infrastructure(#[from] SharedError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 游戏化服务 Result 类型别名
pub type Result<T> = std::result::Result<T, GamificationError>;

impl GamificationError {
    /// 将数据库错误归类
    ///
    /// 唯一约束冲突与等锁超时说明有并发写入，其余保持为数据库错误
    pub fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() || db.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE) {
                return Self::ConcurrencyConflict;
            }
        }
        Self::Database(err)
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) | Self::ConcurrencyConflict | Self::AttendanceRegistrationFailed(_) => {
                true
            }
            Self::Infrastructure(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Infrastructure(_)
                | Self::Internal(_)
                | Self::ConcurrencyConflict
                | Self::AttendanceRegistrationFailed(_)
                | Self::LedgerIntegrityViolation { .. }
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingFields(_) => "MISSING_FIELDS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::GymNotFound(_) => "GYM_NOT_FOUND",
            Self::CheckInRejected(rejection) => rejection.code(),
            Self::AttendanceRegistrationFailed(_) => "ASSISTANCE_REGISTRATION_FAILED",
            Self::NoOpenAttendance => "NO_OPEN_ATTENDANCE",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::LedgerIntegrityViolation { .. } => "LEDGER_INTEGRITY_VIOLATION",
            Self::RewardNotFound(_) => "REWARD_NOT_FOUND",
            Self::RewardUnavailable { .. } => "REWARD_UNAVAILABLE",
            Self::PremiumRequired(_) => "PREMIUM_REQUIRED",
            Self::OnCooldown { .. } => "ON_COOLDOWN",
            Self::StackLimitReached { .. } => "STACK_LIMIT_REACHED",
            Self::InsufficientTokens { .. } => "INSUFFICIENT_TOKENS",
            Self::OutOfStock(_) => "OUT_OF_STOCK",
            Self::ClaimedRewardNotFound(_) => "CLAIMED_REWARD_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Infrastructure(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingFields(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,

            Self::GymNotFound(_)
            | Self::RewardNotFound(_)
            | Self::ClaimedRewardNotFound(_) => StatusCode::NOT_FOUND,

            Self::CheckInRejected(GeofenceRejection::SubscriptionRequired) => StatusCode::FORBIDDEN,
            Self::CheckInRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PremiumRequired(_) => StatusCode::FORBIDDEN,

            Self::NoOpenAttendance
            | Self::InsufficientBalance { .. }
            | Self::RewardUnavailable { .. }
            | Self::OnCooldown { .. }
            | Self::StackLimitReached { .. }
            | Self::InsufficientTokens { .. }
            | Self::OutOfStock(_)
            | Self::InvalidTransition { .. }
            | Self::ConcurrencyConflict => StatusCode::CONFLICT,

            Self::Infrastructure(SharedError::Redis(_)) => StatusCode::SERVICE_UNAVAILABLE,

            Self::AttendanceRegistrationFailed(_)
            | Self::LedgerIntegrityViolation { .. }
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Infrastructure(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GamificationError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Infrastructure(_)
            | Self::Internal(_)
            | Self::LedgerIntegrityViolation { .. } => {
                tracing::error!(error = %self, code = self.error_code(), "请求处理失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::AttendanceRegistrationFailed(detail) => {
                tracing::error!(error = %detail, "打卡登记失败");
                "打卡登记失败，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for GamificationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 请求体无法解析时按参数错误处理
impl From<JsonRejection> for GamificationError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_business_variants() -> Vec<(GamificationError, StatusCode, &'static str)> {
        vec![
            (GamificationError::MissingFields("gymId".into()), StatusCode::BAD_REQUEST, "MISSING_FIELDS"),
            (GamificationError::Validation("latitude".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (GamificationError::Unauthorized("missing".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (GamificationError::GymNotFound(1), StatusCode::NOT_FOUND, "GYM_NOT_FOUND"),
            (
                GamificationError::CheckInRejected(GeofenceRejection::OutOfRange {
                    distance_meters: 300.0,
                    radius_meters: 150.0,
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
                "OUT_OF_RANGE",
            ),
            (
                GamificationError::CheckInRejected(GeofenceRejection::GpsInaccurate {
                    accuracy_meters: 80.0,
                    max_accuracy_meters: 50.0,
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
                "GPS_INACCURATE",
            ),
            (
                GamificationError::CheckInRejected(GeofenceRejection::SubscriptionRequired),
                StatusCode::FORBIDDEN,
                "SUBSCRIPTION_REQUIRED",
            ),
            (GamificationError::NoOpenAttendance, StatusCode::CONFLICT, "NO_OPEN_ATTENDANCE"),
            (
                GamificationError::InsufficientBalance { required: 10, available: 5 },
                StatusCode::CONFLICT,
                "INSUFFICIENT_BALANCE",
            ),
            (GamificationError::RewardNotFound(7), StatusCode::NOT_FOUND, "REWARD_NOT_FOUND"),
            (
                GamificationError::RewardUnavailable { reward_id: 7, reason: "inactive".into() },
                StatusCode::CONFLICT,
                "REWARD_UNAVAILABLE",
            ),
            (GamificationError::PremiumRequired(7), StatusCode::FORBIDDEN, "PREMIUM_REQUIRED"),
            (
                GamificationError::OnCooldown { reward_id: 7, available_at: Utc::now() },
                StatusCode::CONFLICT,
                "ON_COOLDOWN",
            ),
            (
                GamificationError::StackLimitReached { reward_id: 7, max_stack: 3 },
                StatusCode::CONFLICT,
                "STACK_LIMIT_REACHED",
            ),
            (
                GamificationError::InsufficientTokens { required: 75, available: 50 },
                StatusCode::CONFLICT,
                "INSUFFICIENT_TOKENS",
            ),
            (GamificationError::OutOfStock(7), StatusCode::CONFLICT, "OUT_OF_STOCK"),
            (GamificationError::ClaimedRewardNotFound(9), StatusCode::NOT_FOUND, "CLAIMED_REWARD_NOT_FOUND"),
            (
                GamificationError::InvalidTransition {
                    claimed_reward_id: 9,
                    from: ClaimStatus::Used,
                    to: ClaimStatus::Used,
                },
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
            ),
        ]
    }

    #[test]
    fn test_business_error_mapping() {
        for (err, status, code) in all_business_variants() {
            assert!(err.is_business_error(), "{code} 应为业务错误");
            assert!(!err.is_retryable(), "{code} 不应重试");
            assert_eq!(err.status_code(), status, "{code} 状态码不符");
            assert_eq!(err.error_code(), code);
        }
    }

    #[test]
    fn test_system_errors() {
        let failed = GamificationError::AttendanceRegistrationFailed("db down".into());
        assert_eq!(failed.error_code(), "ASSISTANCE_REGISTRATION_FAILED");
        assert_eq!(failed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(failed.is_retryable());
        assert!(!failed.is_business_error());

        let conflict = GamificationError::ConcurrencyConflict;
        assert!(conflict.is_retryable());
        assert!(!conflict.is_business_error());

        let integrity = GamificationError::LedgerIntegrityViolation {
            user_id: "u-1".into(),
            detail: "seq gap".into(),
        };
        assert!(!integrity.is_retryable());
        assert!(!integrity.is_business_error());
        assert_eq!(integrity.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let infra = GamificationError::from(SharedError::Kafka("down".into()));
        assert_eq!(infra.error_code(), "KAFKA_ERROR");
        assert!(infra.is_retryable());
    }

    #[test]
    fn test_from_db_keeps_non_constraint_errors() {
        let err = GamificationError::from_db(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, GamificationError::Database(_)));
    }

    #[tokio::test]
    async fn test_system_error_response_is_masked() {
        let response = GamificationError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(!body["message"].as_str().unwrap().contains("secret"));
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_business_error_response_keeps_message() {
        let response = GamificationError::OutOfStock(42).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "OUT_OF_STOCK");
        assert!(body["message"].as_str().unwrap().contains("42"));
    }

    #[test]
    fn test_validation_errors_conversion() {
        use validator::Validate;

        #[derive(Validate)]
        struct Probe {
            #[validate(range(min = 1))]
            value: i64,
        }

        let err: GamificationError = Probe { value: 0 }.validate().unwrap_err().into();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
