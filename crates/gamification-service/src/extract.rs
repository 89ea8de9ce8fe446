//! 请求身份提取
//!
//! 认证由上游网关完成，网关把已认证的用户 ID 写入 `x-user-id`，
//! 运营后台请求额外携带 `x-operator-id`。

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::GamificationError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const OPERATOR_ID_HEADER: &str = "x-operator-id";

/// 用户 ID 最大长度
const MAX_ID_LEN: usize = 64;

fn header_identity(parts: &Parts, header: &str) -> Result<String, GamificationError> {
    let value = parts
        .headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if value.is_empty() {
        return Err(GamificationError::Unauthorized(format!("缺少 {header}")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(GamificationError::Unauthorized(format!("{header} 过长")));
    }
    Ok(value.to_string())
}

/// 当前用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl CurrentUser {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = GamificationError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_identity(parts, USER_ID_HEADER).map(Self)
    }
}

/// 当前运营人员
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = GamificationError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_identity(parts, OPERATOR_ID_HEADER).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn request_parts(header: Option<(&str, &str)>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/streak");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_current_user_from_header() {
        let mut parts = request_parts(Some((USER_ID_HEADER, " u-42 ")));
        let user = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user.as_str(), "u-42");
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let mut parts = request_parts(None);
        let err = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");

        let mut parts = request_parts(Some((USER_ID_HEADER, "   ")));
        assert!(CurrentUser::from_request_parts(&mut parts, &()).await.is_err());
    }

    #[tokio::test]
    async fn test_operator_header() {
        let mut parts = request_parts(Some((OPERATOR_ID_HEADER, "ops-1")));
        let op = Operator::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(op.0, "ops-1");

        let mut parts = request_parts(Some((USER_ID_HEADER, "u-1")));
        assert!(Operator::from_request_parts(&mut parts, &()).await.is_err());
    }
}
