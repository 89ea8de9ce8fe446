//! HTTP 请求处理器模块

pub mod achievements;
pub mod admin;
pub mod attendance;
pub mod rewards;
pub mod streak;
pub mod tokens;
