//! 健身游戏化账本引擎
//!
//! 负责到店打卡之后的全部游戏化结算。
//!
//! ## 核心功能
//!
//! - **地理围栏校验**：根据坐标、定位精度和订阅状态判定打卡是否有效
//! - **打卡记录**：每位用户每个自然日至多一条打卡，重复打卡幂等返回
//! - **代币账本**：只追加的带余额快照流水，余额永远由账本推导
//! - **连续打卡**：按日增量维护连续天数，支持保护卡衔接断档
//! - **成就评估**：从权威数据源重算进度，每个成就只解锁一次
//! - **奖励领取**：库存、冷却、叠加上限、状态机与过期清理
//! - **领域事件**：事务提交后向 Kafka 发布版本化事件
//!
//! ## 模块结构
//!
//! - `models`: 领域模型与纯函数规则
//! - `error`: 错误类型与 HTTP 映射
//! - `settings`: 业务配置段
//! - `geofence`: 地理围栏校验
//! - `lock`: 用户级事务锁
//! - `repository`: 数据库仓储层与外部目录
//! - `service`: 业务服务层
//! - `events`: 领域事件构建与发布
//! - `dto` / `handlers` / `routes` / `state`: HTTP 接口层
//! - `worker`: 后台过期清理

pub mod dto;
pub mod error;
pub mod events;
pub mod extract;
pub mod geofence;
pub mod handlers;
pub mod lock;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod settings;
pub mod state;
pub mod worker;

pub use error::{GamificationError, Result};
pub use models::*;
pub use settings::GamificationSettings;
