//! 领域事件
//!
//! 事务提交后构建信封并异步发布，发布失败只记录日志，不影响已提交的业务结果

mod builder;
mod publisher;

pub use builder::{SERVICE_SOURCE, events_for_ledger_entries, events_for_unlocks};
pub use builder::{
    attendance_recorded, reward_claimed, reward_status_changed, streak_events, tokens_updated,
};
pub use publisher::{EventDispatcher, EventPublisher, KafkaEventPublisher, LogEventPublisher};
