//! 数据库仓储层
//!
//! - 仓储只负责数据持久化，不包含业务规则
//! - `*_in_tx` 方法在调用方的事务里执行，事务边界由服务层决定
//! - 外部目录（健身房、订阅）通过 trait 抽象，便于 mock 测试

mod achievement_repo;
mod attendance_repo;
mod directory_repo;
mod ledger_repo;
mod reward_repo;
mod streak_repo;
mod traits;

pub use achievement_repo::AchievementRepository;
pub use attendance_repo::AttendanceRepository;
pub use directory_repo::PgDirectory;
pub use ledger_repo::TokenLedgerRepository;
pub use reward_repo::{NewClaimedReward, RewardRepository};
pub use streak_repo::StreakRepository;
pub use traits::*;
