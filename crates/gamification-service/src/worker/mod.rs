//! 后台 Worker

pub mod expire_worker;

pub use expire_worker::RewardExpireWorker;
