//! 퀴즈 데이터와 진행 정책

pub mod bank;
pub mod policy;

pub use bank::*;
pub use policy::*;
