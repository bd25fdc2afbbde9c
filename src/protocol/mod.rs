//! 시그널링 / 데이터 채널 메시지 프로토콜

pub mod messages;

pub use messages::*;
