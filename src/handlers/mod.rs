//! 핸들러 모듈

pub mod connection;
pub mod peer;
pub mod session;
pub mod signaling;

pub use connection::*;
pub use peer::*;
pub use session::*;
pub use signaling::*;
