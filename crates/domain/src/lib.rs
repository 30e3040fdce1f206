//! 即时聊天系统核心领域模型
//!
//! 包含会话、消息、参与者等核心实体，以及领域事件和错误定义。

pub mod chat;
pub mod errors;
pub mod events;
pub mod message;
pub mod profile;
pub mod time;
pub mod validate;

// 重新导出常用类型
pub use chat::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use profile::*;
