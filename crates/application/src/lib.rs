//! 应用层：聊天业务编排与在线状态管理
//!
//! 定义存储、安全策略、资料提供方等端口，编排所有聊天操作，
//! 并承载事件总线、连接注册表和通知分发。

pub mod auth;
pub mod bus;
pub mod clock;
pub mod endpoint;
pub mod fanout;
pub mod presence;
pub mod profile;
pub mod security;
pub mod services;
pub mod store;

pub use auth::AuthContext;
pub use bus::{EventBus, EventHandler};
pub use clock::{Clock, SystemClock};
pub use endpoint::{ClientEndpoint, NullClientEndpoint};
pub use fanout::NotificationFanout;
pub use presence::{ConnectionInfo, ConnectionRegistry};
pub use profile::{ProfileProvider, StaticProfileProvider};
pub use security::{AllowAll, SecurityPolicy};
pub use services::{ChatService, ChatServiceDependencies};
pub use store::{ChatFilter, ChatStore};
