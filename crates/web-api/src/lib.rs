//! WebSocket 传输适配层
//!
//! 把入站 WebSocket 连接接成 JRPC 通道和连接注册表条目，
//! 按方法名分发 RPC 请求到聊天服务，并把通知写回通道。

pub mod dto;
pub mod endpoint;
pub mod rpc;
pub mod state;
pub mod ws;

pub use rpc::ChatRpcServer;
pub use state::AppState;
pub use ws::router;
