//! 基础设施层
//!
//! 内存版会话存储、JSON-RPC 线缆协议编解码，以及把持久连接
//! 变成双向消息通道的 JRPC 通道实现。

pub mod channel;
pub mod memory_store;
pub mod wire;

pub use channel::{ChannelConfig, ChannelState, ChannelWriter, Frame, FrameSink, FrameSource, JrpcChannel};
pub use memory_store::InMemoryChatStore;
pub use wire::{RpcError, RpcMessage};
