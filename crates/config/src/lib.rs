//! 统一配置中心
//!
//! 默认值 → 可选的 instachat.yaml → INSTACHAT_* 环境变量，逐层覆盖。

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration load failed: {0}")]
    Load(#[from] figment::Error),
}

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub channel: ChannelConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// JRPC 通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 写锁获取超时（毫秒）
    pub write_timeout_ms: u64,
    /// 关闭锁获取超时（毫秒）
    pub shutdown_timeout_ms: u64,
    /// 静默连接判死阈值（秒）
    pub dead_timeout_secs: u64,
    /// 活性检查周期（秒）
    pub liveness_check_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            channel: ChannelConfig {
                write_timeout_ms: 5000,
                shutdown_timeout_ms: 200,
                dead_timeout_secs: 90,
                liveness_check_secs: 3,
            },
        }
    }
}

impl AppConfig {
    /// 加载配置：内置默认值，叠加可选的 yaml 文件和环境变量
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file("instachat.yaml"))
            .merge(Env::prefixed("INSTACHAT_").split("__"))
            .extract()?)
    }
}
