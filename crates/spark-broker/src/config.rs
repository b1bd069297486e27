//! broker 运行参数，从 TOML 文本加载。

use std::time::Duration;

use serde::Deserialize;

use crate::error::BrokerError;

/// broker 配置。
///
/// # 教案式说明
/// - **意图 (Why)**：网关 ID、挂起超时与跨 broker 队列容量需要在部署时调整，而不是编译期常量；
/// - **契约 (What)**：
///   - 所有字段都有默认值，空文本即得到默认配置；
///   - 未知字段直接报错，避免拼写错误被静默忽略；
///   - `pending_timeout_ms` 缺省表示挂起请求无限期等待；
/// - **示例**：
/// ```toml
/// gateway_id = "edge-1"
/// broker_id = 7
/// service_name = "broker"
/// pending_timeout_ms = 30000
/// federation_queue_capacity = 1024
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// 写入请求标注的网关 ID。
    pub gateway_id: String,
    /// 本 broker 在集群中的路由 ID。
    pub broker_id: u64,
    /// 本 broker 注册时使用的服务名。
    pub service_name: String,
    /// 挂起请求的等待上限（毫秒）。
    pub pending_timeout_ms: Option<u64>,
    /// 跨 broker 事件队列容量。
    pub federation_queue_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            gateway_id: "gateway".to_owned(),
            broker_id: 1,
            service_name: "broker".to_owned(),
            pending_timeout_ms: None,
            federation_queue_capacity: 256,
        }
    }
}

impl BrokerConfig {
    /// 解析 TOML 文本。
    pub fn from_toml_str(text: &str) -> Result<Self, BrokerError> {
        toml::from_str(text).map_err(|err| BrokerError::Config {
            detail: err.to_string(),
        })
    }

    #[must_use]
    pub fn pending_timeout(&self) -> Option<Duration> {
        self.pending_timeout_ms.map(Duration::from_millis)
    }
}
