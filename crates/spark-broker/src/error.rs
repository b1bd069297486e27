//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为 broker 对外暴露的失败语义提供集中定义：注册非法、元数据损坏、过滤器失败、下游连接失败、
//!   挂起请求超时或被放弃；
//! - “没有匹配的连接”与“过滤器短路”不是错误：前者进入挂起路径，后者静默丢弃交互，因此不在此枚举中。
//!
//! ## 设计要求（What）
//! - 全部变体 `Clone + Send + Sync + 'static`，便于在流式转发中复制到多个下游；
//! - [`BrokerError::code`] 返回稳定错误码，供日志与告警聚合。

use std::time::Duration;

use spark_codec_tags::{MetadataDecodeError, MetadataEncodeError, TagsMetadata};
use thiserror::Error;

/// broker 核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方需要区分“请求方自己的问题”（注册非法、元数据损坏）与“链路问题”（过滤器
///   失败、下游连接失败、等待超时），以决定是否重试；
/// - **契约 (What)**：每个变体携带可读上下文，`Display` 为英文短句，可直接写入日志；
/// - **设计权衡 (Trade-offs)**：上下文以 `String` 保存，牺牲少量分配换取错误可独立于生命周期传播。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// 注册标签缺少非空的 `ROUTE_ID`。
    ///
    /// - **契约 (What)**：`tags` 为被拒绝的标签集合的可读形式；该连接不会进入路由表。
    #[error("registration rejected: tags {tags} carry no non-empty route id")]
    InvalidRegistration { tags: String },

    /// 建连或转发元数据无法解码。
    #[error("malformed routing metadata: {0}")]
    MetadataDecode(#[from] MetadataDecodeError),

    /// 本端构造的路由元数据超出线格式限制。
    #[error("routing metadata cannot be encoded: {0}")]
    MetadataEncode(#[from] MetadataEncodeError),

    /// 过滤器以失败结束，后续过滤器与终端动作均未执行。
    ///
    /// - **契约 (What)**：`filter` 为失败过滤器的名称，`detail` 为其给出的原因。
    #[error("filter `{filter}` failed: {detail}")]
    FilterFailed { filter: String, detail: String },

    /// 下游连接在转发时报告失败。
    #[error("connection failed: {detail}")]
    Connection { detail: String },

    /// 挂起请求在配置的时限内没有等到匹配的注册。
    #[error("no connection matching {query} registered within {after:?}")]
    PendingTimeout { query: String, after: Duration },

    /// 挂起请求的完成槽在填充前被释放（路由表已销毁）。
    #[error("pending request for {query} was abandoned before a connection registered")]
    PendingAbandoned { query: String },

    /// 配置文本无法解析。
    #[error("invalid broker configuration: {detail}")]
    Config { detail: String },
}

impl BrokerError {
    /// 构造注册非法错误。
    pub(crate) fn invalid_registration(tags: &TagsMetadata) -> Self {
        Self::InvalidRegistration {
            tags: tags.to_string(),
        }
    }

    /// 构造过滤器失败错误，供自定义过滤器使用。
    pub fn filter_failed(filter: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::FilterFailed {
            filter: filter.into(),
            detail: detail.into(),
        }
    }

    /// 构造连接失败错误，供 [`crate::Connection`] 实现使用。
    pub fn connection(detail: impl Into<String>) -> Self {
        Self::Connection {
            detail: detail.into(),
        }
    }

    /// 稳定错误码。
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRegistration { .. } => "broker.invalid_registration",
            Self::MetadataDecode(_) => "broker.metadata_decode",
            Self::MetadataEncode(_) => "broker.metadata_encode",
            Self::FilterFailed { .. } => "broker.filter_failed",
            Self::Connection { .. } => "broker.connection",
            Self::PendingTimeout { .. } => "broker.pending_timeout",
            Self::PendingAbandoned { .. } => "broker.pending_abandoned",
            Self::Config { .. } => "broker.config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_convert_with_question_mark() {
        fn decode() -> Result<(), BrokerError> {
            spark_codec_tags::TagsMetadata::decode(&[0x81])?;
            Ok(())
        }
        let err = decode().expect_err("截断的元数据必须失败");
        assert_eq!(err.code(), "broker.metadata_decode");
    }

    #[test]
    fn invalid_registration_mentions_tags() {
        let tags = TagsMetadata::builder().service_name("svc").build();
        let err = BrokerError::invalid_registration(&tags);
        assert!(err.to_string().contains("io.rsocket.routing.ServiceName=svc"));
    }
}
