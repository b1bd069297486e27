//! 每次交互携带的转发元数据（`message/x.rsocket.forwarding.v0`）。

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MetadataDecodeError, MetadataEncodeError};
use crate::key::{Key, WellKnownKey};
use crate::tags::{Reader, TagsMetadata};

/// Forwarding 元数据的 MIME 类型。
pub const FORWARDING_MIME_TYPE: &str = "message/x.rsocket.forwarding.v0";

/// 关闭跨 broker 代理时写入的自定义键。
pub const PROXY_KEY: &str = "proxy";

/// 请求方声明的转发目标。
///
/// # 教案式说明
/// - **意图 (Why)**：请求不直接指向某条连接，而是携带一个标签查询，由 broker 在路由表中解析；
/// - **契约 (What)**：线格式为 16 字节大端 `origin_route_id`（发起方自身的路由 ID）加标签块；
///   标签中出现 `ROUTE_ID` 时表示精确寻址；
/// - **风险 (Trade-offs)**：`disable_proxy` 只是一个约定标签，是否遵守由下游 broker 决定。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forwarding {
    origin_route_id: u128,
    tags: TagsMetadata,
}

impl Forwarding {
    #[must_use]
    pub fn new(origin_route_id: u128, tags: TagsMetadata) -> Self {
        Self {
            origin_route_id,
            tags,
        }
    }

    #[must_use]
    pub fn builder(origin_route_id: u128) -> ForwardingBuilder {
        ForwardingBuilder {
            origin_route_id,
            tags: TagsMetadata::new(),
        }
    }

    #[must_use]
    pub fn origin_route_id(&self) -> u128 {
        self.origin_route_id
    }

    /// 目标查询。
    #[must_use]
    pub fn tags(&self) -> &TagsMetadata {
        &self.tags
    }

    #[must_use]
    pub fn into_tags(self) -> TagsMetadata {
        self.tags
    }

    #[must_use]
    pub fn is_proxy_disabled(&self) -> bool {
        self.tags.get(PROXY_KEY) == Some("false")
    }

    pub fn encode(&self) -> Result<Bytes, MetadataEncodeError> {
        let mut out = BytesMut::with_capacity(16);
        out.put_u128(self.origin_route_id);
        self.tags.encode_into(&mut out)?;
        Ok(out.freeze())
    }

    pub fn decode(input: &[u8]) -> Result<Self, MetadataDecodeError> {
        let mut reader = Reader::new(input);
        let origin_route_id = reader.read_u128()?;
        let tags = TagsMetadata::read_from(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            origin_route_id,
            tags,
        })
    }
}

/// `Forwarding` 构建器。
#[derive(Clone, Debug)]
pub struct ForwardingBuilder {
    origin_route_id: u128,
    tags: TagsMetadata,
}

impl ForwardingBuilder {
    /// 精确寻址到某条路由。
    #[must_use]
    pub fn route_id(self, id: impl Into<String>) -> Self {
        self.with(WellKnownKey::RouteId, id)
    }

    #[must_use]
    pub fn service_name(self, name: impl Into<String>) -> Self {
        self.with(WellKnownKey::ServiceName, name)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    #[must_use]
    pub fn disable_proxy(self) -> Self {
        self.with(PROXY_KEY, "false")
    }

    #[must_use]
    pub fn build(self) -> Forwarding {
        Forwarding {
            origin_route_id: self.origin_route_id,
            tags: self.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_marks_proxy_disabled() {
        let forwarding = Forwarding::builder(7)
            .service_name("billing")
            .disable_proxy()
            .build();
        assert!(forwarding.is_proxy_disabled());
        assert_eq!(forwarding.tags().service_name(), Some("billing"));
    }

    #[test]
    fn decode_restores_origin_and_query() {
        let forwarding = Forwarding::builder(u128::MAX - 3).route_id("77").build();
        let encoded = forwarding.encode().expect("编码成功");
        let decoded = Forwarding::decode(&encoded).expect("解码成功");
        assert_eq!(decoded.origin_route_id(), u128::MAX - 3);
        assert_eq!(decoded.tags().route_id(), Some("77"));
    }
}
