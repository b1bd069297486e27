//! # exchange 模块说明
//!
//! ## 核心意图（Why）
//! - 过滤链操作的对象：建连阶段是 [`SocketAcceptorExchange`]，请求阶段是 [`GatewayExchange`]；
//! - 交换对象记录本次交互的查询、解析结果、状态与一组仅供观测的标注。
//!
//! ## 状态机（What）
//! ```text
//! Pending ──> Routed | Rejected | Failed
//! ```
//! 终态不可再变更。

use std::collections::BTreeMap;
use std::fmt;

use spark_codec_tags::{Forwarding, MetadataDecodeError, RouteSetup, TagsMetadata};

use crate::connection::{ConnectionHandle, InteractionType, Payload};
use crate::routing::RouteId;

/// 标注键：请求方服务名。
pub const REQUESTER_NAME: &str = "requester.name";
/// 标注键：请求方路由 ID。
pub const REQUESTER_ID: &str = "requester.id";
/// 标注键：目标服务名。
pub const RESPONDER_NAME: &str = "responder.name";
/// 标注键：最终选中的目标路由 ID。
pub const RESPONDER_ID: &str = "responder.id";
/// 标注键：处理本次交互的网关 ID。
pub const GATEWAY_ID: &str = "gateway.id";
/// 标注键：交互类型。
pub const INTERACTION: &str = "interaction";

/// 交换对象的生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeState {
    Pending,
    Routed,
    Rejected,
    Failed,
}

impl ExchangeState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// 观测用标注。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotations(BTreeMap<String, String>);

impl Annotations {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl fmt::Display for Annotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// 请求的目标解析进度。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    /// 尚未查询路由表。
    Unresolved,
    /// 路由表中暂无匹配，正在等待注册。
    Pending,
    /// 已选中目标。
    Resolved(RouteId),
}

/// 一次转发交互。
///
/// # 教案式说明
/// - **意图 (Why)**：请求过滤器需要看到“谁在请求、请求什么、以何种交互方式”，并可能附加观测标注；
/// - **契约 (What)**：查询来自转发元数据，构造后不可改写；标注只影响日志，不影响路由结果。
#[derive(Clone, Debug)]
pub struct GatewayExchange {
    interaction: InteractionType,
    origin_route_id: u128,
    query: TagsMetadata,
    proxy_disabled: bool,
    route: Option<String>,
    target: RouteTarget,
    state: ExchangeState,
    annotations: Annotations,
}

impl GatewayExchange {
    #[must_use]
    pub fn new(interaction: InteractionType, forwarding: Forwarding) -> Self {
        let origin_route_id = forwarding.origin_route_id();
        let proxy_disabled = forwarding.is_proxy_disabled();
        let query = forwarding.into_tags();
        let mut annotations = Annotations::default();
        annotations.insert(INTERACTION, interaction.as_str());
        if let Some(service) = query.service_name() {
            annotations.insert(RESPONDER_NAME, service);
        }
        Self {
            interaction,
            origin_route_id,
            query,
            proxy_disabled,
            route: None,
            target: RouteTarget::Unresolved,
            state: ExchangeState::Pending,
            annotations,
        }
    }

    /// 从负载的元数据段解码转发信封。
    pub fn from_payload(
        interaction: InteractionType,
        payload: &Payload,
    ) -> Result<Self, MetadataDecodeError> {
        Forwarding::decode(&payload.metadata).map(|forwarding| Self::new(interaction, forwarding))
    }

    #[must_use]
    pub fn interaction(&self) -> InteractionType {
        self.interaction
    }

    #[must_use]
    pub fn origin_route_id(&self) -> u128 {
        self.origin_route_id
    }

    /// 目标查询。
    #[must_use]
    pub fn query(&self) -> &TagsMetadata {
        &self.query
    }

    #[must_use]
    pub fn is_proxy_disabled(&self) -> bool {
        self.proxy_disabled
    }

    /// 命中的配置路由 ID。
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub(crate) fn set_route(&mut self, route: &str) {
        self.route = Some(route.to_owned());
    }

    #[must_use]
    pub fn target(&self) -> &RouteTarget {
        &self.target
    }

    pub(crate) fn set_target(&mut self, target: RouteTarget) {
        if let RouteTarget::Resolved(route_id) = &target {
            self.annotations.insert(RESPONDER_ID, route_id.to_string());
        }
        self.target = target;
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// 进入终态；已处于终态时返回 `false` 并保持原状态。
    pub fn settle(&mut self, state: ExchangeState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        true
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

/// 一次建连接纳。
///
/// # 教案式说明
/// - **意图 (Why)**：接纳过滤器据此判断是否允许某个端点加入路由表；
/// - **契约 (What)**：`setup` 为空表示对端未携带路由声明，只作为请求方接入，不会被注册；
///   [`SocketAcceptorExchange::tags`] 为注册时使用的完整标签。
#[derive(Debug)]
pub struct SocketAcceptorExchange {
    setup: Option<RouteSetup>,
    tags: TagsMetadata,
    sending: ConnectionHandle,
    state: ExchangeState,
    annotations: Annotations,
}

impl SocketAcceptorExchange {
    #[must_use]
    pub fn new(setup: Option<RouteSetup>, sending: ConnectionHandle) -> Self {
        let tags = setup
            .as_ref()
            .map(RouteSetup::enriched_tags)
            .unwrap_or_default();
        let mut annotations = Annotations::default();
        if let Some(service) = tags.service_name() {
            annotations.insert(REQUESTER_NAME, service);
        }
        if let Some(route_id) = tags.route_id() {
            annotations.insert(REQUESTER_ID, route_id);
        }
        Self {
            setup,
            tags,
            sending,
            state: ExchangeState::Pending,
            annotations,
        }
    }

    #[must_use]
    pub fn setup(&self) -> Option<&RouteSetup> {
        self.setup.as_ref()
    }

    #[must_use]
    pub fn tags(&self) -> &TagsMetadata {
        &self.tags
    }

    /// 对端的发送端句柄。
    #[must_use]
    pub fn sending(&self) -> &ConnectionHandle {
        &self.sending
    }

    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// 进入终态；已处于终态时返回 `false`。
    pub fn settle(&mut self, state: ExchangeState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        true
    }

    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}
