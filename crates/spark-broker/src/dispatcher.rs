//! # dispatcher 模块说明
//!
//! ## 核心意图（Why）
//! - 每条接入的连接在 broker 一侧都对应一个 [`GatewaySocket`]：对端发来的交互先经过请求过滤链，
//!   再在路由表中解析目标、轮转选择，最后以同样的交互类型转交给目标连接；
//! - 没有目标时请求挂起，等到匹配的连接注册后继续同一段流程。
//!
//! ## 契约（What）
//! - 过滤链短路时交互被静默丢弃：fire-and-forget 返回成功，请求-响应返回 `Ok(None)`，流与通道为空流；
//! - 过滤器失败、元数据损坏、挂起超时以错误返回，流形态下表现为首个元素即 `Err`；
//! - 流与通道在被轮询时才开始解析，丢弃流即取消解析与挂起。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use spark_codec_tags::TagsMetadata;
use tracing::{debug, warn};

use crate::balancer::LoadBalancer;
use crate::config::BrokerConfig;
use crate::connection::{Connection, ConnectionHandle, InteractionType, Payload, PayloadStream};
use crate::error::BrokerError;
use crate::exchange::{
    ExchangeState, GATEWAY_ID, GatewayExchange, REQUESTER_ID, REQUESTER_NAME, RouteTarget,
};
use crate::filter::{FilterPipeline, Success};
use crate::pending::PendingResolver;
use crate::route::{GatewayFilter, Route, Routes};
use crate::routing::RoutingTable;

struct Shared {
    table: Arc<RoutingTable>,
    balancer: LoadBalancer,
    resolver: PendingResolver,
    filters: FilterPipeline<GatewayExchange>,
    routes: Routes,
    gateway_id: String,
}

/// 为每条接入连接创建 [`GatewaySocket`] 的工厂，持有所有连接共享的状态。
#[derive(Clone)]
pub struct GatewaySocketFactory {
    shared: Arc<Shared>,
}

impl GatewaySocketFactory {
    #[must_use]
    pub fn builder(table: Arc<RoutingTable>) -> GatewaySocketFactoryBuilder {
        GatewaySocketFactoryBuilder {
            table,
            filters: Vec::new(),
            routes: Vec::new(),
            pending_timeout: None,
            gateway_id: "gateway".to_owned(),
        }
    }

    /// 为声明了 `requester` 标签的对端创建网关连接。
    #[must_use]
    pub fn create(&self, requester: TagsMetadata) -> GatewaySocket {
        GatewaySocket {
            shared: Arc::clone(&self.shared),
            requester: Arc::new(requester),
        }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.shared.table
    }

    /// 尚未结束的挂起请求数。
    #[must_use]
    pub fn outstanding_pending(&self) -> usize {
        self.shared.resolver.outstanding()
    }
}

impl fmt::Debug for GatewaySocketFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySocketFactory")
            .field("gateway_id", &self.shared.gateway_id)
            .field("filters", &self.shared.filters)
            .field("routes", &self.shared.routes.len())
            .finish()
    }
}

/// [`GatewaySocketFactory`] 构建器。
pub struct GatewaySocketFactoryBuilder {
    table: Arc<RoutingTable>,
    filters: Vec<Arc<GatewayFilter>>,
    routes: Vec<Route>,
    pending_timeout: Option<Duration>,
    gateway_id: String,
}

impl GatewaySocketFactoryBuilder {
    /// 追加全局请求过滤器。
    #[must_use]
    pub fn filter(mut self, filter: Arc<GatewayFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// 追加配置路由。
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    #[must_use]
    pub fn pending_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pending_timeout = timeout;
        self
    }

    #[must_use]
    pub fn gateway_id(mut self, id: impl Into<String>) -> Self {
        self.gateway_id = id.into();
        self
    }

    /// 应用配置文件中的网关 ID 与挂起超时。
    #[must_use]
    pub fn config(self, config: &BrokerConfig) -> Self {
        self.gateway_id(config.gateway_id.clone())
            .pending_timeout(config.pending_timeout())
    }

    #[must_use]
    pub fn build(self) -> GatewaySocketFactory {
        let resolver =
            PendingResolver::new(Arc::clone(&self.table)).with_timeout(self.pending_timeout);
        GatewaySocketFactory {
            shared: Arc::new(Shared {
                table: self.table,
                balancer: LoadBalancer::new(),
                resolver,
                filters: FilterPipeline::new(self.filters),
                routes: Routes::new(self.routes),
                gateway_id: self.gateway_id,
            }),
        }
    }
}

/// 面向单个请求方的网关连接。
///
/// # 教案式说明
/// - **意图 (Why)**：对端把 broker 当作普通连接使用，四种交互都由这里解析后转交给真正的目标；
/// - **契约 (What)**：交互类型在转发前后保持一致；每次交互独立解析，不缓存上一次的目标；
/// - **执行 (How)**：
///   1. 从负载元数据解码转发信封，构造 [`GatewayExchange`]；
///   2. 合并全局过滤器与命中的配置路由过滤器，按序执行；
///   3. 路由表查询 + 轮转选择，未命中则挂起等待；
///   4. 以原交互类型调用目标连接。
#[derive(Clone)]
pub struct GatewaySocket {
    shared: Arc<Shared>,
    requester: Arc<TagsMetadata>,
}

impl GatewaySocket {
    /// 请求方在建连时声明的标签。
    #[must_use]
    pub fn requester(&self) -> &TagsMetadata {
        &self.requester
    }

    async fn route(
        &self,
        interaction: InteractionType,
        payload: &Payload,
    ) -> Result<Option<ConnectionHandle>, BrokerError> {
        let mut exchange = GatewayExchange::from_payload(interaction, payload)?;
        self.resolve(&mut exchange).await
    }

    /// 对交换对象执行过滤链并解析目标连接；`Ok(None)` 表示被过滤链拒绝。
    pub async fn resolve(
        &self,
        exchange: &mut GatewayExchange,
    ) -> Result<Option<ConnectionHandle>, BrokerError> {
        self.annotate(exchange);

        let pipeline = match self.shared.routes.find(exchange.query()) {
            Some(route) => {
                exchange.set_route(route.id());
                self.shared.filters.merged(route.filters())
            }
            None => self.shared.filters.clone(),
        };

        match pipeline.run(exchange).await {
            Ok(Some(Success)) => {}
            Ok(None) => {
                exchange.settle(ExchangeState::Rejected);
                debug!(
                    interaction = %exchange.interaction(),
                    query = %exchange.query(),
                    annotations = %exchange.annotations(),
                    "request rejected by filter chain"
                );
                return Ok(None);
            }
            Err(err) => {
                exchange.settle(ExchangeState::Failed);
                warn!(
                    interaction = %exchange.interaction(),
                    query = %exchange.query(),
                    error = %err,
                    "request filter chain failed"
                );
                return Err(err);
            }
        }

        if let Some((route_id, connection)) = self
            .shared
            .balancer
            .choose(&self.shared.table, exchange.query())
        {
            exchange.set_target(RouteTarget::Resolved(route_id));
            exchange.settle(ExchangeState::Routed);
            return Ok(Some(connection));
        }

        exchange.set_target(RouteTarget::Pending);
        let pending = self.shared.resolver.create(exchange.query().clone());
        match pending.resolve().await {
            Ok(entry) => {
                exchange.set_target(RouteTarget::Resolved(Arc::from(entry.route_id())));
                exchange.settle(ExchangeState::Routed);
                Ok(Some(Arc::clone(entry.connection())))
            }
            Err(err) => {
                exchange.settle(ExchangeState::Failed);
                Err(err)
            }
        }
    }

    fn annotate(&self, exchange: &mut GatewayExchange) {
        let annotations = exchange.annotations_mut();
        annotations.insert(GATEWAY_ID, self.shared.gateway_id.as_str());
        if let Some(name) = self.requester.service_name() {
            annotations.insert(REQUESTER_NAME, name);
        }
        if let Some(id) = self.requester.route_id() {
            annotations.insert(REQUESTER_ID, id);
        }
    }
}

impl fmt::Debug for GatewaySocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySocket")
            .field("gateway_id", &self.shared.gateway_id)
            .field("requester", &self.requester)
            .finish()
    }
}

#[async_trait]
impl Connection for GatewaySocket {
    async fn fire_and_forget(&self, payload: Payload) -> Result<(), BrokerError> {
        match self.route(InteractionType::FireAndForget, &payload).await? {
            Some(target) => target.fire_and_forget(payload).await,
            None => Ok(()),
        }
    }

    async fn request_response(&self, payload: Payload) -> Result<Option<Payload>, BrokerError> {
        match self.route(InteractionType::RequestResponse, &payload).await? {
            Some(target) => target.request_response(payload).await,
            None => Ok(None),
        }
    }

    fn request_stream(&self, payload: Payload) -> PayloadStream {
        let socket = self.clone();
        stream::once(async move {
            let target = socket
                .route(InteractionType::RequestStream, &payload)
                .await?;
            Ok::<_, BrokerError>(match target {
                Some(target) => target.request_stream(payload),
                None => stream::empty().boxed(),
            })
        })
        .try_flatten()
        .boxed()
    }

    fn request_channel(&self, payload: Payload, payloads: PayloadStream) -> PayloadStream {
        let socket = self.clone();
        stream::once(async move {
            let target = socket
                .route(InteractionType::RequestChannel, &payload)
                .await?;
            Ok::<_, BrokerError>(match target {
                Some(target) => target.request_channel(payload, payloads),
                None => stream::empty().boxed(),
            })
        })
        .try_flatten()
        .boxed()
    }
}
