//! # acceptor 模块说明
//!
//! ## 核心意图（Why）
//! - 新连接建立时，broker 解码其路由声明、执行接纳过滤链，通过后把连接写入路由表并为其创建网关连接；
//! - 注册与连接生命周期绑定：[`Registration`] 释放时注销，且只注销自己那一次注册。

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use spark_codec_tags::{ROUTE_SETUP_MIME_TYPE, RouteSetup};
use tracing::{debug, warn};

use crate::connection::ConnectionHandle;
use crate::dispatcher::{GatewaySocket, GatewaySocketFactory};
use crate::error::BrokerError;
use crate::exchange::{ExchangeState, SocketAcceptorExchange};
use crate::filter::{Filter, FilterPipeline, Success};
use crate::routing::{InternalRouteId, RouteId, RoutingTable};

/// 建连接纳过滤器。
pub type SocketAcceptorFilter = dyn Filter<SocketAcceptorExchange>;

/// 建连帧中与路由相关的部分。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionSetup {
    pub metadata_mime_type: String,
    pub metadata: Bytes,
    pub data: Bytes,
}

impl ConnectionSetup {
    /// 携带路由声明的建连帧。
    pub fn route_setup(setup: &RouteSetup) -> Result<Self, BrokerError> {
        Ok(Self {
            metadata_mime_type: ROUTE_SETUP_MIME_TYPE.to_owned(),
            metadata: setup.encode()?,
            data: Bytes::new(),
        })
    }
}

/// 接纳成功的连接。
#[derive(Debug)]
pub struct AcceptedConnection {
    socket: GatewaySocket,
    registration: Option<Registration>,
}

impl AcceptedConnection {
    /// 处理该连接入站交互的网关连接。
    #[must_use]
    pub fn socket(&self) -> &GatewaySocket {
        &self.socket
    }

    /// 路由表中的注册；对端未声明路由时为空。
    #[must_use]
    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    #[must_use]
    pub fn into_parts(self) -> (GatewaySocket, Option<Registration>) {
        (self.socket, self.registration)
    }
}

/// 路由表注册句柄，释放时注销。
///
/// # 教案式说明
/// - **意图 (Why)**：连接关闭时必须把它从路由表中撤掉；若同一 `ROUTE_ID` 已被新连接重新注册，则不能误删；
/// - **契约 (What)**：`release` 或析构时调用 [`RoutingTable::deregister_if_current`]，幂等；
///   路由表已销毁时为空操作。
pub struct Registration {
    table: Weak<RoutingTable>,
    route_id: RouteId,
    internal_id: InternalRouteId,
    active: bool,
}

impl Registration {
    #[must_use]
    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    #[must_use]
    pub fn internal_id(&self) -> InternalRouteId {
        self.internal_id
    }

    /// 立即注销；返回是否真的移除了条目。
    pub fn release(mut self) -> bool {
        self.deregister()
    }

    fn deregister(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.table
            .upgrade()
            .is_some_and(|table| table.deregister_if_current(&self.route_id, self.internal_id))
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("route_id", &self.route_id)
            .field("internal_id", &self.internal_id)
            .field("active", &self.active)
            .finish()
    }
}

/// 建连接纳器。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 元数据 MIME 为 RouteSetup 时解码，失败返回 [`BrokerError::MetadataDecode`]；
///   - 其它 MIME 视为匿名请求方：不注册，只创建网关连接；
///   - 过滤链短路返回 `Ok(None)`，调用方应关闭该连接；过滤器失败以错误返回；
///   - 通过后以 RouteSetup 的完整标签注册对端的发送端。
pub struct GatewaySocketAcceptor {
    factory: GatewaySocketFactory,
    filters: FilterPipeline<SocketAcceptorExchange>,
}

impl GatewaySocketAcceptor {
    #[must_use]
    pub fn new(
        factory: GatewaySocketFactory,
        filters: impl IntoIterator<Item = Arc<SocketAcceptorFilter>>,
    ) -> Self {
        Self {
            factory,
            filters: FilterPipeline::new(filters),
        }
    }

    #[must_use]
    pub fn factory(&self) -> &GatewaySocketFactory {
        &self.factory
    }

    /// 接纳一条新连接。
    pub async fn accept(
        &self,
        setup: &ConnectionSetup,
        sending: ConnectionHandle,
    ) -> Result<Option<AcceptedConnection>, BrokerError> {
        let route_setup = if setup.metadata_mime_type == ROUTE_SETUP_MIME_TYPE {
            Some(RouteSetup::decode(&setup.metadata)?)
        } else {
            None
        };
        let mut exchange = SocketAcceptorExchange::new(route_setup, sending);

        match self.filters.run(&mut exchange).await {
            Ok(Some(Success)) => {}
            Ok(None) => {
                exchange.settle(ExchangeState::Rejected);
                debug!(tags = %exchange.tags(), "connection rejected by acceptor filter chain");
                return Ok(None);
            }
            Err(err) => {
                exchange.settle(ExchangeState::Failed);
                warn!(tags = %exchange.tags(), error = %err, "acceptor filter chain failed");
                return Err(err);
            }
        }

        let registration = match exchange.setup() {
            Some(_) => {
                let table = self.factory.table();
                let internal_id =
                    table.register(exchange.tags().clone(), Arc::clone(exchange.sending()))?;
                let route_id: RouteId = Arc::from(exchange.tags().route_id().unwrap_or_default());
                Some(Registration {
                    table: Arc::downgrade(table),
                    route_id,
                    internal_id,
                    active: true,
                })
            }
            None => None,
        };
        exchange.settle(ExchangeState::Routed);

        Ok(Some(AcceptedConnection {
            socket: self.factory.create(exchange.tags().clone()),
            registration,
        }))
    }
}

impl fmt::Debug for GatewaySocketAcceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySocketAcceptor")
            .field("factory", &self.factory)
            .field("filters", &self.filters)
            .finish()
    }
}
