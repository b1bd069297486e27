//! # spark-broker
//!
//! ## 定位与职责（Why）
//! - 基于标签寻址的多路复用连接代理：端点连上 broker 时以标签声明身份，之后任何对端都可以用一个标签
//!   查询发起四种交互（fire-and-forget、请求-响应、请求-流、请求-通道），broker 负责解析、轮转选择与透明转发；
//! - 目标尚未连上时请求被挂起，等到第一条匹配的注册出现再继续。
//!
//! ## 架构嵌入（Where）
//! - `routing`：路由表、倒排位图、注册事件与查询匹配；
//! - `filter`：建连与请求两条过滤链的公共骨架；
//! - `pending` / `balancer`：挂起解析与轮转选择；
//! - `dispatcher` / `acceptor`：请求转发与建连接纳；
//! - `actuator`：跨 broker 路由通告与运维操作；
//! - `config` / `telemetry`：配置加载与日志订阅器安装。
//!
//! ## 非目标（Trade-offs）
//! - 路由表不持久化，不校验标签声明的真实性；
//! - 跨 broker 同步为尽力而为，至多一次。

pub mod acceptor;
pub mod actuator;
pub mod balancer;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod pending;
pub mod route;
pub mod routing;
pub mod telemetry;

pub use acceptor::{
    AcceptedConnection, ConnectionSetup, GatewaySocketAcceptor, Registration, SocketAcceptorFilter,
};
pub use actuator::{BrokerActuator, BrokerInfo, RouteJoin};
pub use balancer::{DEFAULT_MAX_TRACKED_QUERIES, LoadBalancer, RoundRobin};
pub use config::BrokerConfig;
pub use connection::{Connection, ConnectionHandle, InteractionType, Payload, PayloadStream};
pub use dispatcher::{GatewaySocket, GatewaySocketFactory, GatewaySocketFactoryBuilder};
pub use error::BrokerError;
pub use exchange::{ExchangeState, GatewayExchange, RouteTarget, SocketAcceptorExchange};
pub use filter::{Filter, FilterChain, FilterPipeline, FilterResult, Success};
pub use pending::{PendingRequest, PendingResolver};
pub use route::{GatewayFilter, Route, Routes};
pub use routing::{
    FederationFeed, InternalRouteId, RegisteredEvent, RouteEntry, RouteId, RoutingTable,
    Subscription,
};
