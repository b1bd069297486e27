//! # actuator 模块说明
//!
//! ## 核心意图（Why）
//! - 多个 broker 组网时，对端 broker 会把“某条路由在我这里”的通知转发过来；本端把这条路由登记到
//!   指向对端 broker 的连接上，请求即可跨 broker 转发；
//! - 同一入口提供按路由 ID 移除与查看本端概况的运维操作。
//!
//! ## 契约（What）
//! - 尽力而为：找不到对端 broker 的连接时忽略通知；不保证跨 broker 一致。

use std::sync::Arc;

use spark_codec_tags::{TagsMetadata, WellKnownKey};
use tracing::debug;

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::routing::{FederationFeed, InternalRouteId, RouteId, RoutingTable};

/// 对端 broker 通告的一条路由。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteJoin {
    /// 路由所在的 broker。
    pub broker_id: u128,
    /// 路由自身的 ID。
    pub route_id: u128,
    pub service_name: String,
    pub tags: TagsMetadata,
}

impl RouteJoin {
    /// 注册时使用的完整标签。
    #[must_use]
    pub fn enriched_tags(&self) -> TagsMetadata {
        let mut tags = self.tags.clone();
        tags.insert(WellKnownKey::ServiceName, self.service_name.clone());
        tags.insert(WellKnownKey::RouteId, self.route_id.to_string());
        tags
    }
}

/// 本端概况。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerInfo {
    pub broker_id: u128,
    pub service_name: String,
    pub routes: Vec<(RouteId, TagsMetadata)>,
}

/// broker 运维操作入口。
#[derive(Clone, Debug)]
pub struct BrokerActuator {
    broker_id: u128,
    service_name: String,
    federation_capacity: usize,
    table: Arc<RoutingTable>,
}

impl BrokerActuator {
    #[must_use]
    pub fn new(broker_id: u128, table: Arc<RoutingTable>) -> Self {
        let mut actuator = Self::from_config(&BrokerConfig::default(), table);
        actuator.broker_id = broker_id;
        actuator
    }

    /// 按配置中的 broker ID、服务名与事件队列容量创建。
    #[must_use]
    pub fn from_config(config: &BrokerConfig, table: Arc<RoutingTable>) -> Self {
        Self {
            broker_id: u128::from(config.broker_id),
            service_name: config.service_name.clone(),
            federation_capacity: config.federation_queue_capacity,
            table,
        }
    }

    #[must_use]
    pub fn broker_id(&self) -> u128 {
        self.broker_id
    }

    /// 供同步给对端 broker 的注册事件队列，容量取自配置。
    pub fn federation_feed(&self) -> FederationFeed {
        self.table.federation_feed(self.federation_capacity)
    }

    /// 把对端 broker 通告的路由登记到该 broker 的连接上。
    ///
    /// - **返回值**：`Ok(None)` 表示通知来自本端或对端 broker 尚未连上，已忽略；
    ///   否则返回新注册的内部 ID。
    pub fn route_join(&self, join: &RouteJoin) -> Result<Option<InternalRouteId>, BrokerError> {
        if join.broker_id == self.broker_id {
            return Ok(None);
        }
        let Some(broker) = self.table.get(&join.broker_id.to_string()) else {
            debug!(
                broker_id = %join.broker_id,
                route_id = %join.route_id,
                "route join from unknown broker ignored"
            );
            return Ok(None);
        };
        let internal_id = self
            .table
            .register(join.enriched_tags(), Arc::clone(broker.connection()))?;
        debug!(broker_id = %join.broker_id, route_id = %join.route_id, "remote route joined");
        Ok(Some(internal_id))
    }

    /// 按路由 ID 移除。
    pub fn route_remove(&self, route_id: u128) -> bool {
        self.table.deregister_route(&route_id.to_string())
    }

    #[must_use]
    pub fn broker_info(&self) -> BrokerInfo {
        BrokerInfo {
            broker_id: self.broker_id,
            service_name: self.service_name.clone(),
            routes: self.table.snapshot(),
        }
    }
}
