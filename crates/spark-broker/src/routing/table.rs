//! # table 模块说明
//!
//! ## 核心意图（Why）
//! - 路由表是 broker 唯一的共享可变状态：`ROUTE_ID -> RouteEntry` 的主表，加上 `TagKey -> 位图` 的倒排索引；
//! - 查询是多个位图的交集，注册与注销只触碰该条目自己的标签对应的位图。
//!
//! ## 并发模型（How）
//! - 三张表（主表、内部 ID 反查表、倒排索引）各自是独立的 `DashMap`，没有跨表事务；
//! - 因此查询可能看到“位图中有、主表中已无”的过期 ID，[`RoutingTable::find_entries`] 对每个 ID 重新
//!   校验主表，过期 ID 静默丢弃；
//! - 注册按“反查表 → 位图 → 主表”的顺序写入，注销从主表摘除后才撤销索引，
//!   两者并发时不会留下无主的位图成员；
//! - 注册事件在索引写入完成后同步发布，监听器回调期间不持有任何分片锁。

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use roaring::RoaringTreemap;
use spark_codec_tags::{Key, TagsMetadata};
use tracing::debug;

use crate::connection::ConnectionHandle;
use crate::error::BrokerError;
use crate::routing::bitmap::RouteBitmap;
use crate::routing::events::{FederationFeed, ListenerRegistry, RegisteredEvent, Subscription};
use crate::routing::query::TagKey;

/// 对外可见的路由 ID（注册标签中 `ROUTE_ID` 的值）。
pub type RouteId = Arc<str>;

/// 位图行号：单调递增、永不复用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalRouteId(u64);

impl InternalRouteId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InternalRouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 一条已注册的连接。
///
/// - **契约 (What)**：注册后不可变；同一 `ROUTE_ID` 重新注册会产生新的条目与新的内部 ID。
#[derive(Debug)]
pub struct RouteEntry {
    internal_id: InternalRouteId,
    route_id: RouteId,
    tags: TagsMetadata,
    connection: ConnectionHandle,
}

impl RouteEntry {
    #[must_use]
    pub fn internal_id(&self) -> InternalRouteId {
        self.internal_id
    }

    #[must_use]
    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    #[must_use]
    pub fn tags(&self) -> &TagsMetadata {
        &self.tags
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }
}

/// 基于标签倒排索引的连接路由表。
///
/// # 教案式说明
/// - **意图 (Why)**：请求按标签子集寻址，线性扫描全部连接无法支撑大规模注册；倒排位图让查询代价只与
///   查询标签数和命中集合大小相关；
/// - **契约 (What)**：
///   - 注册要求非空 `ROUTE_ID`；
///   - 注销幂等，首次返回 `true`；
///   - 查询为合取语义，含 `ROUTE_ID` 时走 O(1) 精确路径；
///   - 事件只投递给发布时已存在的监听器；
/// - **风险 (Trade-offs)**：无跨表事务，与注册并发的查询可能暂时看不到正在写入的条目。
pub struct RoutingTable<B: RouteBitmap = RoaringTreemap> {
    next_internal_id: AtomicU64,
    entries: DashMap<RouteId, Arc<RouteEntry>>,
    internal_ids: DashMap<InternalRouteId, RouteId>,
    index: DashMap<TagKey, B>,
    listeners: Arc<ListenerRegistry>,
}

impl RoutingTable<RoaringTreemap> {
    /// 使用默认 Roaring 位图的空路由表。
    #[must_use]
    pub fn new() -> Self {
        Self::with_bitmap()
    }
}

impl Default for RoutingTable<RoaringTreemap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RouteBitmap> RoutingTable<B> {
    /// 使用指定位图实现的空路由表。
    #[must_use]
    pub fn with_bitmap() -> Self {
        Self {
            next_internal_id: AtomicU64::new(0),
            entries: DashMap::new(),
            internal_ids: DashMap::new(),
            index: DashMap::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    /// 登记连接并发布注册事件。
    ///
    /// - **前置条件**：`tags` 含非空 `ROUTE_ID`，否则返回 [`BrokerError::InvalidRegistration`]；
    /// - **后置条件**：每个 `(key, value)` 的位图都包含新的内部 ID；同一 `ROUTE_ID` 的旧条目被替换，
    ///   其索引成员关系一并撤销；
    /// - **返回值**：新分配的内部 ID。
    pub fn register(
        &self,
        tags: TagsMetadata,
        connection: ConnectionHandle,
    ) -> Result<InternalRouteId, BrokerError> {
        let route_id: RouteId = match tags.route_id() {
            Some(id) if !id.is_empty() => Arc::from(id),
            _ => return Err(BrokerError::invalid_registration(&tags)),
        };
        let internal_id = InternalRouteId(self.next_internal_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = Arc::new(RouteEntry {
            internal_id,
            route_id: Arc::clone(&route_id),
            tags,
            connection,
        });

        // 主表最后写入：注销只会看到索引已完整的条目。
        self.internal_ids.insert(internal_id, Arc::clone(&route_id));
        for (key, value) in entry.tags() {
            self.index
                .entry(TagKey::new(key, value))
                .or_default()
                .insert(internal_id.0);
        }
        if let Some(previous) = self.entries.insert(Arc::clone(&route_id), Arc::clone(&entry)) {
            debug!(
                route_id = %route_id,
                replaced = %previous.internal_id,
                "route id re-registered, replacing previous entry"
            );
            self.unindex(&previous);
        }

        debug!(route_id = %route_id, internal_id = %internal_id, tags = %entry.tags(), "connection registered");
        self.listeners.publish(&RegisteredEvent::new(entry));
        Ok(internal_id)
    }

    /// 按标签中的 `ROUTE_ID` 注销；缺少 `ROUTE_ID` 或条目不存在时返回 `false`。
    pub fn deregister(&self, tags: &TagsMetadata) -> bool {
        tags.route_id()
            .is_some_and(|route_id| self.deregister_route(route_id))
    }

    /// 按路由 ID 注销。
    pub fn deregister_route(&self, route_id: &str) -> bool {
        match self.entries.remove(route_id) {
            Some((_, entry)) => {
                self.unindex(&entry);
                debug!(route_id = %route_id, internal_id = %entry.internal_id, "connection deregistered");
                true
            }
            None => false,
        }
    }

    /// 仅当该路由 ID 当前仍指向 `internal_id` 时注销。
    ///
    /// - **意图 (Why)**：连接关闭回调到达时，同一 `ROUTE_ID` 可能已被新连接重新注册，此时不能误删新条目。
    pub fn deregister_if_current(&self, route_id: &str, internal_id: InternalRouteId) -> bool {
        match self
            .entries
            .remove_if(route_id, |_, entry| entry.internal_id == internal_id)
        {
            Some((_, entry)) => {
                self.unindex(&entry);
                debug!(route_id = %route_id, internal_id = %internal_id, "connection deregistered");
                true
            }
            None => false,
        }
    }

    fn unindex(&self, entry: &RouteEntry) {
        self.internal_ids.remove(&entry.internal_id);
        for (key, value) in entry.tags() {
            let tag_key = TagKey::new(key, value);
            if let Some(mut bitmap) = self.index.get_mut(&tag_key) {
                bitmap.remove(entry.internal_id.0);
            }
            self.index.remove_if(&tag_key, |_, bitmap| bitmap.is_empty());
        }
    }

    /// 满足查询的内部 ID，升序。
    pub fn find_internal_ids(&self, query: &TagsMetadata) -> Vec<InternalRouteId> {
        if let Some(route_id) = query.route_id() {
            return self
                .entries
                .get(route_id)
                .map(|entry| vec![entry.internal_id])
                .unwrap_or_default();
        }

        let mut matched: Option<B> = None;
        for (key, value) in query {
            let Some(bitmap) = self
                .index
                .get(&TagKey::new(key, value))
                .map(|bitmap| bitmap.value().clone())
            else {
                return Vec::new();
            };
            let acc = match matched.take() {
                Some(mut acc) => {
                    acc.intersect_with(&bitmap);
                    acc
                }
                None => bitmap,
            };
            if acc.is_empty() {
                return Vec::new();
            }
            matched = Some(acc);
        }

        matched
            .map(|bitmap| bitmap.iter().map(InternalRouteId).collect())
            .unwrap_or_default()
    }

    /// 满足查询的路由 ID 集合。
    pub fn find_route_ids(&self, query: &TagsMetadata) -> HashSet<RouteId> {
        self.find_entries(query)
            .into_iter()
            .map(|entry| Arc::clone(&entry.route_id))
            .collect()
    }

    /// 满足查询且仍然存活的条目，按内部 ID 升序。
    pub fn find_entries(&self, query: &TagsMetadata) -> Vec<Arc<RouteEntry>> {
        self.find_internal_ids(query)
            .into_iter()
            .filter_map(|internal_id| {
                let route_id = Arc::clone(self.internal_ids.get(&internal_id)?.value());
                let entry = Arc::clone(self.entries.get(&route_id)?.value());
                (entry.internal_id == internal_id).then_some(entry)
            })
            .collect()
    }

    /// 满足查询的 `(路由 ID, 连接)` 列表。
    pub fn find_connections(&self, query: &TagsMetadata) -> Vec<(RouteId, ConnectionHandle)> {
        self.find_entries(query)
            .into_iter()
            .map(|entry| (Arc::clone(&entry.route_id), Arc::clone(&entry.connection)))
            .collect()
    }

    /// 按路由 ID 读取条目。
    pub fn get(&self, route_id: &str) -> Option<Arc<RouteEntry>> {
        self.entries.get(route_id).map(|entry| Arc::clone(entry.value()))
    }

    /// 订阅之后的注册事件。
    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RegisteredEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(Arc::new(listener))
    }

    /// 挂接一个容量为 `capacity` 的有界事件队列。
    pub fn federation_feed(&self, capacity: usize) -> FederationFeed {
        FederationFeed::attach(&self.listeners, capacity)
    }

    /// 当前存活的监听器数量。
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// 已注册的条目数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 倒排索引中的位图数量。
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// `(key, value)` 对应的位图是否包含 `internal_id`。
    pub fn index_contains(&self, key: &Key, value: &str, internal_id: InternalRouteId) -> bool {
        self.index
            .get(&TagKey::new(key, value))
            .is_some_and(|bitmap| bitmap.contains(internal_id.0))
    }

    /// 按路由 ID 排序的注册快照。
    pub fn snapshot(&self) -> Vec<(RouteId, TagsMetadata)> {
        let mut routes: Vec<(RouteId, TagsMetadata)> = self
            .entries
            .iter()
            .map(|entry| (Arc::clone(entry.key()), entry.value().tags.clone()))
            .collect();
        routes.sort_by(|left, right| left.0.cmp(&right.0));
        routes
    }
}

impl<B: RouteBitmap> fmt::Debug for RoutingTable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("entries", &self.entries.len())
            .field("index", &self.index.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
