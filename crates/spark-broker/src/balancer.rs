//! # balancer 模块说明
//!
//! ## 核心意图（Why）
//! - 一个查询可能命中多条连接，需要在它们之间轮转分摊；
//! - 每个逻辑查询各自持有一个轮转计数器，互不干扰。
//!
//! ## 契约（What）
//! - 候选为空时返回 `None`，由调用方转入挂起路径；
//! - 不感知连接健康度，只做轮转；
//! - 选择器按归一化后的查询分组，跟踪的查询数有上限。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use spark_codec_tags::TagsMetadata;
use tracing::debug;

use crate::connection::ConnectionHandle;
use crate::routing::{RouteBitmap, RouteId, RoutingTable, TagKey};

/// 默认最多跟踪的查询数。
pub const DEFAULT_MAX_TRACKED_QUERIES: usize = 4096;

/// 原子计数器驱动的轮转选择器。
///
/// # 教案式说明
/// - **意图 (Why)**：多个 broker 实例同时启动时若都从 0 开始，会集中打到第一条连接，因此起点随机；
/// - **契约 (What)**：候选集合稳定为 K 条时，连续 N 次选择中每条被选中 `floor(N/K)` 或 `ceil(N/K)` 次；
/// - **执行 (How)**：`fetch_add` 后对候选数取模；种子取自 32 bit 随机数，64 位平台上远离回绕点。
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    /// 以随机起点创建。
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(rand::random::<u32>() as usize)
    }

    /// 以固定起点创建。
    #[must_use]
    pub fn with_seed(seed: usize) -> Self {
        Self {
            counter: AtomicUsize::new(seed),
        }
    }

    /// 选择一个候选。
    pub fn choose<'a, T>(&self, candidates: &'a [T]) -> Option<&'a T> {
        if candidates.is_empty() {
            return None;
        }
        let ticket = self.counter.fetch_add(1, Ordering::Relaxed);
        candidates.get(ticket % candidates.len())
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RoundRobin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundRobin")
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .finish()
    }
}

/// 选择器分组键：与路由表匹配语义一致的查询归一化形式。
///
/// - **契约 (What)**：含 `ROUTE_ID` 的查询只按路由 ID 分组（大小写敏感）；其余查询按
///   [`TagKey`] 序列分组，因此只有值大小写不同的查询共用同一个选择器。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum QueryKey {
    Route(String),
    Tags(Vec<TagKey>),
}

impl QueryKey {
    fn of(query: &TagsMetadata) -> Self {
        match query.route_id() {
            Some(route_id) => Self::Route(route_id.to_owned()),
            None => Self::Tags(
                query
                    .iter()
                    .map(|(key, value)| TagKey::new(key, value))
                    .collect(),
            ),
        }
    }
}

/// 按查询分组的轮转选择器集合。
///
/// # 教案式说明
/// - **意图 (Why)**：查询来自远端，既可能以不同大小写重复出现，也可能指向早已注销的服务；
/// - **契约 (What)**：
///   - 查询首次命中时创建选择器，某次查询无候选时移除其选择器；
///   - 跟踪数达到上限时清空全部选择器再插入，清空只会让各查询从新的随机起点重新轮转；
/// - **风险 (Trade-offs)**：并发插入时跟踪数可能短暂超过上限，超出量不超过并发插入者数量。
#[derive(Debug)]
pub struct LoadBalancer {
    balancers: DashMap<QueryKey, Arc<RoundRobin>>,
    max_tracked: usize,
}

impl LoadBalancer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_tracked(DEFAULT_MAX_TRACKED_QUERIES)
    }

    /// 指定跟踪上限；`0` 视为 `1`。
    #[must_use]
    pub fn with_max_tracked(max_tracked: usize) -> Self {
        Self {
            balancers: DashMap::new(),
            max_tracked: max_tracked.max(1),
        }
    }

    /// 在路由表中查询并选出一条连接。
    pub fn choose<B: RouteBitmap>(
        &self,
        table: &RoutingTable<B>,
        query: &TagsMetadata,
    ) -> Option<(RouteId, ConnectionHandle)> {
        let key = QueryKey::of(query);
        let candidates = table.find_connections(query);
        if candidates.is_empty() {
            self.balancers.remove(&key);
            return None;
        }
        let balancer = self.balancer_for(key);
        balancer.choose(&candidates).cloned()
    }

    fn balancer_for(&self, key: QueryKey) -> Arc<RoundRobin> {
        if let Some(existing) = self.balancers.get(&key).map(|entry| Arc::clone(entry.value())) {
            return existing;
        }
        if self.balancers.len() >= self.max_tracked {
            debug!(
                tracked = self.balancers.len(),
                limit = self.max_tracked,
                "tracked query limit reached, resetting round-robin state"
            );
            self.balancers.clear();
        }
        Arc::clone(
            self.balancers
                .entry(key)
                .or_insert_with(|| Arc::new(RoundRobin::new()))
                .value(),
        )
    }

    /// 当前跟踪的查询数。
    #[must_use]
    pub fn tracked_queries(&self) -> usize {
        self.balancers.len()
    }

    /// 跟踪上限。
    #[must_use]
    pub fn max_tracked(&self) -> usize {
        self.max_tracked
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}
