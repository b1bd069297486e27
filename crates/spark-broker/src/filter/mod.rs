//! # filter 模块说明
//!
//! ## 核心意图（Why）
//! - 建连接纳与请求路由都需要一条可插拔的过滤链：鉴权、限流、审计、标签改写都以过滤器形式挂载；
//! - 过滤器是异步的，可以在决定放行前访问外部系统。
//!
//! ## 契约（What）
//! - 过滤器按 `order` 升序严格串行执行，同序者保持注册顺序；
//! - 每个过滤器三选一：调用 `chain.filter(exchange)` 继续；返回 `Ok(None)` 短路（终端动作不会发生）；
//!   返回 `Err` 失败（后续过滤器与终端动作均跳过，错误向上传播）；
//! - 链末尾返回 `Ok(Some(Success))`，表示交换可以进入终端动作；
//! - 没有内建超时，卡住的过滤器会让该交换一直停留在 `Pending`。

mod predicate;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::error::BrokerError;

pub use predicate::{PredicateFilter, SocketAcceptorPredicate};

/// 链走到末尾的标记。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Success;

/// 过滤器结果：`Ok(Some(_))` 继续，`Ok(None)` 短路，`Err` 失败。
pub type FilterResult = Result<Option<Success>, BrokerError>;

/// 作用于交换对象 `E` 的过滤器。
///
/// # 教案式说明
/// - **意图 (Why)**：把“是否放行”与“放行前做什么”交给过滤器自己决定，链只负责顺序；
/// - **契约 (What)**：
///   - 想继续时必须把 `chain` 原样交回 `chain.filter(exchange)`，并返回其结果；
///   - `chain` 按值传入，每个过滤器至多推进一次；
///   - `order` 越小越先执行，默认 0；
/// - **风险 (Trade-offs)**：过滤器可以修改交换对象的标注，但不应改写查询本身。
#[async_trait]
pub trait Filter<E>: Send + Sync {
    fn order(&self) -> i32 {
        0
    }

    /// 日志与错误中使用的名称。
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn filter(&self, exchange: &mut E, chain: FilterChain<'_, E>) -> FilterResult;
}

/// 剩余待执行的过滤器。
pub struct FilterChain<'a, E> {
    filters: &'a [Arc<dyn Filter<E>>],
}

impl<E> FilterChain<'_, E> {
    /// 推进到下一个过滤器；没有剩余过滤器时返回成功。
    pub async fn filter(self, exchange: &mut E) -> FilterResult {
        match self.filters.split_first() {
            Some((head, rest)) => {
                trace!(filter = head.name(), order = head.order(), "entering filter");
                head.filter(exchange, FilterChain { filters: rest }).await
            }
            None => Ok(Some(Success)),
        }
    }

    /// 剩余过滤器数量。
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.filters.len()
    }
}

/// 已按 `order` 排好序的过滤器序列。
pub struct FilterPipeline<E> {
    filters: Vec<Arc<dyn Filter<E>>>,
}

impl<E> FilterPipeline<E> {
    /// 排序后构造；同序过滤器保持传入顺序。
    pub fn new(filters: impl IntoIterator<Item = Arc<dyn Filter<E>>>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().collect();
        filters.sort_by_key(|filter| filter.order());
        Self { filters }
    }

    /// 与另一组过滤器合并为新的序列。
    #[must_use]
    pub fn merged(&self, extra: &[Arc<dyn Filter<E>>]) -> Self {
        Self::new(self.filters.iter().chain(extra).cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// 按执行顺序列出名称。
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|filter| filter.name()).collect()
    }

    /// 在 `exchange` 上执行整条链。
    pub async fn run(&self, exchange: &mut E) -> FilterResult {
        FilterChain {
            filters: &self.filters,
        }
        .filter(exchange)
        .await
    }
}

impl<E> Default for FilterPipeline<E> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<E> Clone for FilterPipeline<E> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
        }
    }
}

impl<E> fmt::Debug for FilterPipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
