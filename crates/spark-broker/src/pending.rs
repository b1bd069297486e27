//! # pending 模块说明
//!
//! ## 核心意图（Why）
//! - 请求到达时目标服务可能尚未连上 broker（滚动发布、冷启动）；与其立即失败，不如把请求挂起，等到
//!   第一条满足查询的注册出现时再继续；
//! - 挂起请求 = 一次性完成槽 + 一个注册事件监听器，两者作为一个整体创建与销毁。
//!
//! ## 契约（What）
//! - 匹配规则与路由表查询完全一致（见 [`crate::routing::matches`]）；
//! - 完成槽至多被填充一次，填充后或取消后监听器都会被注销；
//! - 默认无限期等待；配置超时后到期返回 [`BrokerError::PendingTimeout`]。
//!
//! ## 时序（How）
//! - 先挂监听器，再复查一次路由表：调用方“查询未命中”与“监听器生效”之间若恰好发生注册，复查会补上。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use spark_codec_tags::TagsMetadata;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::BrokerError;
use crate::routing::{RouteEntry, RoutingTable, Subscription, matches};

/// 挂起请求的工厂。
///
/// - **契约 (What)**：[`PendingResolver::outstanding`] 为当前尚未结束的挂起请求数。
#[derive(Clone)]
pub struct PendingResolver {
    table: Arc<RoutingTable>,
    timeout: Option<Duration>,
    outstanding: Arc<AtomicUsize>,
}

impl PendingResolver {
    #[must_use]
    pub fn new(table: Arc<RoutingTable>) -> Self {
        Self {
            table,
            timeout: None,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 设置等待上限；`None` 表示无限期等待。
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// 为查询创建挂起请求，监听器立即生效。
    pub fn create(&self, query: TagsMetadata) -> PendingRequest {
        let (sender, receiver) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(sender)));

        let listener_slot = Arc::clone(&slot);
        let listener_query = query.clone();
        let subscription = self.table.add_listener(move |event| {
            if !matches(&listener_query, event.tags()) {
                return;
            }
            if let Some(sender) = listener_slot.lock().take() {
                trace!(route_id = %event.route_id(), query = %listener_query, "pending request matched");
                let _ = sender.send(Arc::clone(event.entry()));
            }
        });

        if let Some(entry) = self.table.find_entries(&query).into_iter().next() {
            if let Some(sender) = slot.lock().take() {
                let _ = sender.send(entry);
            }
        }

        self.outstanding.fetch_add(1, Ordering::Relaxed);
        debug!(query = %query, "pending request created");
        PendingRequest {
            query,
            receiver,
            subscription,
            timeout: self.timeout,
            gauge: OutstandingGauge(Arc::clone(&self.outstanding)),
        }
    }
}

impl fmt::Debug for PendingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResolver")
            .field("timeout", &self.timeout)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

struct OutstandingGauge(Arc<AtomicUsize>);

impl Drop for OutstandingGauge {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// 等待匹配注册的请求。
///
/// # 教案式说明
/// - **意图 (Why)**：把“完成槽”和“监听器句柄”放进同一个值里，丢弃这个值即同时取消二者，调用方无需
///   记得额外的清理步骤；
/// - **契约 (What)**：
///   - [`PendingRequest::resolve`] 返回第一条匹配的注册条目；
///   - 在返回前丢弃请求（或丢弃 `resolve` 的 future）即取消，此后不会再产生任何匹配；
/// - **风险 (Trade-offs)**：无超时配置时，目标永不出现的请求会一直占用一个监听器。
pub struct PendingRequest {
    query: TagsMetadata,
    receiver: oneshot::Receiver<Arc<RouteEntry>>,
    subscription: Subscription,
    timeout: Option<Duration>,
    gauge: OutstandingGauge,
}

impl PendingRequest {
    #[must_use]
    pub fn query(&self) -> &TagsMetadata {
        &self.query
    }

    /// 等待匹配的注册。
    pub async fn resolve(self) -> Result<Arc<RouteEntry>, BrokerError> {
        let Self {
            query,
            receiver,
            subscription,
            timeout,
            gauge: _gauge,
        } = self;

        let received = match timeout {
            Some(after) => match tokio::time::timeout(after, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(query = %query, ?after, "pending request timed out");
                    return Err(BrokerError::PendingTimeout {
                        query: query.to_string(),
                        after,
                    });
                }
            },
            None => receiver.await,
        };
        subscription.dispose();

        match received {
            Ok(entry) => {
                debug!(query = %query, route_id = %entry.route_id(), "pending request resolved");
                Ok(entry)
            }
            Err(_) => Err(BrokerError::PendingAbandoned {
                query: query.to_string(),
            }),
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("query", &self.query)
            .field("timeout", &self.timeout)
            .field("subscription", &self.subscription)
            .finish()
    }
}
