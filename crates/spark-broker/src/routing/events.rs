//! # events 模块说明
//!
//! ## 核心意图（Why）
//! - 每次成功注册都会产生一条 [`RegisteredEvent`]，挂起请求与跨 broker 同步都依赖它；
//! - 两类消费者的诉求不同：挂起请求必须同步、无缓冲地看到每一条事件，跨 broker 同步则不能拖慢注册路径。
//!
//! ## 执行（How）
//! - [`ListenerRegistry`] 以 `DashMap` 保存同步监听器，发布时先克隆快照再逐个调用，监听器可以在回调
//!   内注销自己；
//! - [`FederationFeed`] 是挂在同一注册表上的有界队列，队列满时丢弃事件并计数。
//!
//! ## 契约（What）
//! - 只投递给发布时已存在的监听器，不保留历史；
//! - 同一监听器按发布顺序收到事件。

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use spark_codec_tags::TagsMetadata;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::connection::ConnectionHandle;
use crate::routing::table::RouteEntry;

/// 一次成功注册。
#[derive(Clone, Debug)]
pub struct RegisteredEvent {
    entry: Arc<RouteEntry>,
}

impl RegisteredEvent {
    pub(crate) fn new(entry: Arc<RouteEntry>) -> Self {
        Self { entry }
    }

    #[must_use]
    pub fn entry(&self) -> &Arc<RouteEntry> {
        &self.entry
    }

    #[must_use]
    pub fn tags(&self) -> &TagsMetadata {
        self.entry.tags()
    }

    #[must_use]
    pub fn route_id(&self) -> &str {
        self.entry.route_id()
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionHandle {
        self.entry.connection()
    }
}

type Listener = Arc<dyn Fn(&RegisteredEvent) + Send + Sync>;

/// 同步监听器集合。
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: DashMap<u64, Listener>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            listeners: DashMap::new(),
        })
    }

    pub(crate) fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        Subscription {
            id,
            registry: Arc::downgrade(self),
            active: true,
        }
    }

    /// 按订阅顺序投递；快照在调用前取好，回调期间不持有任何分片锁。
    pub(crate) fn publish(&self, event: &RegisteredEvent) {
        let mut snapshot: Vec<(u64, Listener)> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        snapshot.sort_unstable_by_key(|(id, _)| *id);
        for (_, listener) in snapshot {
            listener(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

/// 监听器注册句柄，`dispose` 或析构时注销。
///
/// # 教案式说明
/// - **意图 (Why)**：挂起请求被取消时必须同时撤掉监听器，否则会在之后的注册中“复活”；把注销绑定到
///   句柄析构上，取消路径就无需额外代码；
/// - **契约 (What)**：注销幂等；路由表先于句柄销毁时注销为空操作。
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
    active: bool,
}

impl Subscription {
    /// 立即注销。
    pub fn dispose(mut self) {
        self.release();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        !self.active
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.listeners.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// 跨 broker 同步使用的有界事件队列。
///
/// # 教案式说明
/// - **意图 (Why)**：跨 broker 同步是尽力而为的，消费者慢时宁可丢事件，也不能阻塞注册路径或无界堆积；
/// - **契约 (What)**：
///   - 队列满时丢弃最新事件，[`FederationFeed::dropped`] 累计丢弃数量并输出 `warn` 日志；
///   - 析构即注销底层监听器；
/// - **风险 (Trade-offs)**：丢弃意味着对端视图可能缺失路由，需要对端定期全量对账。
pub struct FederationFeed {
    receiver: mpsc::Receiver<RegisteredEvent>,
    dropped: Arc<AtomicU64>,
    _subscription: Subscription,
}

impl FederationFeed {
    pub(crate) fn attach(registry: &Arc<ListenerRegistry>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped);
        let subscription = registry.subscribe(Arc::new(move |event: &RegisteredEvent| {
            match sender.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(event)) => {
                    let total = counter.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        route_id = %event.route_id(),
                        dropped = total,
                        "federation queue full, registration event dropped"
                    );
                }
            }
        }));
        Self {
            receiver,
            dropped,
            _subscription: subscription,
        }
    }

    /// 等待下一条事件。
    pub async fn recv(&mut self) -> Option<RegisteredEvent> {
        self.receiver.recv().await
    }

    /// 非阻塞读取。
    pub fn try_recv(&mut self) -> Option<RegisteredEvent> {
        self.receiver.try_recv().ok()
    }

    /// 因队列满而丢弃的事件数。
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for FederationFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationFeed")
            .field("dropped", &self.dropped())
            .finish()
    }
}
