//! 建连接纳阶段的谓词过滤器。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::BrokerError;
use crate::exchange::SocketAcceptorExchange;
use crate::filter::{Filter, FilterChain, FilterResult};

/// 建连接纳谓词。
#[async_trait]
pub trait SocketAcceptorPredicate: Send + Sync {
    async fn test(&self, exchange: &SocketAcceptorExchange) -> Result<bool, BrokerError>;
}

#[async_trait]
impl<F> SocketAcceptorPredicate for F
where
    F: Fn(&SocketAcceptorExchange) -> bool + Send + Sync,
{
    async fn test(&self, exchange: &SocketAcceptorExchange) -> Result<bool, BrokerError> {
        Ok(self(exchange))
    }
}

/// 所有谓词都为真才放行的过滤器。
///
/// # 教案式说明
/// - **意图 (Why)**：谓词可能带副作用（审计、计数），因此即使前一个谓词已为假，其余谓词仍逐个执行；
/// - **契约 (What)**：
///   - 谓词按注册顺序串行求值，结果取合取；没有谓词时视为放行；
///   - 任一谓词返回错误即整体失败；
///   - 不放行时短路，连接被静默丢弃。
pub struct PredicateFilter {
    predicates: Vec<Arc<dyn SocketAcceptorPredicate>>,
    order: i32,
}

impl PredicateFilter {
    #[must_use]
    pub fn new(predicates: Vec<Arc<dyn SocketAcceptorPredicate>>) -> Self {
        Self {
            predicates,
            order: 0,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

#[async_trait]
impl Filter<SocketAcceptorExchange> for PredicateFilter {
    fn order(&self) -> i32 {
        self.order
    }

    fn name(&self) -> &str {
        "predicate"
    }

    async fn filter(
        &self,
        exchange: &mut SocketAcceptorExchange,
        chain: FilterChain<'_, SocketAcceptorExchange>,
    ) -> FilterResult {
        let mut accepted = true;
        for predicate in &self.predicates {
            accepted &= predicate.test(exchange).await?;
        }
        if accepted {
            chain.filter(exchange).await
        } else {
            debug!(tags = %exchange.tags(), "connection refused by acceptor predicate");
            Ok(None)
        }
    }
}
