//! 配置路由：为符合选择器的请求追加专属过滤器。

use std::fmt;
use std::sync::Arc;

use spark_codec_tags::{Key, TagsMetadata};

use crate::exchange::GatewayExchange;
use crate::filter::Filter;
use crate::routing::matches;

/// 请求过滤器。
pub type GatewayFilter = dyn Filter<GatewayExchange>;

/// 一条配置路由。
///
/// # 教案式说明
/// - **意图 (Why)**：不同目标服务往往需要不同的过滤策略（例如只对计费服务做配额检查），配置路由把
///   过滤器与一个标签选择器绑定；
/// - **契约 (What)**：
///   - 选择器中的每个标签都出现在请求查询中时路由生效，空选择器匹配一切；
///   - 多条路由同时生效时只取 `order` 最小者，同序取先注册者；
///   - 路由的过滤器与全局过滤器合并后统一按 `order` 排序执行。
#[derive(Clone)]
pub struct Route {
    id: String,
    order: i32,
    selector: TagsMetadata,
    filters: Vec<Arc<GatewayFilter>>,
}

impl Route {
    #[must_use]
    pub fn builder(id: impl Into<String>) -> RouteBuilder {
        RouteBuilder {
            route: Route {
                id: id.into(),
                order: 0,
                selector: TagsMetadata::new(),
                filters: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    #[must_use]
    pub fn selector(&self) -> &TagsMetadata {
        &self.selector
    }

    #[must_use]
    pub fn filters(&self) -> &[Arc<GatewayFilter>] {
        &self.filters
    }

    /// 该路由是否适用于查询。
    #[must_use]
    pub fn applies_to(&self, query: &TagsMetadata) -> bool {
        self.selector.is_empty() || matches(&self.selector, query)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("selector", &self.selector)
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// [`Route`] 构建器。
pub struct RouteBuilder {
    route: Route,
}

impl RouteBuilder {
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.route.order = order;
        self
    }

    /// 追加一个选择器标签。
    #[must_use]
    pub fn select(mut self, key: impl Into<Key>, value: impl Into<String>) -> Self {
        self.route.selector.insert(key, value);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Arc<GatewayFilter>) -> Self {
        self.route.filters.push(filter);
        self
    }

    #[must_use]
    pub fn build(self) -> Route {
        self.route
    }
}

/// 按 `order` 排序的配置路由集合。
#[derive(Clone, Debug, Default)]
pub struct Routes {
    routes: Vec<Arc<Route>>,
}

impl Routes {
    #[must_use]
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut routes: Vec<_> = routes.into_iter().map(Arc::new).collect();
        routes.sort_by_key(|route| route.order);
        Self { routes }
    }

    /// 第一条适用于查询的路由。
    #[must_use]
    pub fn find(&self, query: &TagsMetadata) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.applies_to(query))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
