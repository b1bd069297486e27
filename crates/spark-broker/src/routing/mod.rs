//! 路由表、倒排位图、注册事件与查询匹配。

pub mod bitmap;
pub mod events;
pub mod query;
pub mod table;

pub use bitmap::RouteBitmap;
pub use events::{FederationFeed, RegisteredEvent, Subscription};
pub use query::{TagKey, matches};
pub use table::{InternalRouteId, RouteEntry, RouteId, RoutingTable};
