//! # spark-codec-tags
//!
//! ## 定位与职责（Why）
//! - 描述 broker 寻址所用的标签模型 [`TagsMetadata`]，以及连接建立、请求转发两类信封的二进制格式；
//! - 只依赖 `bytes`，不绑定任何运行时或传输实现，便于在客户端与 broker 两侧复用。
//!
//! ## 模块划分（Where）
//! - `key`：well-known 键表与 [`Key`]；
//! - `tags`：标签集合与标签块编解码；
//! - `route_setup` / `forwarding`：两类信封；
//! - `error`：编解码错误。

mod error;
mod forwarding;
mod key;
mod route_setup;
mod tags;

pub use error::{MAX_TAG_LENGTH, MetadataDecodeError, MetadataEncodeError};
pub use forwarding::{FORWARDING_MIME_TYPE, Forwarding, ForwardingBuilder, PROXY_KEY};
pub use key::{CustomName, Key, ReservedId, WellKnownKey};
pub use route_setup::{ROUTE_SETUP_MIME_TYPE, RouteSetup};
pub use tags::{Iter, TagsMetadata, TagsMetadataBuilder};
