//! # connection 模块说明
//!
//! ## 核心意图（Why）
//! - broker 不关心底层多路复用协议的帧格式，只需要“对一条已建立的连接发起四种交互”的能力；
//! - 把这四种交互抽象为对象安全的 [`Connection`] trait，路由表中保存的就是它的 `Arc` 句柄。
//!
//! ## 契约（What）
//! - 请求-响应允许“空结果”（`Ok(None)`），对应过滤器短路后的静默丢弃；
//! - 流与通道返回 `'static` 的 [`PayloadStream`]，消费端丢弃流即视为取消。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::BrokerError;

/// 单个负载帧：元数据与数据两段不透明字节。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    pub metadata: Bytes,
    pub data: Bytes,
}

impl Payload {
    #[must_use]
    pub fn new(metadata: impl Into<Bytes>, data: impl Into<Bytes>) -> Self {
        Self {
            metadata: metadata.into(),
            data: data.into(),
        }
    }
}

/// 负载流；元素级失败以 `Err` 表示。
pub type PayloadStream = BoxStream<'static, Result<Payload, BrokerError>>;

/// 连接句柄。
pub type ConnectionHandle = Arc<dyn Connection>;

/// 交互类型。
///
/// - **契约 (What)**：转发前后类型必须一致，broker 不做类型转换。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteractionType {
    FireAndForget,
    RequestResponse,
    RequestStream,
    RequestChannel,
}

impl InteractionType {
    /// 用于日志与标注的短名。
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FireAndForget => "fire_and_forget",
            Self::RequestResponse => "request_response",
            Self::RequestStream => "request_stream",
            Self::RequestChannel => "request_channel",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条可发起交互的连接。
///
/// # 教案式说明
/// - **意图 (Why)**：路由表登记的是“对端的发送端”，网关自身也以同样的接口接收请求，两者共用一个契约，
///   转发就只是把同一种调用交给另一条连接；
/// - **契约 (What)**：
///   - 实现需 `Send + Sync`，句柄会在多个任务间共享；
///   - `request_stream`/`request_channel` 立即返回流，真正的工作在流被轮询时发生；
///   - `request_channel` 的首个负载单独传入，后续负载来自 `payloads`；
/// - **风险 (Trade-offs)**：未建模背压信号（request-n），由实现方的流自行体现。
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    async fn fire_and_forget(&self, payload: Payload) -> Result<(), BrokerError>;

    async fn request_response(&self, payload: Payload) -> Result<Option<Payload>, BrokerError>;

    fn request_stream(&self, payload: Payload) -> PayloadStream;

    fn request_channel(&self, payload: Payload, payloads: PayloadStream) -> PayloadStream;
}
