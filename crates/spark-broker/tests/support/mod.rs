//! 集成测试共用的连接替身与构造助手。
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use spark_broker::{
    BrokerError, Connection, ConnectionHandle, InteractionType, Payload, PayloadStream,
};
use spark_codec_tags::{Forwarding, TagsMetadata, WellKnownKey};

/// 记录收到的交互并以自身名称作答的连接替身。
///
/// - 请求-响应返回 `data = name`；
/// - 请求-流返回 `name-1`、`name-2` 两个元素；
/// - 请求-通道把每个入站元素回显为 `name:<data>`。
#[derive(Debug)]
pub struct RecordingConnection {
    name: String,
    calls: Mutex<Vec<InteractionType>>,
}

impl RecordingConnection {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn calls(&self) -> Vec<InteractionType> {
        self.calls.lock().expect("记录锁不应中毒").clone()
    }

    fn record(&self, interaction: InteractionType) {
        self.calls.lock().expect("记录锁不应中毒").push(interaction);
    }

    fn reply(&self, data: String) -> Payload {
        Payload::new(Bytes::new(), data)
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn fire_and_forget(&self, _payload: Payload) -> Result<(), BrokerError> {
        self.record(InteractionType::FireAndForget);
        Ok(())
    }

    async fn request_response(&self, _payload: Payload) -> Result<Option<Payload>, BrokerError> {
        self.record(InteractionType::RequestResponse);
        Ok(Some(self.reply(self.name.clone())))
    }

    fn request_stream(&self, _payload: Payload) -> PayloadStream {
        self.record(InteractionType::RequestStream);
        let items = vec![
            Ok(self.reply(format!("{}-1", self.name))),
            Ok(self.reply(format!("{}-2", self.name))),
        ];
        stream::iter(items).boxed()
    }

    fn request_channel(&self, _payload: Payload, payloads: PayloadStream) -> PayloadStream {
        self.record(InteractionType::RequestChannel);
        let name = self.name.clone();
        payloads
            .map_ok(move |payload| {
                Payload::new(
                    Bytes::new(),
                    format!("{name}:{}", String::from_utf8_lossy(&payload.data)),
                )
            })
            .boxed()
    }
}

/// 把具体替身擦除为路由表使用的句柄。
pub fn handle(connection: &Arc<RecordingConnection>) -> ConnectionHandle {
    Arc::clone(connection) as ConnectionHandle
}

/// 判断句柄是否指向给定替身。
pub fn is_same(handle: &ConnectionHandle, connection: &Arc<RecordingConnection>) -> bool {
    Arc::as_ptr(handle).cast::<()>() == Arc::as_ptr(connection).cast::<()>()
}

/// 只含 `ROUTE_ID` 与 `SERVICE_NAME` 的注册标签。
pub fn service_tags(route_id: &str, service: &str) -> TagsMetadata {
    TagsMetadata::builder()
        .route_id(route_id)
        .service_name(service)
        .build()
}

/// 以查询标签构造一条带转发信封的请求负载。
pub fn forwarding_payload(query: &TagsMetadata, data: &str) -> Payload {
    let metadata = Forwarding::new(0x2A, query.clone())
        .encode()
        .expect("测试查询必须可编码");
    Payload::new(metadata, data.to_owned())
}

/// 按服务名查询的请求负载。
pub fn service_payload(service: &str, data: &str) -> Payload {
    let query = TagsMetadata::builder()
        .with(WellKnownKey::ServiceName, service)
        .build();
    forwarding_payload(&query, data)
}

/// 读出负载数据段。
pub fn data_of(payload: &Payload) -> String {
    String::from_utf8_lossy(&payload.data).into_owned()
}
