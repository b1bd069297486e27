//! 端到端集成测试：建连注册、四种交互的转发、挂起路径、配置路由与跨 broker 通告。

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use spark_broker::{
    BrokerActuator, BrokerConfig, BrokerError, Connection, ConnectionSetup, Filter, FilterChain,
    FilterResult, GatewayExchange, GatewaySocketAcceptor, GatewaySocketFactory, InteractionType,
    Payload, Route, RouteJoin, RoutingTable, SocketAcceptorFilter,
};
use spark_codec_tags::{RouteSetup, TagsMetadata, WellKnownKey};

use support::{
    RecordingConnection, data_of, forwarding_payload, handle, service_payload, service_tags,
};

fn acceptor(table: &Arc<RoutingTable>) -> GatewaySocketAcceptor {
    GatewaySocketAcceptor::new(
        GatewaySocketFactory::builder(Arc::clone(table)).build(),
        Vec::<Arc<SocketAcceptorFilter>>::new(),
    )
}

fn setup(id: u128, service: &str) -> ConnectionSetup {
    ConnectionSetup::route_setup(&RouteSetup::new(id, service, TagsMetadata::new()))
        .expect("建连帧可编码")
}

/// 四种交互经网关转发后保持原交互类型，且响应来自目标连接。
///
/// # 教案式说明
/// - **测试目标（Why）**：网关对调用方应是透明的：请求-流不能被降级为请求-响应，通道的入站元素要原样送达；
/// - **测试设计（How）**：目标连接经接纳器注册，调用方以匿名身份接入，依次发起四种交互；
/// - **验收契约（What）**：目标连接记录的交互序列与发起顺序一致，各自的响应形态正确。
#[tokio::test]
async fn all_interactions_reach_the_target_unchanged() {
    let table = Arc::new(RoutingTable::new());
    let acceptor = acceptor(&table);

    let target = RecordingConnection::new("svc-a");
    let registered = acceptor
        .accept(&setup(11, "svc"), handle(&target))
        .await
        .expect("接纳成功")
        .expect("无过滤器时放行");
    assert_eq!(
        registered.registration().map(|registration| registration.route_id()),
        Some("11")
    );

    let caller = RecordingConnection::new("caller");
    let anonymous = ConnectionSetup::default();
    let accepted = acceptor
        .accept(&anonymous, handle(&caller))
        .await
        .expect("接纳成功")
        .expect("无过滤器时放行");
    assert!(accepted.registration().is_none(), "未声明路由的连接不注册");
    assert_eq!(table.len(), 1);
    let socket = accepted.socket();

    socket
        .fire_and_forget(service_payload("svc", "fnf"))
        .await
        .expect("转发成功");

    let response = socket
        .request_response(service_payload("svc", "rr"))
        .await
        .expect("转发成功")
        .expect("目标有响应");
    assert_eq!(data_of(&response), "svc-a");

    let streamed: Vec<String> = socket
        .request_stream(service_payload("svc", "rs"))
        .map(|item| data_of(&item.expect("流元素")))
        .collect()
        .await;
    assert_eq!(streamed, ["svc-a-1", "svc-a-2"]);

    let inbound = stream::iter(vec![
        Ok(Payload::new(bytes::Bytes::new(), "x")),
        Ok(Payload::new(bytes::Bytes::new(), "y")),
    ])
    .boxed();
    let echoed: Vec<String> = socket
        .request_channel(service_payload("svc", "rc"), inbound)
        .map(|item| data_of(&item.expect("通道元素")))
        .collect()
        .await;
    assert_eq!(echoed, ["svc-a:x", "svc-a:y"]);

    assert_eq!(
        target.calls(),
        [
            InteractionType::FireAndForget,
            InteractionType::RequestResponse,
            InteractionType::RequestStream,
            InteractionType::RequestChannel,
        ]
    );
    assert!(caller.calls().is_empty());
}

#[tokio::test]
async fn requests_rotate_across_matching_connections() {
    let table = Arc::new(RoutingTable::new());
    let targets: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let connection = RecordingConnection::new(name);
            table
                .register(service_tags(name, "svc"), handle(&connection))
                .expect("注册成功");
            connection
        })
        .collect();
    let socket = GatewaySocketFactory::builder(Arc::clone(&table))
        .build()
        .create(TagsMetadata::new());

    let mut hits: HashMap<String, usize> = HashMap::new();
    for _ in 0..9 {
        let response = socket
            .request_response(service_payload("svc", "ping"))
            .await
            .expect("转发成功")
            .expect("目标有响应");
        *hits.entry(data_of(&response)).or_default() += 1;
    }
    for target in &targets {
        assert_eq!(hits.get(target.name()), Some(&3), "轮转必须均匀分布");
    }
}

#[tokio::test]
async fn exact_route_id_targets_a_single_connection() {
    let table = Arc::new(RoutingTable::new());
    for name in ["a", "b"] {
        let connection = RecordingConnection::new(name);
        table
            .register(service_tags(name, "svc"), handle(&connection))
            .expect("注册成功");
    }
    let socket = GatewaySocketFactory::builder(Arc::clone(&table))
        .build()
        .create(TagsMetadata::new());

    let query = TagsMetadata::builder().route_id("b").build();
    for _ in 0..3 {
        let response = socket
            .request_response(forwarding_payload(&query, "ping"))
            .await
            .expect("转发成功")
            .expect("目标有响应");
        assert_eq!(data_of(&response), "b");
    }
}

/// 目标尚未连上时请求挂起，目标经接纳器注册后请求继续并送达。
#[tokio::test]
async fn request_waits_for_a_later_registration() {
    let table = Arc::new(RoutingTable::new());
    let acceptor = Arc::new(acceptor(&table));
    let factory = acceptor.factory().clone();
    let socket = factory.create(TagsMetadata::new());

    let in_flight = tokio::spawn(async move {
        socket
            .request_response(service_payload("late-svc", "ping"))
            .await
    });
    while factory.outstanding_pending() == 0 {
        tokio::task::yield_now().await;
    }

    let target = RecordingConnection::new("late");
    let registered = acceptor
        .accept(&setup(99, "late-svc"), handle(&target))
        .await
        .expect("接纳成功")
        .expect("放行");

    let response = in_flight
        .await
        .expect("任务不应 panic")
        .expect("转发成功")
        .expect("目标有响应");
    assert_eq!(data_of(&response), "late");
    assert_eq!(factory.outstanding_pending(), 0);
    assert_eq!(table.listener_count(), 0);
    drop(registered);
}

#[tokio::test(start_paused = true)]
async fn configured_timeout_bounds_the_wait() {
    let table = Arc::new(RoutingTable::new());
    let config = BrokerConfig::from_toml_str("gateway_id = \"edge\"\npending_timeout_ms = 250")
        .expect("配置合法");
    let socket = GatewaySocketFactory::builder(Arc::clone(&table))
        .config(&config)
        .build()
        .create(TagsMetadata::new());

    let err = socket
        .request_response(service_payload("missing", "ping"))
        .await
        .expect_err("无目标时必须超时");
    assert!(matches!(
        err,
        BrokerError::PendingTimeout { after, .. } if after == Duration::from_millis(250)
    ));

    let mut stream = socket.request_stream(service_payload("missing", "ping"));
    assert!(matches!(
        stream.next().await,
        Some(Err(BrokerError::PendingTimeout { .. }))
    ));
}

#[tokio::test]
async fn malformed_forwarding_metadata_is_an_error() {
    let table = Arc::new(RoutingTable::new());
    let socket = GatewaySocketFactory::builder(Arc::clone(&table))
        .build()
        .create(TagsMetadata::new());

    let err = socket
        .request_response(Payload::new(vec![0x00, 0x01], "ping"))
        .await
        .expect_err("截断的转发元数据必须失败");
    assert_eq!(err.code(), "broker.metadata_decode");
}

#[tokio::test]
async fn closing_the_connection_releases_its_registration() {
    let table = Arc::new(RoutingTable::new());
    let acceptor = acceptor(&table);
    let first = RecordingConnection::new("first");
    let second = RecordingConnection::new("second");

    let old = acceptor
        .accept(&setup(5, "svc"), handle(&first))
        .await
        .expect("接纳成功")
        .expect("放行");
    let new = acceptor
        .accept(&setup(5, "svc"), handle(&second))
        .await
        .expect("接纳成功")
        .expect("放行");

    drop(old);
    let entry = table.get("5").expect("旧连接关闭不得撤掉新注册");
    assert!(support::is_same(entry.connection(), &second));

    let (_, registration) = new.into_parts();
    assert!(registration.expect("已注册").release());
    assert!(table.is_empty());
}

/// 给请求写入标注的配置路由过滤器。
struct Stamp;

#[async_trait]
impl Filter<GatewayExchange> for Stamp {
    fn name(&self) -> &str {
        "stamp"
    }

    async fn filter(
        &self,
        exchange: &mut GatewayExchange,
        chain: FilterChain<'_, GatewayExchange>,
    ) -> FilterResult {
        exchange.annotations_mut().insert("stamped", "yes");
        chain.filter(exchange).await
    }
}

#[tokio::test]
async fn configured_route_filters_apply_only_to_selected_queries() {
    let table = Arc::new(RoutingTable::new());
    let target = RecordingConnection::new("t");
    table
        .register(service_tags("t", "svc"), handle(&target))
        .expect("注册成功");
    let factory = GatewaySocketFactory::builder(Arc::clone(&table))
        .gateway_id("edge-1")
        .route(
            Route::builder("stamped-svc")
                .select(WellKnownKey::ServiceName, "svc")
                .filter(Arc::new(Stamp))
                .build(),
        )
        .build();
    let socket = factory.create(service_tags("me", "caller"));

    let forwarding = spark_codec_tags::Forwarding::builder(1).service_name("svc").build();
    let mut selected = GatewayExchange::new(InteractionType::RequestResponse, forwarding);
    assert!(socket.resolve(&mut selected).await.expect("解析成功").is_some());
    assert_eq!(selected.route(), Some("stamped-svc"));
    assert_eq!(selected.annotations().get("stamped"), Some("yes"));
    assert_eq!(
        selected.annotations().get(spark_broker::exchange::GATEWAY_ID),
        Some("edge-1")
    );
    assert_eq!(
        selected.annotations().get(spark_broker::exchange::RESPONDER_ID),
        Some("t")
    );

    let forwarding = spark_codec_tags::Forwarding::builder(1).route_id("t").build();
    let mut other = GatewayExchange::new(InteractionType::RequestResponse, forwarding);
    assert!(socket.resolve(&mut other).await.expect("解析成功").is_some());
    assert_eq!(other.route(), None);
    assert_eq!(other.annotations().get("stamped"), None);
}

#[tokio::test]
async fn remote_routes_forward_through_the_peer_broker() {
    let table = Arc::new(RoutingTable::new());
    let peer_broker = RecordingConnection::new("broker-2");
    table
        .register(service_tags("2", "broker"), handle(&peer_broker))
        .expect("注册成功");
    let actuator = BrokerActuator::new(1, Arc::clone(&table));

    let join = RouteJoin {
        broker_id: 2,
        route_id: 77,
        service_name: "remote-svc".to_owned(),
        tags: TagsMetadata::new(),
    };
    assert!(actuator.route_join(&join).expect("登记成功").is_some());

    let own = RouteJoin {
        broker_id: 1,
        ..join.clone()
    };
    assert_eq!(actuator.route_join(&own), Ok(None), "本端发出的通告被忽略");
    let unknown = RouteJoin {
        broker_id: 3,
        ..join.clone()
    };
    assert_eq!(actuator.route_join(&unknown), Ok(None), "未连上的 broker 被忽略");

    let socket = GatewaySocketFactory::builder(Arc::clone(&table))
        .build()
        .create(TagsMetadata::new());
    let response = socket
        .request_response(service_payload("remote-svc", "ping"))
        .await
        .expect("转发成功")
        .expect("对端 broker 有响应");
    assert_eq!(data_of(&response), "broker-2");

    let info = actuator.broker_info();
    assert_eq!(info.broker_id, 1);
    let routes: Vec<&str> = info.routes.iter().map(|(route_id, _)| &**route_id).collect();
    assert_eq!(routes, ["2", "77"]);

    assert!(actuator.route_remove(77));
    assert!(!actuator.route_remove(77));
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn federation_feed_reports_new_registrations() {
    let table = Arc::new(RoutingTable::new());
    let config = BrokerConfig::from_toml_str("broker_id = 9\nservice_name = \"edge-broker\"")
        .expect("配置合法");
    let actuator = BrokerActuator::from_config(&config, Arc::clone(&table));
    assert_eq!(actuator.broker_id(), 9);
    let mut feed = actuator.federation_feed();
    let acceptor = acceptor(&table);

    let target = RecordingConnection::new("t");
    let _registered = acceptor
        .accept(&setup(42, "svc"), handle(&target))
        .await
        .expect("接纳成功")
        .expect("放行");

    let event = feed.recv().await.expect("注册事件");
    assert_eq!(event.route_id(), "42");
    assert_eq!(event.tags().get(WellKnownKey::ServiceName), Some("svc"));
    assert_eq!(feed.dropped(), 0);

    let info = actuator.broker_info();
    assert_eq!(info.service_name, "edge-broker");
    assert_eq!(info.routes.len(), 1);
}
