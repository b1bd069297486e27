//! # 标签线格式属性测试
//!
//! ## 测试目标（Why）
//! - 任意 well-known 与自定义键混合的标签集合，经编码再解码后结构相等；
//! - 信封类型（RouteSetup、Forwarding）在标签块之前的定长字段不会干扰标签解析。

use proptest::prelude::*;
use spark_codec_tags::{Forwarding, Key, RouteSetup, TagsMetadata, WellKnownKey};

fn field() -> impl Strategy<Value = String> {
    // 1..=40 个字符，最多 3 字节一个，始终落在 127 字节以内。
    "[a-zA-Z0-9._\\-\u{4e00}-\u{4e20}]{1,40}"
}

fn key() -> impl Strategy<Value = Key> {
    prop_oneof![
        proptest::sample::select(WellKnownKey::ALL.to_vec()).prop_map(Key::WellKnown),
        field().prop_map(Key::from),
        proptest::sample::select(WellKnownKey::ALL.to_vec()).prop_map(|key| Key::from(key.as_str())),
        (0u8..=0x7F).prop_filter_map("标识符总在单字节范围内", Key::from_identifier),
    ]
}

fn tags() -> impl Strategy<Value = TagsMetadata> {
    proptest::collection::vec((key(), field()), 0..12)
        .prop_map(|pairs| pairs.into_iter().collect::<TagsMetadata>())
}

proptest! {
    #[test]
    fn tags_survive_the_wire(tags in tags()) {
        let encoded = tags.encode().expect("生成的字段都在长度上限内");
        prop_assert_eq!(TagsMetadata::decode(&encoded), Ok(tags));
    }

    #[test]
    fn route_setup_survives_the_wire(id in any::<u128>(), name in field(), tags in tags()) {
        let setup = RouteSetup::new(id, name, tags);
        let encoded = setup.encode().expect("编码成功");
        prop_assert_eq!(RouteSetup::decode(&encoded), Ok(setup));
    }

    #[test]
    fn forwarding_survives_the_wire(origin in any::<u128>(), tags in tags()) {
        let forwarding = Forwarding::new(origin, tags);
        let encoded = forwarding.encode().expect("编码成功");
        prop_assert_eq!(Forwarding::decode(&encoded), Ok(forwarding));
    }
}

#[test]
fn mixed_keys_keep_their_values() {
    let tags = TagsMetadata::builder()
        .service_name("serviceA")
        .route_id("1111")
        .with(WellKnownKey::ClusterName, "clusterB")
        .with("custom-key", "custom-value")
        .build();
    let decoded = TagsMetadata::decode(&tags.encode().expect("编码成功")).expect("解码成功");
    assert_eq!(decoded.get(WellKnownKey::ClusterName), Some("clusterB"));
    assert_eq!(decoded.get("custom-key"), Some("custom-value"));
    assert_eq!(decoded, tags);
}

/// 以规范名书写的键与以标识符书写的键是同一个键，经线格式往返后仍结构相等。
///
/// # 教案式说明
/// - **测试目标（Why）**：线格式只有一种方式表达 well-known 键，若内存中允许“规范名的自定义键”或
///   “与已定义编号冲突的保留键”存在，解码结果必然与编码前不相等；
/// - **验收契约（What）**：三种写法构造出的集合彼此相等，且往返解码后不变。
#[test]
fn canonical_spellings_share_one_key() {
    let by_name = TagsMetadata::builder()
        .with("io.rsocket.routing.Zone", "z1")
        .with(String::from("io.rsocket.routing.ServiceName"), "svc")
        .build();
    let by_enum = TagsMetadata::builder()
        .with(WellKnownKey::Zone, "z1")
        .service_name("svc")
        .build();
    let by_identifier = TagsMetadata::builder()
        .with(Key::from_identifier(0x07).expect("Zone 的编号"), "z1")
        .with(Key::from_identifier(0x01).expect("ServiceName 的编号"), "svc")
        .build();
    assert_eq!(by_name, by_enum);
    assert_eq!(by_identifier, by_enum);

    for tags in [by_name, by_identifier] {
        let decoded = TagsMetadata::decode(&tags.encode().expect("编码成功")).expect("解码成功");
        assert_eq!(decoded, tags, "往返后必须结构相等");
    }
}
