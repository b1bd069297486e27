//! # tags 模块说明
//!
//! ## 核心意图（Why）
//! - `TagsMetadata` 是整个 broker 的“地址”：连接注册时携带它描述自身，请求转发时携带它描述目标；
//! - 同一份结构既用于内存中的匹配，也负责紧凑的二进制线格式。
//!
//! ## 线格式（What）
//! ```text
//! 每个标签：
//!   key byte   : 0x80 | id           (well-known 键)
//!                len                 (自定义键，1..=0x7F，随后 len 字节 UTF-8)
//!   value byte : [0x80 若后面还有标签] | len，随后 len 字节 UTF-8
//! 空标签集合编码为零字节。
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MAX_TAG_LENGTH, MetadataDecodeError, MetadataEncodeError};
use crate::key::{Key, WellKnownKey};

const WELL_KNOWN_TAG: u8 = 0x80;
const HAS_MORE_TAGS: u8 = 0x80;
const LENGTH_MASK: u8 = 0x7F;

/// 有序的 `Key -> String` 标签集合。
///
/// # 教案式说明
/// - **意图 (Why)**：注册方用它声明身份，请求方用它的子集表达查询；两者共用一个类型，匹配逻辑才能
///   只有一份；
/// - **契约 (What)**：
///   - 按键排序存储，同一键只保留最后一次写入的值；
///   - 相等性为结构相等（键集合与值都相同）；
///   - `ROUTE_ID` 为保留键，查询中出现时由路由表走精确匹配路径；
/// - **风险 (Trade-offs)**：有序映射让编码结果与插入顺序无关，代价是无法保留调用方的插入顺序。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TagsMetadata {
    tags: BTreeMap<Key, String>,
}

impl TagsMetadata {
    /// 创建空集合。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建构建器。
    #[must_use]
    pub fn builder() -> TagsMetadataBuilder {
        TagsMetadataBuilder::default()
    }

    /// 按键读取值。
    pub fn get(&self, key: impl Into<Key>) -> Option<&str> {
        self.tags.get(&key.into()).map(String::as_str)
    }

    /// `ROUTE_ID` 的值。
    #[must_use]
    pub fn route_id(&self) -> Option<&str> {
        self.tags
            .get(&Key::WellKnown(WellKnownKey::RouteId))
            .map(String::as_str)
    }

    /// `SERVICE_NAME` 的值。
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.tags
            .get(&Key::WellKnown(WellKnownKey::ServiceName))
            .map(String::as_str)
    }

    /// 写入或覆盖一个标签，返回旧值。
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<String>) -> Option<String> {
        self.tags.insert(key.into(), value.into())
    }

    /// 合并另一组标签，同名键以 `other` 为准。
    pub fn extend(&mut self, other: &TagsMetadata) {
        for (key, value) in &other.tags {
            self.tags.insert(key.clone(), value.clone());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// 按键顺序遍历。
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.tags.iter(),
        }
    }

    /// 编码为独立缓冲区。
    ///
    /// - **契约 (What)**：任一键或值为空、超过 127 字节时返回错误，此时不会产生部分输出；
    /// - **返回值**：空集合返回空 `Bytes`。
    pub fn encode(&self) -> Result<Bytes, MetadataEncodeError> {
        let mut out = BytesMut::new();
        self.encode_into(&mut out)?;
        Ok(out.freeze())
    }

    /// 追加编码到 `out`；校验先于写入完成。
    pub fn encode_into(&self, out: &mut BytesMut) -> Result<(), MetadataEncodeError> {
        for (key, value) in &self.tags {
            if let Key::Custom(name) = key {
                checked_len(name.as_str(), name.as_str())?;
            }
            checked_len(&key.to_string(), value)?;
        }

        let last = self.tags.len().saturating_sub(1);
        for (index, (key, value)) in self.tags.iter().enumerate() {
            match key {
                Key::WellKnown(known) => out.put_u8(WELL_KNOWN_TAG | known.identifier()),
                Key::Reserved(id) => out.put_u8(WELL_KNOWN_TAG | id.get()),
                Key::Custom(name) => {
                    out.put_u8(name.as_str().len() as u8);
                    out.put_slice(name.as_str().as_bytes());
                }
            }
            let more = if index < last { HAS_MORE_TAGS } else { 0 };
            out.put_u8(more | value.len() as u8);
            out.put_slice(value.as_bytes());
        }
        Ok(())
    }

    /// 解码完整缓冲区；最后一个标签之后不允许残留字节。
    pub fn decode(input: &[u8]) -> Result<Self, MetadataDecodeError> {
        let mut reader = Reader::new(input);
        let tags = Self::read_from(&mut reader)?;
        reader.finish()?;
        Ok(tags)
    }

    pub(crate) fn read_from(reader: &mut Reader<'_>) -> Result<Self, MetadataDecodeError> {
        let mut tags = BTreeMap::new();
        if reader.is_empty() {
            return Ok(Self { tags });
        }

        loop {
            let key_offset = reader.offset();
            let key_byte = reader.read_u8()?;
            let key = if key_byte & WELL_KNOWN_TAG == WELL_KNOWN_TAG {
                Key::from_wire_identifier(key_byte & LENGTH_MASK)
            } else {
                let len = usize::from(key_byte);
                if len == 0 {
                    return Err(MetadataDecodeError::EmptyKey { offset: key_offset });
                }
                Key::from(reader.read_str(len)?)
            };

            let value_byte = reader.read_u8()?;
            let value = reader.read_str(usize::from(value_byte & LENGTH_MASK))?;
            tags.insert(key, value.to_owned());

            if value_byte & HAS_MORE_TAGS == 0 {
                break;
            }
        }
        Ok(Self { tags })
    }
}

fn checked_len(field: &str, content: &str) -> Result<(), MetadataEncodeError> {
    match content.len() {
        0 => Err(MetadataEncodeError::EmptyField {
            field: field.to_owned(),
        }),
        len if len > MAX_TAG_LENGTH => Err(MetadataEncodeError::FieldTooLong {
            field: field.to_owned(),
            len,
        }),
        _ => Ok(()),
    }
}

impl fmt::Display for TagsMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (key, value)) in self.tags.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

impl<K: Into<Key>, V: Into<String>> FromIterator<(K, V)> for TagsMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            tags: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TagsMetadata {
    type Item = (&'a Key, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// [`TagsMetadata::iter`] 返回的迭代器。
pub struct Iter<'a> {
    inner: btree_map::Iter<'a, Key, String>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, value)| (key, value.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// `TagsMetadata` 构建器。
#[derive(Clone, Debug, Default)]
pub struct TagsMetadataBuilder {
    tags: TagsMetadata,
}

impl TagsMetadataBuilder {
    /// 设置 `SERVICE_NAME`。
    #[must_use]
    pub fn service_name(self, name: impl Into<String>) -> Self {
        self.with(WellKnownKey::ServiceName, name)
    }

    /// 设置 `ROUTE_ID`。
    #[must_use]
    pub fn route_id(self, id: impl Into<String>) -> Self {
        self.with(WellKnownKey::RouteId, id)
    }

    /// 设置任意标签。
    #[must_use]
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    #[must_use]
    pub fn build(self) -> TagsMetadata {
        self.tags
    }
}

/// 带偏移记录的只读游标，供各个信封类型共用。
pub(crate) struct Reader<'a> {
    input: &'a [u8],
    rest: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input, rest: input }
    }

    pub(crate) fn offset(&self) -> usize {
        self.input.len() - self.rest.remaining()
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.rest.has_remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), MetadataDecodeError> {
        if self.rest.remaining() < needed {
            return Err(MetadataDecodeError::Truncated {
                offset: self.offset(),
                needed,
                remaining: self.rest.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, MetadataDecodeError> {
        self.ensure(1)?;
        Ok(self.rest.get_u8())
    }

    pub(crate) fn read_u128(&mut self) -> Result<u128, MetadataDecodeError> {
        self.ensure(16)?;
        Ok(self.rest.get_u128())
    }

    pub(crate) fn read_str(&mut self, len: usize) -> Result<&'a str, MetadataDecodeError> {
        self.ensure(len)?;
        let offset = self.offset();
        let (field, rest) = self.rest.split_at(len);
        let text =
            std::str::from_utf8(field).map_err(|_| MetadataDecodeError::InvalidUtf8 { offset })?;
        self.rest = rest;
        Ok(text)
    }

    pub(crate) fn finish(&self) -> Result<(), MetadataDecodeError> {
        match self.rest.remaining() {
            0 => Ok(()),
            remaining => Err(MetadataDecodeError::TrailingBytes { remaining }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tags_encode_to_nothing() {
        let encoded = TagsMetadata::new().encode().expect("空集合可以编码");
        assert!(encoded.is_empty());
        assert_eq!(TagsMetadata::decode(&encoded), Ok(TagsMetadata::new()));
    }

    #[test]
    fn layout_matches_wire_format() {
        let tags = TagsMetadata::builder()
            .service_name("svc")
            .with("k", "v")
            .build();
        let encoded = tags.encode().expect("编码成功");
        assert_eq!(
            &encoded[..],
            &[0x81, 0x80 | 3, b's', b'v', b'c', 1, b'k', 1, b'v']
        );
    }

    #[test]
    fn oversized_value_is_rejected_without_partial_output() {
        let tags = TagsMetadata::builder()
            .service_name("svc")
            .with("big", "x".repeat(128))
            .build();
        let mut out = BytesMut::new();
        let err = tags.encode_into(&mut out).expect_err("128 字节超限");
        assert_eq!(
            err,
            MetadataEncodeError::FieldTooLong {
                field: "big".to_owned(),
                len: 128
            }
        );
        assert!(out.is_empty(), "校验失败时不应写出任何字节");
    }

    #[test]
    fn empty_value_is_rejected() {
        let tags = TagsMetadata::builder().with("k", "").build();
        assert!(matches!(
            tags.encode(),
            Err(MetadataEncodeError::EmptyField { .. })
        ));
    }

    #[test]
    fn unknown_identifier_survives_as_reserved_key() {
        let input = [0x80 | 0x16, 2, b'o', b'k'];
        let tags = TagsMetadata::decode(&input).expect("保留键可以解码");
        let reserved = Key::from_identifier(0x16).expect("0x16 在单字节范围内");
        assert_eq!(tags.get(reserved), Some("ok"));
        assert_eq!(&tags.encode().expect("重新编码")[..], &input);
    }

    #[test]
    fn truncated_value_reports_offset() {
        let input = [0x81, 5, b'a'];
        assert_eq!(
            TagsMetadata::decode(&input),
            Err(MetadataDecodeError::Truncated {
                offset: 2,
                needed: 5,
                remaining: 1
            })
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let input = [0x81, 1, b'a', 0xFF];
        assert_eq!(
            TagsMetadata::decode(&input),
            Err(MetadataDecodeError::TrailingBytes { remaining: 1 })
        );
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let input = [0x81, 1, 0xFF];
        assert_eq!(
            TagsMetadata::decode(&input),
            Err(MetadataDecodeError::InvalidUtf8 { offset: 2 })
        );
    }

    #[test]
    fn display_lists_tags_in_key_order() {
        let tags = TagsMetadata::builder()
            .with("custom", "1")
            .route_id("r")
            .build();
        assert_eq!(
            tags.to_string(),
            "{io.rsocket.routing.RouteId=r, custom=1}"
        );
    }
}
