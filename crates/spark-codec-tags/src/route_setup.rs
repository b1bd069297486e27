//! 连接建立时携带的路由声明（`message/x.rsocket.routesetup.v0`）。

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MAX_TAG_LENGTH, MetadataDecodeError, MetadataEncodeError};
use crate::key::WellKnownKey;
use crate::tags::{Reader, TagsMetadata};

/// RouteSetup 元数据的 MIME 类型。
pub const ROUTE_SETUP_MIME_TYPE: &str = "message/x.rsocket.routesetup.v0";

/// 端点接入 broker 时的自我声明。
///
/// # 教案式说明
/// - **意图 (Why)**：把“我是谁”（128 bit 路由 ID 与服务名）与附加标签打包进建连元数据，broker 据此把
///   连接写入路由表；
/// - **契约 (What)**：线格式为 16 字节大端 `id`、1 字节长度加 UTF-8 服务名、随后是标签块；
///   [`RouteSetup::enriched_tags`] 把 `id` 与服务名折叠进标签，作为注册时使用的完整标签集合；
/// - **风险 (Trade-offs)**：服务名同样受 127 字节上限约束。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSetup {
    id: u128,
    service_name: String,
    tags: TagsMetadata,
}

impl RouteSetup {
    #[must_use]
    pub fn new(id: u128, service_name: impl Into<String>, tags: TagsMetadata) -> Self {
        Self {
            id,
            service_name: service_name.into(),
            tags,
        }
    }

    #[must_use]
    pub fn id(&self) -> u128 {
        self.id
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn tags(&self) -> &TagsMetadata {
        &self.tags
    }

    /// 声明的标签加上 `SERVICE_NAME` 与十进制 `ROUTE_ID`。
    #[must_use]
    pub fn enriched_tags(&self) -> TagsMetadata {
        let mut tags = self.tags.clone();
        tags.insert(WellKnownKey::ServiceName, self.service_name.clone());
        tags.insert(WellKnownKey::RouteId, self.id.to_string());
        tags
    }

    pub fn encode(&self) -> Result<Bytes, MetadataEncodeError> {
        let len = self.service_name.len();
        if len == 0 {
            return Err(MetadataEncodeError::EmptyField {
                field: "service name".to_owned(),
            });
        }
        if len > MAX_TAG_LENGTH {
            return Err(MetadataEncodeError::FieldTooLong {
                field: "service name".to_owned(),
                len,
            });
        }

        let mut out = BytesMut::with_capacity(16 + 1 + len);
        out.put_u128(self.id);
        out.put_u8(len as u8);
        out.put_slice(self.service_name.as_bytes());
        self.tags.encode_into(&mut out)?;
        Ok(out.freeze())
    }

    pub fn decode(input: &[u8]) -> Result<Self, MetadataDecodeError> {
        let mut reader = Reader::new(input);
        let id = reader.read_u128()?;
        let len = usize::from(reader.read_u8()?);
        let service_name = reader.read_str(len)?.to_owned();
        let tags = TagsMetadata::read_from(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            id,
            service_name,
            tags,
        })
    }
}
