//! 标签查询的匹配规则：索引查询与挂起请求共用同一套语义。

use spark_codec_tags::{Key, TagsMetadata};

/// 位图字典的键：标签键加小写化后的值。
///
/// - **契约 (What)**：值在构造时统一转为小写，因此属性匹配对值大小写不敏感；
///   `ROUTE_ID` 精确匹配不经过此类型，保持大小写敏感。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagKey {
    key: Key,
    value: String,
}

impl TagKey {
    #[must_use]
    pub fn new(key: &Key, value: &str) -> Self {
        Self {
            key: key.clone(),
            value: value.to_lowercase(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// 判断一组已注册标签是否满足查询。
///
/// # 教案式说明
/// - **意图 (Why)**：挂起请求在收到注册事件时必须得出与路由表索引查询完全相同的结论，否则同一查询
///   在“注册前挂起”与“注册后直接命中”两条路径上会看到不同的连接集合；
/// - **契约 (What)**：
///   - 空查询不匹配任何连接；
///   - 查询含 `ROUTE_ID` 时仅比较路由 ID（精确、大小写敏感），忽略其余标签；
///   - 否则查询中每个 `(key, value)` 都必须出现在 `tags` 中（值大小写不敏感）。
#[must_use]
pub fn matches(query: &TagsMetadata, tags: &TagsMetadata) -> bool {
    if query.is_empty() {
        return false;
    }
    if let Some(route_id) = query.route_id() {
        return tags.route_id() == Some(route_id);
    }
    query.iter().all(|(key, value)| {
        tags.get(key.clone())
            .is_some_and(|candidate| TagKey::new(key, candidate) == TagKey::new(key, value))
    })
}
