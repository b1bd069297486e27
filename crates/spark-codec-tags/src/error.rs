//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中声明标签元数据在编码与解码两个方向上可能出现的失败；
//! - 解码错误会被上层 broker 原样包装为注册失败或请求失败，因此错误文本需要能直接进入日志。
//!
//! ## 设计要求（What）
//! - 全部派生 `thiserror::Error`，满足 `Send + Sync + 'static`；
//! - 变体携带足够的上下文（偏移、长度、标识符）定位损坏的字节。

use thiserror::Error;

/// 线格式单段（键或值）允许的最大字节数。
pub const MAX_TAG_LENGTH: usize = 0x7F;

/// 解码标签元数据时的失败原因。
///
/// # 教案式说明
/// - **意图 (Why)**：把“缓冲区截断”“UTF-8 非法”“保留标识符”等损坏形态区分开，方便排障时判断是对端
///   版本不兼容还是传输层截断；
/// - **契约 (What)**：`offset` 指向出错字段在输入切片中的起始位置；
/// - **风险 (Trade-offs)**：未实现自动恢复，一旦出现即整段元数据作废。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MetadataDecodeError {
    /// 读取 `needed` 字节时缓冲区只剩 `remaining` 字节。
    #[error("metadata truncated at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// 键或值不是合法 UTF-8。
    #[error("metadata field at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    /// 自定义键长度为 0，线格式上无法与其它字段区分。
    #[error("custom tag key at offset {offset} has zero length")]
    EmptyKey { offset: usize },

    /// 最后一个标签之后仍有多余字节。
    #[error("{remaining} trailing bytes after the last tag")]
    TrailingBytes { remaining: usize },
}

/// 编码标签元数据时的失败原因。
///
/// - **意图 (Why)**：线格式用 7 bit 表示长度，超长或空字段必须在写出前拒绝，而不是静默丢弃；
/// - **契约 (What)**：`field` 描述违规字段（键名或 `service name`），`len` 为实际字节数。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MetadataEncodeError {
    /// 字段为空。
    #[error("tag field `{field}` must not be empty")]
    EmptyField { field: String },

    /// 字段超过 [`MAX_TAG_LENGTH`] 字节。
    #[error("tag field `{field}` is {len} bytes, the limit is {MAX_TAG_LENGTH}")]
    FieldTooLong { field: String, len: usize },
}
