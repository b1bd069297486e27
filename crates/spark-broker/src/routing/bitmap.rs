//! # bitmap 模块说明
//!
//! ## 核心意图（Why）
//! - 路由表为每个 `(key, value)` 维护一个内部 ID 集合，查询即多个集合求交；
//! - 集合实现藏在最小的 [`RouteBitmap`] trait 之后，可以替换位图实现而不触动路由表。
//!
//! ## 默认实现（How）
//! - 内部 ID 是单调递增、永不复用的 `u64`，默认使用 [`roaring::RoaringTreemap`]：
//!   高 32 位分桶、桶内为 Roaring 容器，长时间运行后 ID 稀疏分布时依旧紧凑；
//! - 求交直接落到 `&=`，不额外分配。

use roaring::RoaringTreemap;

/// 路由索引使用的整数集合。
///
/// - **契约 (What)**：`iter` 按升序产出；`intersect_with` 就地求交。
pub trait RouteBitmap: Clone + Default + Send + Sync + 'static {
    /// 插入，返回此前是否不存在。
    fn insert(&mut self, id: u64) -> bool;

    /// 移除，返回此前是否存在。
    fn remove(&mut self, id: u64) -> bool;

    fn contains(&self, id: u64) -> bool;

    fn intersect_with(&mut self, other: &Self);

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_>;
}

impl RouteBitmap for RoaringTreemap {
    fn insert(&mut self, id: u64) -> bool {
        RoaringTreemap::insert(self, id)
    }

    fn remove(&mut self, id: u64) -> bool {
        RoaringTreemap::remove(self, id)
    }

    fn contains(&self, id: u64) -> bool {
        RoaringTreemap::contains(self, id)
    }

    fn intersect_with(&mut self, other: &Self) {
        *self &= other;
    }

    fn is_empty(&self) -> bool {
        RoaringTreemap::is_empty(self)
    }

    fn len(&self) -> usize {
        usize::try_from(RoaringTreemap::len(self)).unwrap_or(usize::MAX)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(RoaringTreemap::iter(self))
    }
}
