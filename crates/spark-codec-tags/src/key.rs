//! 标签键：预定义的 well-known 键表与任意字符串键。

use core::fmt;

/// 预定义的路由标签键，线格式中以单字节标识符出现。
///
/// # 教案式说明
/// - **意图 (Why)**：高频标签（服务名、路由 ID、地域等）只占一个字节，避免每次都携带完整键名；
/// - **契约 (What)**：`identifier()` 落在 `0x01..=0x7F`，与 [`WellKnownKey::as_str`] 一一对应；
///   `0x00` 以及表中未出现的编号视为保留，解码时落入 [`Key::Reserved`]。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum WellKnownKey {
    ServiceName = 0x01,
    RouteId = 0x02,
    InstanceName = 0x03,
    ClusterName = 0x04,
    Provider = 0x05,
    Region = 0x06,
    Zone = 0x07,
    Device = 0x08,
    Os = 0x09,
    UserName = 0x0A,
    UserId = 0x0B,
    MajorVersion = 0x0C,
    MinorVersion = 0x0D,
    PatchVersion = 0x0E,
    Version = 0x0F,
    Environment = 0x10,
    TestCell = 0x11,
    Dns = 0x12,
    Ipv4 = 0x13,
    Ipv6 = 0x14,
    Country = 0x15,
    TimeZone = 0x1A,
    ShardKey = 0x1B,
    ShardMethod = 0x1C,
    StickyRouteKey = 0x1D,
    LbMethod = 0x1E,
}

impl WellKnownKey {
    /// 全部已定义的键，按标识符升序。
    pub const ALL: [WellKnownKey; 26] = [
        Self::ServiceName,
        Self::RouteId,
        Self::InstanceName,
        Self::ClusterName,
        Self::Provider,
        Self::Region,
        Self::Zone,
        Self::Device,
        Self::Os,
        Self::UserName,
        Self::UserId,
        Self::MajorVersion,
        Self::MinorVersion,
        Self::PatchVersion,
        Self::Version,
        Self::Environment,
        Self::TestCell,
        Self::Dns,
        Self::Ipv4,
        Self::Ipv6,
        Self::Country,
        Self::TimeZone,
        Self::ShardKey,
        Self::ShardMethod,
        Self::StickyRouteKey,
        Self::LbMethod,
    ];

    /// 线格式标识符。
    #[must_use]
    pub const fn identifier(self) -> u8 {
        self as u8
    }

    /// 规范字符串名。
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServiceName => "io.rsocket.routing.ServiceName",
            Self::RouteId => "io.rsocket.routing.RouteId",
            Self::InstanceName => "io.rsocket.routing.InstanceName",
            Self::ClusterName => "io.rsocket.routing.ClusterName",
            Self::Provider => "io.rsocket.routing.Provider",
            Self::Region => "io.rsocket.routing.Region",
            Self::Zone => "io.rsocket.routing.Zone",
            Self::Device => "io.rsocket.routing.Device",
            Self::Os => "io.rsocket.routing.OS",
            Self::UserName => "io.rsocket.routing.UserName",
            Self::UserId => "io.rsocket.routing.UserId",
            Self::MajorVersion => "io.rsocket.routing.MajorVersion",
            Self::MinorVersion => "io.rsocket.routing.MinorVersion",
            Self::PatchVersion => "io.rsocket.routing.PatchVersion",
            Self::Version => "io.rsocket.routing.Version",
            Self::Environment => "io.rsocket.routing.Environment",
            Self::TestCell => "io.rsocket.routing.TestCell",
            Self::Dns => "io.rsocket.routing.DNS",
            Self::Ipv4 => "io.rsocket.routing.IPv4",
            Self::Ipv6 => "io.rsocket.routing.IPv6",
            Self::Country => "io.rsocket.routing.Country",
            Self::TimeZone => "io.rsocket.routing.TimeZone",
            Self::ShardKey => "io.rsocket.routing.ShardKey",
            Self::ShardMethod => "io.rsocket.routing.ShardMethod",
            Self::StickyRouteKey => "io.rsocket.routing.StickyRouteKey",
            Self::LbMethod => "io.rsocket.routing.LBMethod",
        }
    }

    /// 按线格式标识符查表；未定义的编号返回 `None`。
    #[must_use]
    pub fn from_identifier(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.identifier() == id)
    }

    /// 按规范字符串名查表。
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for WellKnownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 标签键。
///
/// # 教案式说明
/// - **意图 (Why)**：既要支持紧凑的 well-known 键，也要允许业务自定义任意字符串键；
/// - **契约 (What)**：
///   - 同一语义的键只有一种表示：[`Key::Custom`] 与 [`Key::Reserved`] 的载荷类型无法在 crate 外直接构造，
///     只能经 `From<&str>`/`From<String>` 与 [`Key::from_identifier`] 得到，规范名与已定义的标识符
///     在构造时即被归一化为 [`Key::WellKnown`]；
///   - [`Key::Reserved`] 承载本端尚不认识的单字节标识符，重新编码时原样写回。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    WellKnown(WellKnownKey),
    Reserved(ReservedId),
    Custom(CustomName),
}

/// 未定义的单字节标识符，取值 `0x00..=0x7F`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservedId(u8);

impl ReservedId {
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// 不是任何 well-known 规范名的自定义键名。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CustomName(String);

impl CustomName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Key {
    /// 若为 well-known 键则返回其枚举值。
    #[must_use]
    pub fn well_known(&self) -> Option<WellKnownKey> {
        match self {
            Self::WellKnown(key) => Some(*key),
            _ => None,
        }
    }

    /// 按线格式标识符构造键。
    ///
    /// - **契约 (What)**：已定义的编号归一化为 [`Key::WellKnown`]，其余 `0x00..=0x7F` 落入
    ///   [`Key::Reserved`]；最高位被置位的编号无法写进一个键字节，返回 `None`。
    #[must_use]
    pub fn from_identifier(id: u8) -> Option<Self> {
        (id <= MAX_IDENTIFIER).then(|| Self::from_wire_identifier(id))
    }

    /// 解码器入口：`id` 已去掉 well-known 标志位。
    pub(crate) fn from_wire_identifier(id: u8) -> Self {
        WellKnownKey::from_identifier(id).map_or(Self::Reserved(ReservedId(id)), Self::WellKnown)
    }
}

const MAX_IDENTIFIER: u8 = 0x7F;

impl From<WellKnownKey> for Key {
    fn from(key: WellKnownKey) -> Self {
        Self::WellKnown(key)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        match WellKnownKey::from_name(name) {
            Some(key) => Self::WellKnown(key),
            None => Self::Custom(CustomName(name.to_owned())),
        }
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        match WellKnownKey::from_name(&name) {
            Some(key) => Self::WellKnown(key),
            None => Self::Custom(CustomName(name)),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WellKnown(key) => f.write_str(key.as_str()),
            Self::Reserved(id) => write!(f, "reserved:{:#04x}", id.0),
            Self::Custom(name) => f.write_str(&name.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_and_names_are_bijective() {
        for key in WellKnownKey::ALL {
            assert_eq!(WellKnownKey::from_identifier(key.identifier()), Some(key));
            assert_eq!(WellKnownKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(WellKnownKey::from_identifier(0x00), None);
        assert_eq!(WellKnownKey::from_identifier(0x16), None);
    }

    #[test]
    fn canonical_names_normalize_to_well_known() {
        assert_eq!(
            Key::from("io.rsocket.routing.Zone"),
            Key::WellKnown(WellKnownKey::Zone)
        );
        assert_eq!(Key::from("zone").to_string(), "zone");
        assert!(matches!(Key::from("zone"), Key::Custom(ref name) if name.as_str() == "zone"));
    }

    #[test]
    fn defined_identifiers_normalize_to_well_known() {
        assert_eq!(
            Key::from_identifier(0x01),
            Some(Key::WellKnown(WellKnownKey::ServiceName))
        );
        let reserved = Key::from_identifier(0x16).expect("0x16 在单字节范围内");
        assert!(matches!(reserved, Key::Reserved(id) if id.get() == 0x16));
        assert_eq!(reserved.to_string(), "reserved:0x16");
        assert_eq!(Key::from_identifier(0x80), None, "最高位被置位的编号无法编码");
    }
}
