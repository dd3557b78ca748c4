// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;
use core::ops::Deref;
use core::result;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// An IP protocol value.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    ICMP,
    TCP,
    UDP,
    ICMPv6,
    Unknown(u8),
}

pub const PROTO_ICMP: u8 = 0x1;
pub const PROTO_TCP: u8 = 0x6;
pub const PROTO_UDP: u8 = 0x11;
pub const PROTO_ICMPV6: u8 = 0x3A;

impl Protocol {
    /// Does this protocol carry a source and destination port?
    pub const fn has_ports(&self) -> bool {
        matches!(self, Self::TCP | Self::UDP)
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Unknown(255)
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ICMP => write!(f, "ICMP"),
            Self::TCP => write!(f, "TCP"),
            Self::UDP => write!(f, "UDP"),
            Self::ICMPv6 => write!(f, "ICMPv6"),
            Self::Unknown(p) => write!(f, "Unknown({p})"),
        }
    }
}

impl From<u8> for Protocol {
    fn from(proto: u8) -> Self {
        match proto {
            PROTO_ICMP => Self::ICMP,
            PROTO_TCP => Self::TCP,
            PROTO_UDP => Self::UDP,
            PROTO_ICMPV6 => Self::ICMPv6,
            _ => Self::Unknown(proto),
        }
    }
}

impl From<Protocol> for u8 {
    fn from(proto: Protocol) -> u8 {
        match proto {
            Protocol::ICMP => PROTO_ICMP,
            Protocol::TCP => PROTO_TCP,
            Protocol::UDP => PROTO_UDP,
            Protocol::ICMPv6 => PROTO_ICMPV6,
            Protocol::Unknown(v) => v,
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "icmp" | "icmp4" => Ok(Self::ICMP),
            "tcp" => Ok(Self::TCP),
            "udp" => Ok(Self::UDP),
            "icmp6" | "icmpv6" => Ok(Self::ICMPv6),
            other => other
                .parse::<u8>()
                .map(Self::from)
                .map_err(|_| format!("invalid protocol: {s}")),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = String;

    fn try_from(s: String) -> result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Protocol> for String {
    fn from(proto: Protocol) -> String {
        match proto {
            Protocol::ICMP => "icmp".to_string(),
            Protocol::TCP => "tcp".to_string(),
            Protocol::UDP => "udp".to_string(),
            Protocol::ICMPv6 => "icmpv6".to_string(),
            Protocol::Unknown(p) => p.to_string(),
        }
    }
}

/// An IPv4 or IPv6 address.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum IpAddr {
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
}

impl IpAddr {
    pub const fn is_ipv4(&self) -> bool {
        matches!(self, Self::Ip4(_))
    }

    /// Do `self` and `other` belong to the same address family?
    pub const fn same_family(&self, other: &IpAddr) -> bool {
        matches!(
            (self, other),
            (Self::Ip4(_), Self::Ip4(_)) | (Self::Ip6(_), Self::Ip6(_))
        )
    }
}

impl From<Ipv4Addr> for IpAddr {
    fn from(ipv4: Ipv4Addr) -> Self {
        IpAddr::Ip4(ipv4)
    }
}

impl From<Ipv6Addr> for IpAddr {
    fn from(ipv6: Ipv6Addr) -> Self {
        IpAddr::Ip6(ipv6)
    }
}

impl Default for IpAddr {
    fn default() -> Self {
        IpAddr::Ip4(Default::default())
    }
}

impl Display for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IpAddr::Ip4(ip4) => write!(f, "{ip4}"),
            IpAddr::Ip6(ip6) => write!(f, "{ip6}"),
        }
    }
}

impl FromStr for IpAddr {
    type Err = String;

    fn from_str(val: &str) -> result::Result<Self, Self::Err> {
        if let Ok(ipv4) = val.parse::<Ipv4Addr>() {
            Ok(ipv4.into())
        } else {
            val.parse::<Ipv6Addr>()
                .map(IpAddr::Ip6)
                .map_err(|_| format!("invalid IP address: {val}"))
        }
    }
}

impl TryFrom<String> for IpAddr {
    type Error = String;

    fn try_from(s: String) -> result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpAddr> for String {
    fn from(ip: IpAddr) -> String {
        ip.to_string()
    }
}

/// An IPv4 address.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "String", into = "String")]
#[repr(C)]
pub struct Ipv4Addr {
    inner: [u8; 4],
}

impl Ipv4Addr {
    pub const ANY_ADDR: Self = Self { inner: [0; 4] };

    /// Return the bytes of the address.
    #[inline]
    pub fn bytes(&self) -> [u8; 4] {
        self.inner
    }

    pub const fn from_const(bytes: [u8; 4]) -> Self {
        Self { inner: bytes }
    }
}

impl From<core::net::Ipv4Addr> for Ipv4Addr {
    fn from(ip4: core::net::Ipv4Addr) -> Self {
        Self { inner: ip4.octets() }
    }
}

impl From<Ipv4Addr> for core::net::Ipv4Addr {
    fn from(ip4: Ipv4Addr) -> Self {
        Self::from(ip4.inner)
    }
}

impl From<Ipv4Addr> for u32 {
    fn from(ip: Ipv4Addr) -> u32 {
        u32::from_be_bytes(ip.bytes())
    }
}

impl From<u32> for Ipv4Addr {
    fn from(val: u32) -> Self {
        Self { inner: val.to_be_bytes() }
    }
}

impl From<[u8; 4]> for Ipv4Addr {
    fn from(bytes: [u8; 4]) -> Self {
        Self { inner: bytes }
    }
}

impl FromStr for Ipv4Addr {
    type Err = String;

    fn from_str(val: &str) -> result::Result<Self, Self::Err> {
        val.parse::<core::net::Ipv4Addr>()
            .map(Self::from)
            .map_err(|_| format!("malformed ip: {val}"))
    }
}

impl TryFrom<String> for Ipv4Addr {
    type Error = String;

    fn try_from(s: String) -> result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Addr> for String {
    fn from(ip: Ipv4Addr) -> String {
        ip.to_string()
    }
}

impl Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.inner[0], self.inner[1], self.inner[2], self.inner[3],
        )
    }
}

// There's no reason to view an Ipv4Addr as its raw array, so just
// present it in a human-friendly manner.
impl Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Ipv4Addr {{ inner: {self} }}")
    }
}

impl AsRef<[u8]> for Ipv4Addr {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl Deref for Ipv4Addr {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// An IPv6 address.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "String", into = "String")]
#[repr(C)]
pub struct Ipv6Addr {
    inner: [u8; 16],
}

impl Ipv6Addr {
    pub const ANY_ADDR: Self = Self { inner: [0; 16] };

    /// Return the bytes of the address.
    #[inline]
    pub fn bytes(&self) -> [u8; 16] {
        self.inner
    }

    pub const fn from_const(bytes: [u8; 16]) -> Self {
        Self { inner: bytes }
    }
}

impl From<core::net::Ipv6Addr> for Ipv6Addr {
    fn from(ip6: core::net::Ipv6Addr) -> Self {
        Self { inner: ip6.octets() }
    }
}

impl From<Ipv6Addr> for core::net::Ipv6Addr {
    fn from(ip6: Ipv6Addr) -> Self {
        Self::from(ip6.inner)
    }
}

impl From<[u8; 16]> for Ipv6Addr {
    fn from(bytes: [u8; 16]) -> Self {
        Self { inner: bytes }
    }
}

impl FromStr for Ipv6Addr {
    type Err = String;

    fn from_str(val: &str) -> result::Result<Self, Self::Err> {
        val.parse::<core::net::Ipv6Addr>()
            .map(Self::from)
            .map_err(|_| format!("malformed ip: {val}"))
    }
}

impl TryFrom<String> for Ipv6Addr {
    type Error = String;

    fn try_from(s: String) -> result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv6Addr> for String {
    fn from(ip: Ipv6Addr) -> String {
        ip.to_string()
    }
}

impl Display for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", core::net::Ipv6Addr::from(self.inner))
    }
}

impl Debug for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Ipv6Addr {{ inner: {self} }}")
    }
}

impl AsRef<[u8]> for Ipv6Addr {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl Deref for Ipv6Addr {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_addrs() {
        let ip4: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(ip4, IpAddr::Ip4(Ipv4Addr::from([10, 0, 0, 5])));

        let ip6: IpAddr = "fd00::1".parse().unwrap();
        let mut bytes = [0u8; 16];
        bytes[0] = 0xfd;
        bytes[15] = 1;
        assert_eq!(ip6, IpAddr::Ip6(Ipv6Addr::from(bytes)));
        assert_eq!(ip6.to_string(), "fd00::1");

        assert!("10.0.0".parse::<IpAddr>().is_err());
        assert!(!ip4.same_family(&ip6));
    }

    #[test]
    fn protocol_names() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::TCP);
        assert_eq!("icmpv6".parse::<Protocol>().unwrap(), Protocol::ICMPv6);
        assert_eq!("47".parse::<Protocol>().unwrap(), Protocol::Unknown(47));
        assert_eq!(u8::from(Protocol::UDP), PROTO_UDP);
        assert!("bogus".parse::<Protocol>().is_err());
    }
}
