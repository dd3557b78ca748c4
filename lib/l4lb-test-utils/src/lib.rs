// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for tests and benchmarks.
//!
//! Frames are laid out by hand and their checksums are filled in by
//! `smoltcp`, so that anything built here is independent of the
//! engine under test.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod pcap;
pub mod verify;

pub use l4lb_api::IpAddr;
pub use l4lb_api::Ipv4Addr;
pub use l4lb_api::Ipv6Addr;
pub use l4lb_api::MacAddr;
pub use l4lb_api::PROTO_ICMP;
pub use l4lb_api::PROTO_ICMPV6;
pub use l4lb_api::PROTO_TCP;
pub use l4lb_api::PROTO_UDP;
use smoltcp::wire::Icmpv4Packet;
use smoltcp::wire::Icmpv6Packet;
use smoltcp::wire::IpAddress;
use smoltcp::wire::Ipv4Address;
use smoltcp::wire::Ipv4Packet;
use smoltcp::wire::Ipv6Address;
use smoltcp::wire::TcpPacket;
use smoltcp::wire::UdpPacket;

pub const CLIENT_MAC: MacAddr =
    MacAddr::from_const([0xA8, 0x40, 0x25, 0x00, 0x00, 0x01]);
pub const LB_MAC: MacAddr =
    MacAddr::from_const([0xA8, 0x40, 0x25, 0x00, 0x00, 0xFF]);

pub const ETHER_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const IPV6_HDR_LEN: usize = 40;

pub const TCP_SYN: u8 = 0x02;
pub const TCP_ACK: u8 = 0x10;

/// The upper layer of a test packet.
#[derive(Clone, Debug)]
pub enum L4Spec {
    Tcp { src_port: u16, dst_port: u16, flags: u8 },

    /// A UDP datagram. When `csum` is false over IPv4 the checksum is
    /// left as zero.
    Udp { src_port: u16, dst_port: u16, csum: bool },

    /// An ICMP or ICMPv6 echo request, depending on the address family.
    IcmpEcho { id: u16, seq: u16 },

    /// Some protocol number with no header of its own.
    Other(u8),
}

impl L4Spec {
    fn hdr_len(&self) -> usize {
        match self {
            Self::Tcp { .. } => 20,
            Self::Udp { .. } | Self::IcmpEcho { .. } => 8,
            Self::Other(_) => 0,
        }
    }

    fn proto(&self, v6: bool) -> u8 {
        match self {
            Self::Tcp { .. } => PROTO_TCP,
            Self::Udp { .. } => PROTO_UDP,
            Self::IcmpEcho { .. } if v6 => PROTO_ICMPV6,
            Self::IcmpEcho { .. } => PROTO_ICMP,
            Self::Other(p) => *p,
        }
    }
}

/// A description of an Ethernet frame to build.
#[derive(Clone, Debug)]
pub struct PktSpec {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub ttl: u8,
    pub l4: L4Spec,
    pub payload: Vec<u8>,
}

fn smol_addr(ip: IpAddr) -> IpAddress {
    match ip {
        IpAddr::Ip4(ip4) => {
            IpAddress::Ipv4(Ipv4Address::from_bytes(&ip4.bytes()))
        }
        IpAddr::Ip6(ip6) => {
            IpAddress::Ipv6(Ipv6Address::from_bytes(&ip6.bytes()))
        }
    }
}

impl PktSpec {
    pub fn new(src: IpAddr, dst: IpAddr, l4: L4Spec) -> Self {
        Self {
            src_mac: CLIENT_MAC,
            dst_mac: LB_MAC,
            src,
            dst,
            ttl: 64,
            l4,
            payload: vec![],
        }
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// The offset of the IP header in the built frame.
    pub fn l3_offset(&self) -> usize {
        ETHER_HDR_LEN
    }

    /// The offset of the upper layer header in the built frame.
    pub fn l4_offset(&self) -> usize {
        match self.src {
            IpAddr::Ip4(_) => ETHER_HDR_LEN + IPV4_HDR_LEN,
            IpAddr::Ip6(_) => ETHER_HDR_LEN + IPV6_HDR_LEN,
        }
    }

    /// Lay out the frame and fill in every checksum.
    pub fn build(&self) -> Vec<u8> {
        let v6 = match (self.src, self.dst) {
            (IpAddr::Ip4(_), IpAddr::Ip4(_)) => false,
            (IpAddr::Ip6(_), IpAddr::Ip6(_)) => true,
            _ => panic!("mixed address families: {} {}", self.src, self.dst),
        };

        let l3 = self.l3_offset();
        let l4 = self.l4_offset();
        let l4_len = self.l4.hdr_len() + self.payload.len();
        let proto = self.l4.proto(v6);
        let mut frame = vec![0u8; l4 + l4_len];

        frame[0..6].copy_from_slice(&self.dst_mac);
        frame[6..12].copy_from_slice(&self.src_mac);

        match (self.src, self.dst) {
            (IpAddr::Ip4(src), IpAddr::Ip4(dst)) => {
                frame[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
                let ip = &mut frame[l3..l4];
                ip[0] = 0x45;
                ip[2..4].copy_from_slice(
                    &((IPV4_HDR_LEN + l4_len) as u16).to_be_bytes(),
                );
                ip[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
                // DF
                ip[6] = 0x40;
                ip[8] = self.ttl;
                ip[9] = proto;
                ip[12..16].copy_from_slice(&src);
                ip[16..20].copy_from_slice(&dst);
                Ipv4Packet::new_unchecked(ip).fill_checksum();
            }

            (IpAddr::Ip6(src), IpAddr::Ip6(dst)) => {
                frame[12..14].copy_from_slice(&0x86DDu16.to_be_bytes());
                let ip = &mut frame[l3..l4];
                ip[0] = 0x60;
                ip[4..6].copy_from_slice(&(l4_len as u16).to_be_bytes());
                ip[6] = proto;
                ip[7] = self.ttl;
                ip[8..24].copy_from_slice(&src);
                ip[24..40].copy_from_slice(&dst);
            }

            _ => unreachable!(),
        }

        let body = l4 + self.l4.hdr_len();
        frame[body..].copy_from_slice(&self.payload);

        let src = smol_addr(self.src);
        let dst = smol_addr(self.dst);
        let seg = &mut frame[l4..];

        match self.l4 {
            L4Spec::Tcp { src_port, dst_port, flags } => {
                seg[0..2].copy_from_slice(&src_port.to_be_bytes());
                seg[2..4].copy_from_slice(&dst_port.to_be_bytes());
                seg[4..8].copy_from_slice(&0x0A0B_0C0Du32.to_be_bytes());
                seg[12] = 0x50;
                seg[13] = flags;
                seg[14..16].copy_from_slice(&64240u16.to_be_bytes());
                TcpPacket::new_unchecked(seg).fill_checksum(&src, &dst);
            }

            L4Spec::Udp { src_port, dst_port, csum } => {
                seg[0..2].copy_from_slice(&src_port.to_be_bytes());
                seg[2..4].copy_from_slice(&dst_port.to_be_bytes());
                seg[4..6].copy_from_slice(&(l4_len as u16).to_be_bytes());
                if csum || v6 {
                    UdpPacket::new_unchecked(seg).fill_checksum(&src, &dst);
                }
            }

            L4Spec::IcmpEcho { id, seq } => {
                seg[0] = if v6 { 128 } else { 8 };
                seg[4..6].copy_from_slice(&id.to_be_bytes());
                seg[6..8].copy_from_slice(&seq.to_be_bytes());
                if v6 {
                    Icmpv6Packet::new_unchecked(seg).fill_checksum(&src, &dst);
                } else {
                    Icmpv4Packet::new_unchecked(seg).fill_checksum();
                }
            }

            L4Spec::Other(_) => {}
        }

        frame
    }
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// A TCP SYN over IPv4.
pub fn tcp4(src: &str, src_port: u16, dst: &str, dst_port: u16) -> Vec<u8> {
    PktSpec::new(ip(src), ip(dst), L4Spec::Tcp {
        src_port,
        dst_port,
        flags: TCP_SYN,
    })
    .build()
}

/// A UDP datagram over IPv4 carrying `payload`.
pub fn udp4(
    src: &str,
    src_port: u16,
    dst: &str,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    PktSpec::new(ip(src), ip(dst), L4Spec::Udp { src_port, dst_port, csum: true })
        .payload(payload)
        .build()
}

/// An ICMP echo request.
pub fn icmp4_echo(src: &str, dst: &str, id: u16) -> Vec<u8> {
    PktSpec::new(ip(src), ip(dst), L4Spec::IcmpEcho { id, seq: 1 })
        .payload(b"ping")
        .build()
}

/// A TCP SYN over IPv6.
pub fn tcp6(src: &str, src_port: u16, dst: &str, dst_port: u16) -> Vec<u8> {
    PktSpec::new(ip(src), ip(dst), L4Spec::Tcp {
        src_port,
        dst_port,
        flags: TCP_SYN,
    })
    .build()
}

/// A UDP datagram over IPv6 carrying `payload`.
pub fn udp6(
    src: &str,
    src_port: u16,
    dst: &str,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    PktSpec::new(ip(src), ip(dst), L4Spec::Udp { src_port, dst_port, csum: true })
        .payload(payload)
        .build()
}
