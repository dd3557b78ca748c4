// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Check frames with `smoltcp`'s wire parsers, an implementation
//! independent of the engine.

use l4lb_api::IpAddr;
use l4lb_api::Ipv4Addr;
use l4lb_api::Ipv6Addr;
use l4lb_api::MacAddr;
use smoltcp::wire::EthernetFrame;
use smoltcp::wire::EthernetProtocol;
use smoltcp::wire::Icmpv4Packet;
use smoltcp::wire::Icmpv6Packet;
use smoltcp::wire::IpAddress;
use smoltcp::wire::IpProtocol;
use smoltcp::wire::Ipv4Packet;
use smoltcp::wire::Ipv6Packet;
use smoltcp::wire::TcpPacket;
use smoltcp::wire::UdpPacket;

/// What a test usually wants to know about a frame after it was
/// rewritten.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Summary {
    pub dst_mac: MacAddr,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub ttl: u8,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

/// Does the IPv4 header checksum of `frame` verify?
pub fn ipv4_csum_ok(frame: &[u8]) -> bool {
    let Ok(eth) = EthernetFrame::new_checked(frame) else {
        return false;
    };

    match Ipv4Packet::new_checked(eth.payload()) {
        Ok(ip) => ip.verify_checksum(),
        Err(_) => false,
    }
}

fn ulp_csum_ok(
    proto: IpProtocol,
    src: &IpAddress,
    dst: &IpAddress,
    body: &[u8],
) -> bool {
    match proto {
        IpProtocol::Tcp => TcpPacket::new_checked(body)
            .map(|tcp| tcp.verify_checksum(src, dst))
            .unwrap_or(false),
        IpProtocol::Udp => UdpPacket::new_checked(body)
            .map(|udp| udp.verify_checksum(src, dst))
            .unwrap_or(false),
        IpProtocol::Icmp => Icmpv4Packet::new_checked(body)
            .map(|icmp| icmp.verify_checksum())
            .unwrap_or(false),
        IpProtocol::Icmpv6 => Icmpv6Packet::new_checked(body)
            .map(|icmp| icmp.verify_checksum(src, dst))
            .unwrap_or(false),
        _ => false,
    }
}

/// Does the upper layer checksum of `frame` verify against its
/// pseudo-header?
///
/// A UDP over IPv4 datagram without a checksum counts as verified.
pub fn l4_csum_ok(frame: &[u8]) -> bool {
    let Ok(eth) = EthernetFrame::new_checked(frame) else {
        return false;
    };

    match eth.ethertype() {
        EthernetProtocol::Ipv4 => match Ipv4Packet::new_checked(eth.payload())
        {
            Ok(ip) => ulp_csum_ok(
                ip.next_header(),
                &IpAddress::Ipv4(ip.src_addr()),
                &IpAddress::Ipv4(ip.dst_addr()),
                ip.payload(),
            ),
            Err(_) => false,
        },

        EthernetProtocol::Ipv6 => match Ipv6Packet::new_checked(eth.payload())
        {
            Ok(ip) => ulp_csum_ok(
                ip.next_header(),
                &IpAddress::Ipv6(ip.src_addr()),
                &IpAddress::Ipv6(ip.dst_addr()),
                ip.payload(),
            ),
            Err(_) => false,
        },

        _ => false,
    }
}

fn ports(proto: IpProtocol, body: &[u8]) -> (Option<u16>, Option<u16>) {
    match proto {
        IpProtocol::Tcp => match TcpPacket::new_checked(body) {
            Ok(tcp) => (Some(tcp.src_port()), Some(tcp.dst_port())),
            Err(_) => (None, None),
        },
        IpProtocol::Udp => match UdpPacket::new_checked(body) {
            Ok(udp) => (Some(udp.src_port()), Some(udp.dst_port())),
            Err(_) => (None, None),
        },
        _ => (None, None),
    }
}

/// Pull the interesting fields out of `frame`.
pub fn summarize(frame: &[u8]) -> Option<Summary> {
    let eth = EthernetFrame::new_checked(frame).ok()?;
    let dst_mac = MacAddr::from(eth.dst_addr().0);

    match eth.ethertype() {
        EthernetProtocol::Ipv4 => {
            let ip = Ipv4Packet::new_checked(eth.payload()).ok()?;
            let (src_port, dst_port) = ports(ip.next_header(), ip.payload());
            Some(Summary {
                dst_mac,
                src: Ipv4Addr::from(bytes4(ip.src_addr().as_bytes())).into(),
                dst: Ipv4Addr::from(bytes4(ip.dst_addr().as_bytes())).into(),
                ttl: ip.hop_limit(),
                src_port,
                dst_port,
            })
        }

        EthernetProtocol::Ipv6 => {
            let ip = Ipv6Packet::new_checked(eth.payload()).ok()?;
            let (src_port, dst_port) = ports(ip.next_header(), ip.payload());
            Some(Summary {
                dst_mac,
                src: Ipv6Addr::from(bytes16(ip.src_addr().as_bytes())).into(),
                dst: Ipv6Addr::from(bytes16(ip.dst_addr().as_bytes())).into(),
                ttl: ip.hop_limit(),
                src_port,
                dst_port,
            })
        }

        _ => None,
    }
}

fn bytes4(b: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(b);
    out
}

fn bytes16(b: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(b);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;

    #[test]
    fn built_frames_verify() {
        let frames = [
            tcp4("172.16.0.9", 33000, "10.0.0.5", 80),
            udp4("172.16.0.9", 33000, "10.0.0.5", 53, b"dns?"),
            icmp4_echo("172.16.0.9", "10.0.0.5", 7),
            tcp6("fd00::9", 33000, "fd00::5", 443),
            udp6("fd00::9", 33000, "fd00::5", 53, b"hi"),
            PktSpec::new(
                "fd00::9".parse().unwrap(),
                "fd00::5".parse().unwrap(),
                L4Spec::IcmpEcho { id: 1, seq: 2 },
            )
            .build(),
        ];

        for f in &frames {
            assert!(l4_csum_ok(f), "bad l4 checksum: {f:x?}");
        }
        assert!(ipv4_csum_ok(&frames[0]));
        assert!(!ipv4_csum_ok(&frames[3]));
    }

    #[test]
    fn summary_of_tcp4() {
        let frame = tcp4("172.16.0.9", 33000, "10.0.0.5", 80);
        let s = summarize(&frame).unwrap();
        assert_eq!(s.dst_mac, LB_MAC);
        assert_eq!(s.dst, "10.0.0.5".parse().unwrap());
        assert_eq!(s.src_port, Some(33000));
        assert_eq!(s.dst_port, Some(80));
        assert_eq!(s.ttl, 64);
    }

    #[test]
    fn corrupt_is_detected() {
        let mut frame = udp4("172.16.0.9", 33000, "10.0.0.5", 53, b"x");
        let n = frame.len();
        frame[n - 1] ^= 0xFF;
        assert!(!l4_csum_ok(&frame));
        assert!(ipv4_csum_ok(&frame));
    }
}
