// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Layered parsing: Ethernet, then IPv4 or IPv6, then the upper layer.
//!
//! Parsing stops at the first layer that fails validation. What comes
//! out is a [`Parsed`] holding the offsets of each header along with
//! the handful of fields the decision engine needs, so that the view
//! can be borrowed mutably for the rewrite afterwards.

use super::ether::ETHER_HDR_SZ;
use super::ether::ETHER_TYPE_IPV4;
use super::ether::ETHER_TYPE_IPV6;
use super::ether::EtherHdrRaw;
use super::icmp::ICMP_ECHO_REQUEST;
use super::icmp::ICMP_HDR_SZ;
use super::icmp::ICMPV6_ECHO_REQUEST;
use super::icmp::IcmpHdrRaw;
use super::ip4::IPV4_MIN_IHL;
use super::ip4::IPV4_VERSION;
use super::ip4::Ipv4HdrRaw;
use super::ip6::IPV6_HDR_SZ;
use super::ip6::IPV6_VERSION;
use super::ip6::Ipv6HdrRaw;
use super::packet::PacketView;
use super::packet::Reject;
use super::select::FlowTuple;
use super::tcp::TCP_HDR_SZ;
use super::tcp::TCP_MIN_DATA_OFFSET;
use super::tcp::TcpHdrRaw;
use super::udp::UDP_HDR_SZ;
use super::udp::UdpHdrRaw;
use crate::api::IpAddr;
use crate::api::Protocol;
use crate::api::Scope;
use crate::api::ServiceKey;

/// The network layer of a parsed packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum L3 {
    Ipv4,
    Ipv6,
}

/// The location and key fields of each header in a validated packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Parsed {
    pub l3: L3,
    pub l3_off: usize,
    /// The length of the IP header, options included.
    pub l3_hdr_len: usize,
    pub l4_off: usize,
    /// The length of the upper layer, header and payload, as claimed
    /// by the IP header.
    pub l4_len: usize,
    pub proto: Protocol,
    pub src: IpAddr,
    pub dst: IpAddr,
    /// For an ICMP echo request this is the echo identifier.
    pub src_port: u16,
    /// Zero for ICMP.
    pub dst_port: u16,
    /// The TTL or hop limit.
    pub ttl: u8,
}

impl Parsed {
    /// The length of the IP packet, as claimed by its header. This
    /// leaves out the link layer and any padding after the packet.
    pub fn ip_len(&self) -> usize {
        self.l3_hdr_len + self.l4_len
    }

    /// The key this packet is classified by.
    pub fn service_key(&self) -> ServiceKey {
        ServiceKey::new(self.dst, self.dst_port, self.proto, Scope::External)
    }

    pub fn flow(&self) -> FlowTuple {
        FlowTuple {
            src: self.src,
            src_port: self.src_port,
            dst: self.dst,
            dst_port: self.dst_port,
            proto: self.proto,
        }
    }
}

struct Ulp {
    src_port: u16,
    dst_port: u16,
}

/// Parse and validate every layer of the packet in `view`.
pub fn parse(view: &PacketView<'_>) -> Result<Parsed, Reject> {
    let eth = view.header::<EtherHdrRaw>(0)?;

    match eth.ether_type() {
        ETHER_TYPE_IPV4 => parse_ip4(view, ETHER_HDR_SZ),
        ETHER_TYPE_IPV6 => parse_ip6(view, ETHER_HDR_SZ),
        _ => Err(Reject::UnsupportedProtocol),
    }
}

fn parse_ip4(view: &PacketView<'_>, off: usize) -> Result<Parsed, Reject> {
    let ip = view.header::<Ipv4HdrRaw>(off)?;

    if ip.version() != IPV4_VERSION || ip.ihl() < IPV4_MIN_IHL {
        return Err(Reject::Malformed);
    }

    let hdr_len = ip.hdr_len();
    view.bytes(off, hdr_len)?;

    let total_len = usize::from(ip.total_len());
    if total_len < hdr_len {
        return Err(Reject::Malformed);
    }

    if off + total_len > view.len() {
        return Err(Reject::Truncated);
    }

    if ip.is_fragment() {
        return Err(Reject::Fragmented);
    }

    let proto = ip.proto();
    let l4_off = off + hdr_len;
    let l4_len = total_len - hdr_len;
    let ulp = parse_ulp(view, L3::Ipv4, proto, l4_off, l4_len)?;

    Ok(Parsed {
        l3: L3::Ipv4,
        l3_off: off,
        l3_hdr_len: hdr_len,
        l4_off,
        l4_len,
        proto,
        src: ip.src().into(),
        dst: ip.dst().into(),
        src_port: ulp.src_port,
        dst_port: ulp.dst_port,
        ttl: ip.ttl,
    })
}

fn parse_ip6(view: &PacketView<'_>, off: usize) -> Result<Parsed, Reject> {
    let ip = view.header::<Ipv6HdrRaw>(off)?;

    if ip.version() != IPV6_VERSION {
        return Err(Reject::Malformed);
    }

    let l4_off = off + IPV6_HDR_SZ;
    let l4_len = usize::from(ip.payload_len());
    if l4_off + l4_len > view.len() {
        return Err(Reject::Truncated);
    }

    let proto = ip.next_hdr();
    let ulp = parse_ulp(view, L3::Ipv6, proto, l4_off, l4_len)?;

    Ok(Parsed {
        l3: L3::Ipv6,
        l3_off: off,
        l3_hdr_len: IPV6_HDR_SZ,
        l4_off,
        l4_len,
        proto,
        src: ip.src().into(),
        dst: ip.dst().into(),
        src_port: ulp.src_port,
        dst_port: ulp.dst_port,
        ttl: ip.hop_limit,
    })
}

// The upper layer must fit inside the length claimed by the IP
// header, not merely inside the buffer, which may carry link padding.
fn fits(needed: usize, avail: usize) -> Result<(), Reject> {
    if needed > avail { Err(Reject::Truncated) } else { Ok(()) }
}

fn parse_ulp(
    view: &PacketView<'_>,
    l3: L3,
    proto: Protocol,
    off: usize,
    avail: usize,
) -> Result<Ulp, Reject> {
    match (l3, proto) {
        (_, Protocol::TCP) => {
            fits(TCP_HDR_SZ, avail)?;
            let tcp = view.header::<TcpHdrRaw>(off)?;
            if tcp.data_offset() < TCP_MIN_DATA_OFFSET {
                return Err(Reject::Malformed);
            }
            fits(tcp.hdr_len(), avail)?;
            Ok(Ulp { src_port: tcp.src_port(), dst_port: tcp.dst_port() })
        }

        (_, Protocol::UDP) => {
            fits(UDP_HDR_SZ, avail)?;
            let udp = view.header::<UdpHdrRaw>(off)?;
            Ok(Ulp { src_port: udp.src_port(), dst_port: udp.dst_port() })
        }

        (L3::Ipv4, Protocol::ICMP) | (L3::Ipv6, Protocol::ICMPv6) => {
            fits(ICMP_HDR_SZ, avail)?;
            let icmp = view.header::<IcmpHdrRaw>(off)?;
            let src_port = match icmp.msg_type {
                ICMP_ECHO_REQUEST | ICMPV6_ECHO_REQUEST => icmp.echo_id(),
                _ => 0,
            };
            Ok(Ulp { src_port, dst_port: 0 })
        }

        _ => Err(Reject::UnsupportedProtocol),
    }
}
