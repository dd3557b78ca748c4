// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Destination rewrite toward a selected backend.
//!
//! Every check that can fail is made before the first byte is
//! written, so a packet which is dropped here leaves the buffer as it
//! came in.

use super::checksum::full_checksum;
use super::checksum::incremental_update;
use super::checksum::incremental_update_bytes;
use super::checksum::verify;
use super::ether::EtherHdrRaw;
use super::icmp::IcmpHdrRaw;
use super::ip4::IPV4_CSUM_OFFSET;
use super::ip4::Ipv4HdrRaw;
use super::ip6::Ipv6HdrRaw;
use super::packet::PacketView;
use super::parse::L3;
use super::parse::Parsed;
use super::tcp::TcpHdrRaw;
use super::udp::UdpHdrRaw;
use crate::api::Backend;
use crate::api::IpAddr;
use crate::api::Ipv4Addr;
use crate::api::Ipv6Addr;
use crate::api::Protocol;
use crate::api::Reason;

fn addr_bytes(ip: &IpAddr) -> &[u8] {
    match ip {
        IpAddr::Ip4(ip4) => ip4,
        IpAddr::Ip6(ip6) => ip6,
    }
}

/// Rewrite the packet described by `meta` so that it is addressed to
/// `backend`.
///
/// This rewrites the destination address, the destination port when
/// the backend names one, and the destination MAC when the backend
/// carries one. The TTL or hop limit is decremented. Every checksum
/// covering a changed field is brought up to date.
pub fn rewrite(
    view: &mut PacketView<'_>,
    meta: &Parsed,
    backend: &Backend,
) -> Result<(), Reason> {
    let old_dst = meta.dst;
    let new_dst = backend.address;

    // Translating between address families would mean growing or
    // shrinking the IP header in place.
    if !old_dst.same_family(&new_dst) {
        return Err(Reason::RewriteOverflow);
    }

    if meta.ttl <= 1 {
        return Err(Reason::TtlExceeded);
    }

    if let Some(mac) = backend.mac {
        view.header_mut::<EtherHdrRaw>(0)?.set_dst(mac);
    }

    match new_dst {
        IpAddr::Ip4(dst) => rewrite_ip4(view, meta, dst)?,
        IpAddr::Ip6(dst) => rewrite_ip6(view, meta, dst)?,
    }

    let port = if meta.proto.has_ports() { backend.port } else { 0 };
    rewrite_ulp(view, meta, &old_dst, &new_dst, port)
}

fn rewrite_ip4(
    view: &mut PacketView<'_>,
    meta: &Parsed,
    dst: Ipv4Addr,
) -> Result<(), Reason> {
    // The stored checksum is only a sound base for an incremental
    // update if it is correct to begin with.
    let csum_ok = verify(view.bytes(meta.l3_off, meta.l3_hdr_len)?);

    let ip = view.header_mut::<Ipv4HdrRaw>(meta.l3_off)?;
    let old_dst = ip.dst;
    let old_ttl = ip.ttl_word();
    ip.set_dst(dst);
    ip.ttl = ip.ttl.saturating_sub(1);

    if csum_ok {
        let csum = incremental_update_bytes(ip.csum(), &old_dst, &ip.dst);
        let csum = incremental_update(csum, old_ttl, ip.ttl_word());
        ip.set_csum(csum);
        return Ok(());
    }

    let hdr = view.bytes_mut(meta.l3_off, meta.l3_hdr_len)?;
    let csum_field = IPV4_CSUM_OFFSET..IPV4_CSUM_OFFSET + 2;
    hdr[csum_field.clone()].fill(0);
    let csum = full_checksum(hdr);
    hdr[csum_field].copy_from_slice(&csum.to_be_bytes());
    Ok(())
}

fn rewrite_ip6(
    view: &mut PacketView<'_>,
    meta: &Parsed,
    dst: Ipv6Addr,
) -> Result<(), Reason> {
    let ip = view.header_mut::<Ipv6HdrRaw>(meta.l3_off)?;
    ip.set_dst(dst);
    ip.hop_limit = ip.hop_limit.saturating_sub(1);
    Ok(())
}

// The upper layer checksums of TCP, UDP, and ICMPv6 cover the
// pseudo-header, and thus the destination address.
fn rewrite_ulp(
    view: &mut PacketView<'_>,
    meta: &Parsed,
    old_dst: &IpAddr,
    new_dst: &IpAddr,
    port: u16,
) -> Result<(), Reason> {
    let old_b = addr_bytes(old_dst);
    let new_b = addr_bytes(new_dst);

    match meta.proto {
        Protocol::TCP => {
            let tcp = view.header_mut::<TcpHdrRaw>(meta.l4_off)?;
            let mut csum = incremental_update_bytes(tcp.csum(), old_b, new_b);
            let old_port = tcp.dst_port();
            if port != 0 && port != old_port {
                tcp.set_dst_port(port);
                csum = incremental_update(csum, old_port, port);
            }
            tcp.set_csum(csum);
        }

        Protocol::UDP => {
            let udp = view.header_mut::<UdpHdrRaw>(meta.l4_off)?;
            let old_port = udp.dst_port();
            let new_port = if port != 0 { port } else { old_port };
            udp.set_dst_port(new_port);

            // No checksum was sent, so there is none to maintain.
            if meta.l3 == L3::Ipv4 && udp.csum() == 0 {
                return Ok(());
            }

            let csum = incremental_update_bytes(udp.csum(), old_b, new_b);
            let csum = incremental_update(csum, old_port, new_port);
            udp.set_csum(csum);
        }

        Protocol::ICMPv6 => {
            let icmp = view.header_mut::<IcmpHdrRaw>(meta.l4_off)?;
            let csum = incremental_update_bytes(icmp.csum(), old_b, new_b);
            icmp.set_csum(csum);
        }

        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::IfIndex;
    use crate::engine::checksum::pseudo_header_v4;
    use crate::engine::checksum::pseudo_header_v6;
    use crate::api::MacAddr;
    use crate::api::Reach;
    use crate::engine::parse::parse;
    use l4lb_test_utils::verify::ipv4_csum_ok;
    use l4lb_test_utils::verify::l4_csum_ok;
    use l4lb_test_utils::verify::summarize;
    use l4lb_test_utils::*;

    fn backend(addr: &str, port: u16) -> Backend {
        Backend {
            address: addr.parse().unwrap(),
            port,
            egress: IfIndex(2),
            mac: None,
            reach: Reach::Direct,
        }
    }

    fn run(pkt: &mut [u8], b: &Backend) -> Result<(), Reason> {
        let mut view = PacketView::new(pkt);
        let meta = parse(&view).unwrap();
        rewrite(&mut view, &meta, b)
    }

    #[test]
    fn tcp4_address_and_port() {
        let mut pkt = tcp4("172.16.0.9", 33000, "10.0.0.5", 80);
        let mut b = backend("192.168.1.10", 8080);
        b.mac = Some(MacAddr::from([2, 0, 0, 0, 0, 1]));
        run(&mut pkt, &b).unwrap();

        let s = summarize(&pkt).unwrap();
        assert_eq!(s.dst, b.address);
        assert_eq!(s.dst_port, Some(8080));
        assert_eq!(s.ttl, 63);
        assert_eq!(s.dst_mac, MacAddr::from([2, 0, 0, 0, 0, 1]));
        assert!(ipv4_csum_ok(&pkt));
        assert!(l4_csum_ok(&pkt));
    }

    #[test]
    fn udp4_keep_port() {
        let mut pkt = udp4("172.16.0.9", 5353, "10.0.0.5", 53, b"query");
        run(&mut pkt, &backend("192.168.1.10", 0)).unwrap();

        let s = summarize(&pkt).unwrap();
        assert_eq!(s.dst_port, Some(53));
        assert!(ipv4_csum_ok(&pkt));
        assert!(l4_csum_ok(&pkt));
    }

    #[test]
    fn udp4_without_checksum() {
        let mut pkt = PktSpec::new(
            "172.16.0.9".parse().unwrap(),
            "10.0.0.5".parse().unwrap(),
            L4Spec::Udp { src_port: 5353, dst_port: 53, csum: false },
        )
        .payload(b"query")
        .build();
        run(&mut pkt, &backend("192.168.1.10", 5300)).unwrap();

        let l4 = ETHER_HDR_LEN + IPV4_HDR_LEN;
        assert_eq!(&pkt[l4 + 6..l4 + 8], &[0, 0]);
        assert_eq!(summarize(&pkt).unwrap().dst_port, Some(5300));
        assert!(ipv4_csum_ok(&pkt));
    }

    #[test]
    fn v6_and_icmpv6() {
        let mut pkt = tcp6("fd00::9", 33000, "fd00::5", 443);
        run(&mut pkt, &backend("fd00:1::10", 8443)).unwrap();
        let s = summarize(&pkt).unwrap();
        assert_eq!(s.dst, "fd00:1::10".parse().unwrap());
        assert_eq!(s.ttl, 63);
        assert!(l4_csum_ok(&pkt));

        let mut pkt = PktSpec::new(
            "fd00::9".parse().unwrap(),
            "fd00::5".parse().unwrap(),
            L4Spec::IcmpEcho { id: 3, seq: 1 },
        )
        .build();
        run(&mut pkt, &backend("fd00:1::10", 8443)).unwrap();
        assert!(l4_csum_ok(&pkt));
    }

    // Sum the pseudo-header and the whole upper layer, checksum
    // included, from scratch. A correct checksum sums to all ones.
    fn l4_sum_ok(pkt: &mut [u8]) -> bool {
        let view = PacketView::new(pkt);
        let meta = parse(&view).unwrap();
        let proto = u8::from(meta.proto);
        let mut csum = match (meta.src, meta.dst) {
            (IpAddr::Ip4(src), IpAddr::Ip4(dst)) => pseudo_header_v4(
                &src.bytes(),
                &dst.bytes(),
                proto,
                meta.l4_len as u16,
            ),
            (IpAddr::Ip6(src), IpAddr::Ip6(dst)) => pseudo_header_v6(
                &src.bytes(),
                &dst.bytes(),
                proto,
                meta.l4_len as u32,
            ),
            _ => unreachable!(),
        };
        csum.add_bytes(view.bytes(meta.l4_off, meta.l4_len).unwrap());
        csum.finalize() == 0xFFFF
    }

    #[test]
    fn incremental_l4_matches_full_sum() {
        let b4 = backend("192.168.1.10", 8080);
        let b6 = backend("fd00:1::10", 8443);
        let mut cases = vec![
            (tcp4("172.16.0.9", 33000, "10.0.0.5", 80), &b4),
            (udp4("172.16.0.9", 5353, "10.0.0.5", 53, b"odd"), &b4),
            (tcp6("fd00::9", 33000, "fd00::5", 443), &b6),
        ];
        cases.push((
            PktSpec::new(
                "fd00::9".parse().unwrap(),
                "fd00::5".parse().unwrap(),
                L4Spec::Udp { src_port: 5353, dst_port: 53, csum: true },
            )
            .payload(b"query")
            .build(),
            &b6,
        ));

        for (pkt, b) in &mut cases {
            assert!(l4_sum_ok(pkt));
            run(pkt, *b).unwrap();
            assert!(l4_sum_ok(pkt));
        }
    }

    #[test]
    fn icmp4_port_ignored() {
        let mut pkt = icmp4_echo("172.16.0.9", "10.0.0.5", 7);
        let before = pkt.clone();
        run(&mut pkt, &backend("192.168.1.10", 8080)).unwrap();
        let l4 = ETHER_HDR_LEN + IPV4_HDR_LEN;
        assert_eq!(&pkt[l4..], &before[l4..]);
        assert!(ipv4_csum_ok(&pkt));
        assert!(l4_csum_ok(&pkt));
    }

    #[test]
    fn corrupt_ip_checksum_is_recomputed() {
        let mut pkt = tcp4("172.16.0.9", 33000, "10.0.0.5", 80);
        pkt[ETHER_HDR_LEN + IPV4_CSUM_OFFSET] ^= 0x5A;
        assert!(!ipv4_csum_ok(&pkt));

        run(&mut pkt, &backend("192.168.1.10", 0)).unwrap();
        assert!(ipv4_csum_ok(&pkt));
        assert!(l4_csum_ok(&pkt));
    }

    #[test]
    fn failures_leave_packet_untouched() {
        let mut pkt = tcp4("172.16.0.9", 33000, "10.0.0.5", 80);
        let before = pkt.clone();
        assert_eq!(
            run(&mut pkt, &backend("fd00::10", 0)),
            Err(Reason::RewriteOverflow)
        );
        assert_eq!(pkt, before);

        let mut pkt = PktSpec::new(
            "172.16.0.9".parse().unwrap(),
            "10.0.0.5".parse().unwrap(),
            L4Spec::Tcp { src_port: 1, dst_port: 80, flags: TCP_SYN },
        )
        .ttl(1)
        .build();
        let before = pkt.clone();
        assert_eq!(
            run(&mut pkt, &backend("192.168.1.10", 0)),
            Err(Reason::TtlExceeded)
        );
        assert_eq!(pkt, before);
    }
}
