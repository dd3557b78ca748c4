// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! IPv4 headers.

use crate::api::Ipv4Addr;
use crate::api::Protocol;
use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

/// The size of an IPv4 header without options.
pub const IPV4_HDR_SZ: usize = mem::size_of::<Ipv4HdrRaw>();

/// The byte offset of the header checksum.
pub const IPV4_CSUM_OFFSET: usize = 10;

/// The byte offset of the TTL/protocol word.
pub const IPV4_TTL_OFFSET: usize = 8;

pub const IPV4_VERSION: u8 = 4;

/// The smallest legal IHL, in 32-bit words.
pub const IPV4_MIN_IHL: u8 = 5;

const MORE_FRAGS: u16 = 0x2000;
const FRAG_OFFSET_MASK: u16 = 0x1FFF;

/// The fixed part of an IPv4 header. Options, if any, follow it.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: [u8; 2],
    pub ident: [u8; 2],
    pub frag_and_flags: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub csum: [u8; 2],
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Ipv4HdrRaw {
    pub fn version(&self) -> u8 {
        self.ver_hdr_len >> 4
    }

    /// The header length in 32-bit words.
    pub fn ihl(&self) -> u8 {
        self.ver_hdr_len & 0x0F
    }

    /// The header length, options included, in bytes.
    pub fn hdr_len(&self) -> usize {
        usize::from(self.ihl()) * 4
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes(self.total_len)
    }

    fn frag_word(&self) -> u16 {
        u16::from_be_bytes(self.frag_and_flags)
    }

    /// Is this packet any part of a fragmented datagram?
    pub fn is_fragment(&self) -> bool {
        let w = self.frag_word();
        (w & MORE_FRAGS) != 0 || (w & FRAG_OFFSET_MASK) != 0
    }

    pub fn proto(&self) -> Protocol {
        Protocol::from(self.proto)
    }

    /// The 16-bit word holding TTL and protocol, as it is summed by
    /// the header checksum.
    pub fn ttl_word(&self) -> u16 {
        u16::from_be_bytes([self.ttl, self.proto])
    }

    pub fn csum(&self) -> u16 {
        u16::from_be_bytes(self.csum)
    }

    pub fn set_csum(&mut self, csum: u16) {
        self.csum = csum.to_be_bytes();
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src)
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst)
    }

    pub fn set_dst(&mut self, dst: Ipv4Addr) {
        self.dst = dst.bytes();
    }
}

impl Default for Ipv4HdrRaw {
    fn default() -> Self {
        Ipv4HdrRaw {
            ver_hdr_len: 0x45,
            dscp_ecn: 0x0,
            total_len: [0x0; 2],
            ident: [0x0; 2],
            frag_and_flags: [0x40, 0x0],
            ttl: 64,
            proto: 0xFF,
            csum: [0x0; 2],
            src: [0x0; 4],
            dst: [0x0; 4],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fragment_bits() {
        let mut hdr = Ipv4HdrRaw::default();
        // DF alone is not a fragment.
        assert!(!hdr.is_fragment());

        hdr.frag_and_flags = [0x20, 0x00];
        assert!(hdr.is_fragment());

        hdr.frag_and_flags = [0x00, 0xb9];
        assert!(hdr.is_fragment());
    }

    #[test]
    fn accessors() {
        let hdr = Ipv4HdrRaw {
            ver_hdr_len: 0x46,
            total_len: [0x05, 0xdc],
            proto: 6,
            ttl: 2,
            ..Default::default()
        };
        assert_eq!(hdr.version(), 4);
        assert_eq!(hdr.hdr_len(), 24);
        assert_eq!(hdr.total_len(), 1500);
        assert_eq!(hdr.proto(), Protocol::TCP);
        assert_eq!(hdr.ttl_word(), 0x0206);
    }
}
