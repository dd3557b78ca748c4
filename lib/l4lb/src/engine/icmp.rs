// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! ICMP and ICMPv6 headers.
//!
//! Both versions share the same leading eight bytes: type, code,
//! checksum, and four bytes whose meaning depends on the type. For an
//! echo request those are the identifier and sequence number.

use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const ICMP_HDR_SZ: usize = mem::size_of::<IcmpHdrRaw>();

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMPV6_ECHO_REQUEST: u8 = 128;
pub const ICMPV6_ECHO_REPLY: u8 = 129;

#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct IcmpHdrRaw {
    pub msg_type: u8,
    pub code: u8,
    pub csum: [u8; 2],
    pub rest: [u8; 4],
}

impl IcmpHdrRaw {
    pub fn csum(&self) -> u16 {
        u16::from_be_bytes(self.csum)
    }

    pub fn set_csum(&mut self, csum: u16) {
        self.csum = csum.to_be_bytes();
    }

    /// The echo identifier, meaningful only for echo messages.
    pub fn echo_id(&self) -> u16 {
        u16::from_be_bytes([self.rest[0], self.rest[1]])
    }
}
