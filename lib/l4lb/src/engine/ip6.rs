// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! IPv6 fixed headers.
//!
//! Extension headers are not walked: the next header of the fixed
//! header must be the upper layer protocol.

use crate::api::Ipv6Addr;
use crate::api::Protocol;
use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const IPV6_HDR_SZ: usize = mem::size_of::<Ipv6HdrRaw>();

pub const IPV6_VERSION: u8 = 6;

#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct Ipv6HdrRaw {
    pub vtc_flow: [u8; 4],
    pub payload_len: [u8; 2],
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

impl Ipv6HdrRaw {
    pub fn version(&self) -> u8 {
        self.vtc_flow[0] >> 4
    }

    pub fn payload_len(&self) -> u16 {
        u16::from_be_bytes(self.payload_len)
    }

    pub fn next_hdr(&self) -> Protocol {
        Protocol::from(self.next_hdr)
    }

    pub fn src(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.src)
    }

    pub fn dst(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.dst)
    }

    pub fn set_dst(&mut self, dst: Ipv6Addr) {
        self.dst = dst.bytes();
    }
}
