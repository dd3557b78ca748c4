// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Ethernet frames.

use crate::api::MacAddr;
use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const ETHER_TYPE_IPV4: u16 = 0x0800;
pub const ETHER_TYPE_ARP: u16 = 0x0806;
pub const ETHER_TYPE_VLAN: u16 = 0x8100;
pub const ETHER_TYPE_IPV6: u16 = 0x86DD;

pub const ETHER_HDR_SZ: usize = mem::size_of::<EtherHdrRaw>();

/// An Ethernet II header.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct EtherHdrRaw {
    pub dst: [u8; 6],
    pub src: [u8; 6],
    pub ether_type: [u8; 2],
}

impl EtherHdrRaw {
    pub fn dst(&self) -> MacAddr {
        MacAddr::from(self.dst)
    }

    pub fn set_dst(&mut self, mac: MacAddr) {
        self.dst = mac.bytes();
    }

    pub fn src(&self) -> MacAddr {
        MacAddr::from(self.src)
    }

    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.ether_type)
    }
}
