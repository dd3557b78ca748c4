// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! UDP headers.

use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const UDP_HDR_SZ: usize = mem::size_of::<UdpHdrRaw>();

#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct UdpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub len: [u8; 2],
    pub csum: [u8; 2],
}

impl UdpHdrRaw {
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.dst_port)
    }

    pub fn set_dst_port(&mut self, port: u16) {
        self.dst_port = port.to_be_bytes();
    }

    pub fn len(&self) -> u16 {
        u16::from_be_bytes(self.len)
    }

    /// The checksum as read from the wire. Over IPv4, zero means the
    /// sender did not compute one.
    pub fn csum(&self) -> u16 {
        u16::from_be_bytes(self.csum)
    }

    /// Store a checksum. A computed value of zero is transmitted as
    /// all ones, so that it is not mistaken for "no checksum".
    pub fn set_csum(&mut self, csum: u16) {
        let csum = if csum == 0 { 0xFFFF } else { csum };
        self.csum = csum.to_be_bytes();
    }
}
