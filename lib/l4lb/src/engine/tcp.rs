// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! TCP headers.

use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const TCP_HDR_SZ: usize = mem::size_of::<TcpHdrRaw>();

/// The smallest legal data offset, in 32-bit words.
pub const TCP_MIN_DATA_OFFSET: u8 = 5;

pub mod flags {
    pub const FIN: u8 = 1 << 0;
    pub const SYN: u8 = 1 << 1;
    pub const RST: u8 = 1 << 2;
    pub const PSH: u8 = 1 << 3;
    pub const ACK: u8 = 1 << 4;
    pub const URG: u8 = 1 << 5;
}

/// The fixed part of a TCP header. Options follow it.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct TcpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub seq: [u8; 4],
    pub ack: [u8; 4],
    pub offset: u8,
    pub flags: u8,
    pub window: [u8; 2],
    pub csum: [u8; 2],
    pub urg: [u8; 2],
}

impl TcpHdrRaw {
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src_port)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes(self.dst_port)
    }

    pub fn set_dst_port(&mut self, port: u16) {
        self.dst_port = port.to_be_bytes();
    }

    /// The data offset in 32-bit words.
    pub fn data_offset(&self) -> u8 {
        self.offset >> 4
    }

    /// The length of the header, options included, in bytes.
    pub fn hdr_len(&self) -> usize {
        usize::from(self.data_offset()) * 4
    }

    pub fn csum(&self) -> u16 {
        u16::from_be_bytes(self.csum)
    }

    pub fn set_csum(&mut self, csum: u16) {
        self.csum = csum.to_be_bytes();
    }
}
