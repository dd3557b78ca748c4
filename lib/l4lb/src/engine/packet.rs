// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A bounded view of a packet buffer.

use crate::api::Reason;
use core::fmt;
use core::fmt::Display;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

/// A wire header which may be bound directly to packet bytes.
///
/// Every raw header type is a `#[repr(C)]` struct made up of bytes
/// and byte arrays, so any sequence of bytes of the right length is a
/// valid value and no alignment is required.
pub trait RawHeader:
    FromBytes + IntoBytes + KnownLayout + Immutable + Unaligned
{
}

impl<T> RawHeader for T where
    T: FromBytes + IntoBytes + KnownLayout + Immutable + Unaligned
{
}

/// Why a packet could not be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reject {
    /// The buffer ends before the header does.
    Truncated,

    /// A protocol we don't handle at this layer.
    UnsupportedProtocol,

    /// The header fits but its fields contradict each other or the
    /// protocol.
    Malformed,

    /// An IPv4 fragment.
    Fragmented,
}

impl Display for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Reason::from(*self))
    }
}

impl From<Reject> for Reason {
    fn from(rej: Reject) -> Self {
        match rej {
            Reject::Truncated => Reason::Truncated,
            Reject::UnsupportedProtocol => Reason::UnsupportedProtocol,
            Reject::Malformed => Reason::Malformed,
            Reject::Fragmented => Reason::Fragmented,
        }
    }
}

/// The bytes `[data, data_end)` of one packet, borrowed for the
/// duration of a single decision.
///
/// Every access is checked against the end of the buffer. A header
/// that would run past it is reported as [`Reject::Truncated`].
#[derive(Debug)]
pub struct PacketView<'a> {
    buf: &'a mut [u8],
}

impl<'a> PacketView<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    /// The number of bytes between `data` and `data_end`.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf
    }

    /// Bind a header of type `H` to the bytes starting at `offset`.
    pub fn header<H: RawHeader>(&self, offset: usize) -> Result<&H, Reject> {
        let bytes = self.buf.get(offset..).ok_or(Reject::Truncated)?;
        H::ref_from_prefix(bytes)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Reject::Truncated)
    }

    /// Bind a mutable header of type `H` to the bytes starting at
    /// `offset`.
    pub fn header_mut<H: RawHeader>(
        &mut self,
        offset: usize,
    ) -> Result<&mut H, Reject> {
        let bytes = self.buf.get_mut(offset..).ok_or(Reject::Truncated)?;
        H::mut_from_prefix(bytes)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Reject::Truncated)
    }

    /// The `len` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], Reject> {
        let end = offset.checked_add(len).ok_or(Reject::Truncated)?;
        self.buf.get(offset..end).ok_or(Reject::Truncated)
    }

    pub fn bytes_mut(
        &mut self,
        offset: usize,
        len: usize,
    ) -> Result<&mut [u8], Reject> {
        let end = offset.checked_add(len).ok_or(Reject::Truncated)?;
        self.buf.get_mut(offset..end).ok_or(Reject::Truncated)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::udp::UdpHdrRaw;

    #[test]
    fn header_bounds() {
        let mut buf = [0u8; 12];
        let mut view = PacketView::new(&mut buf);

        assert!(view.header::<UdpHdrRaw>(0).is_ok());
        assert!(view.header::<UdpHdrRaw>(4).is_ok());
        assert_eq!(view.header::<UdpHdrRaw>(5).err(), Some(Reject::Truncated));
        assert_eq!(
            view.header::<UdpHdrRaw>(usize::MAX).err(),
            Some(Reject::Truncated)
        );

        view.header_mut::<UdpHdrRaw>(4).unwrap().set_dst_port(53);
        assert_eq!(&view.as_bytes()[6..8], &[0, 53]);

        assert!(view.bytes(10, 2).is_ok());
        assert!(view.bytes(10, 3).is_err());
        assert!(view.bytes_mut(usize::MAX, 2).is_err());
    }
}
