// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Types and functions for calculating the internet checksum.
//!
//! The [`Checksum`] type provides a rolling one's complement sum,
//! allowing one to build up (or incrementally update) a sum before
//! folding it into the value stored in the header. The free functions
//! cover the two ways the decision engine touches a checksum: a full
//! recomputation over a header, and an incremental update when only a
//! field or two changed.
//!
//! # Checksums and Endianness
//!
//! The internet checksum is a sequence of two bytes, not a logical
//! integer. To compute it we treat each pair of bytes being summed as
//! a 16-bit word. This module reads every word big-endian and writes
//! the result back big-endian, so the `u16` values passed around here
//! are the numbers you would see reading a packet capture. Any
//! consistent choice works (RFC 1071 §1.B); what matters is that the
//! same order is used for reading the words and storing the sum.
//!
//! # Relevant RFCs
//!
//! * 1071 Computing the Internet Checksum
//!
//! * 1141 Incremental Updating of the Internet Checksum
//!
//! * 1624 Computation of the Internet Checksum via Incremental Update

/// Fold a 64-bit accumulator of 16-bit words into the value stored in
/// a header: the one's complement of the folded sum.
///
/// Four rounds of carry folding are enough to bring any `u64` down to
/// 16 bits.
#[inline]
pub const fn fold(mut acc: u64) -> u16 {
    let mut i = 0;
    while i < 4 {
        acc = (acc & 0xFFFF) + (acc >> 16);
        i += 1;
    }

    !(acc as u16)
}

/// Sum the big-endian 16-bit words of `bytes` into `acc`. A trailing
/// odd byte is padded with zero.
#[inline]
fn add_words(mut acc: u64, bytes: &[u8]) -> u64 {
    let mut chunks = bytes.chunks_exact(2);
    for w in &mut chunks {
        acc += u16::from_be_bytes([w[0], w[1]]) as u64;
    }

    if let [last] = chunks.remainder() {
        acc += (*last as u64) << 8;
    }

    acc
}

/// Subtract the words of `bytes` from `acc` by adding their one's
/// complement.
#[inline]
fn sub_words(mut acc: u64, bytes: &[u8]) -> u64 {
    let mut chunks = bytes.chunks_exact(2);
    for w in &mut chunks {
        acc += (!u16::from_be_bytes([w[0], w[1]])) as u64;
    }

    if let [last] = chunks.remainder() {
        acc += (!((*last as u16) << 8)) as u64;
    }

    acc
}

/// Compute the checksum of `bytes` from scratch.
///
/// The caller is expected to have zeroed the checksum field, if the
/// range covers one.
pub fn full_checksum(bytes: &[u8]) -> u16 {
    fold(add_words(0, bytes))
}

/// Does the checksum stored inside `bytes` verify?
///
/// Summing a range that includes a correct checksum yields negative
/// zero.
pub fn verify(bytes: &[u8]) -> bool {
    fold(add_words(0, bytes)) == 0
}

/// Update a checksum when a single 16-bit field changes from
/// `old_field` to `new_field`.
///
/// This is eqn. 3 of RFC 1624: `HC' = ~(~HC + ~m + m')`.
#[inline]
pub const fn incremental_update(
    old_csum: u16,
    old_field: u16,
    new_field: u16,
) -> u16 {
    fold((!old_csum) as u64 + (!old_field) as u64 + new_field as u64)
}

/// Update a checksum when a run of words, such as an address, changes
/// from `old` to `new`.
///
/// Both runs should be the same, even, length.
#[inline]
pub fn incremental_update_bytes(old_csum: u16, old: &[u8], new: &[u8]) -> u16 {
    let mut csum = Checksum::from_header(old_csum);
    csum.sub_bytes(old);
    csum.add_bytes(new);
    csum.header()
}

/// The pseudo-header sum covering an IPv4 upper layer.
pub fn pseudo_header_v4(
    src: &[u8; 4],
    dst: &[u8; 4],
    proto: u8,
    len: u16,
) -> Checksum {
    let mut csum = Checksum::compute(src);
    csum.add_bytes(dst);
    csum.add_bytes(&[0, proto]);
    csum.add_bytes(&len.to_be_bytes());
    csum
}

/// The pseudo-header sum covering an IPv6 upper layer.
pub fn pseudo_header_v6(
    src: &[u8; 16],
    dst: &[u8; 16],
    next_hdr: u8,
    len: u32,
) -> Checksum {
    let mut csum = Checksum::compute(src);
    csum.add_bytes(dst);
    csum.add_bytes(&len.to_be_bytes());
    csum.add_bytes(&[0, 0, 0, next_hdr]);
    csum
}

/// A rolling one's complement checksum calculation.
///
/// This keeps the sum in a wide accumulator and delays folding the
/// carries until the finalized value is needed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    inner: u64,
}

impl Checksum {
    /// Creates a new checksum counter.
    pub fn new() -> Self {
        Self { inner: 0 }
    }

    /// Create a new rolling checksum, starting with the passed in
    /// `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        Self { inner: add_words(0, bytes) }
    }

    /// Start from a checksum as it is stored in a header, in order to
    /// update it incrementally.
    pub fn from_header(hc: u16) -> Self {
        Self { inner: (!hc) as u64 }
    }

    /// Update the sum by adding the contents of `bytes`.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner = add_words(self.inner, bytes);
    }

    /// Update the sum by subtracting the contents of `bytes`.
    ///
    /// This is useful for incrementally updating an existing checksum
    /// where only a portion of the bytes are being rewritten.
    pub fn sub_bytes(&mut self, bytes: &[u8]) {
        self.inner = sub_words(self.inner, bytes);
    }

    /// Add up all the accumulated carries and return the resulting
    /// sum, without the final complement.
    pub fn finalize(&self) -> u16 {
        !fold(self.inner)
    }

    /// The value to store in the header: the one's complement of
    /// [`Self::finalize`].
    pub fn header(&self) -> u16 {
        fold(self.inner)
    }
}

impl core::ops::Add for Checksum {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self { inner: self.inner + other.inner }
    }
}

impl core::ops::AddAssign for Checksum {
    fn add_assign(&mut self, other: Self) {
        self.inner += other.inner
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // The example header from RFC 1071 and countless tutorials.
    const IP4_HDR: [u8; 20] = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00,
        0x00, 0xc0, 0xa8, 0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
    ];

    #[test]
    fn known_header_checksum() {
        assert_eq!(full_checksum(&IP4_HDR), 0xb861);

        let mut hdr = IP4_HDR;
        hdr[10..12].copy_from_slice(&0xb861u16.to_be_bytes());
        assert!(verify(&hdr));
        hdr[10] ^= 0x01;
        assert!(!verify(&hdr));
    }

    #[test]
    fn fold_handles_wide_carries() {
        assert_eq!(fold(0), 0xFFFF);
        assert_eq!(fold(0xFFFF), 0);
        assert_eq!(fold(0x1_0000), 0xFFFE);
        assert_eq!(fold(u64::MAX), 0);
    }

    #[test]
    fn odd_length_pads_with_zero() {
        assert_eq!(full_checksum(&[0x12, 0x34, 0x56]), full_checksum(&[
            0x12, 0x34, 0x56, 0x00
        ]));
    }

    #[test]
    fn incremental_matches_full() {
        let mut hdr = IP4_HDR;
        let csum = full_checksum(&hdr);

        // Rewrite the destination address.
        let old = [hdr[16], hdr[17], hdr[18], hdr[19]];
        let new = [10, 0, 0, 1];
        hdr[16..20].copy_from_slice(&new);
        let inc = incremental_update_bytes(csum, &old, &new);
        assert_eq!(inc, full_checksum(&hdr));

        // Decrement the TTL.
        let old_word = u16::from_be_bytes([hdr[8], hdr[9]]);
        hdr[8] -= 1;
        let new_word = u16::from_be_bytes([hdr[8], hdr[9]]);
        let inc = incremental_update(inc, old_word, new_word);
        assert_eq!(inc, full_checksum(&hdr));
    }

    #[test]
    fn rolling_sum() {
        let mut csum = Checksum::compute(&IP4_HDR[..10]);
        csum.add_bytes(&IP4_HDR[10..]);
        assert_eq!(csum.header(), full_checksum(&IP4_HDR));
        assert_eq!(csum.finalize(), !full_checksum(&IP4_HDR));

        let mut split = Checksum::compute(&IP4_HDR[..12]);
        split += Checksum::compute(&IP4_HDR[12..]);
        assert_eq!(split, csum);
    }
}
