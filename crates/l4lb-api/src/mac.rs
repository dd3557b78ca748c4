// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;
use core::ops::Deref;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// A MAC address.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Hash,
)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr {
    inner: [u8; 6],
}

impl MacAddr {
    pub const BROADCAST: Self = Self { inner: [0xFF; 6] };
    pub const ZERO: Self = Self { inner: [0x00; 6] };

    /// Return the bytes of the MAC address.
    #[inline]
    pub fn bytes(&self) -> [u8; 6] {
        self.inner
    }

    pub const fn from_const(bytes: [u8; 6]) -> Self {
        Self { inner: bytes }
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self { inner: bytes }
    }
}

impl AsRef<[u8]> for MacAddr {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl Deref for MacAddr {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut n = 0;

        for octet in s.split(':') {
            if n == bytes.len() {
                return Err(format!("too many octets: {s}"));
            }

            if octet.is_empty() || octet.len() > 2 {
                return Err(format!("bad octet: {octet}"));
            }

            bytes[n] = u8::from_str_radix(octet, 16)
                .map_err(|_| format!("bad octet: {octet}"))?;
            n += 1;
        }

        if n != bytes.len() {
            return Err(format!("incorrect number of bytes: {n}"));
        }

        Ok(MacAddr { inner: bytes })
    }
}

impl TryFrom<String> for MacAddr {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> String {
        mac.to_string()
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.inner[0],
            self.inner[1],
            self.inner[2],
            self.inner[3],
            self.inner[4],
            self.inner[5]
        )
    }
}

impl Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacAddr {{ inner: {self} }}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_mac() {
        let mac: MacAddr = "02:00:00:00:00:0a".parse().unwrap();
        assert_eq!(mac.bytes(), [0x02, 0, 0, 0, 0, 0x0a]);
        assert_eq!(mac.to_string(), "02:00:00:00:00:0A");

        assert!("02:00:00:00:00".parse::<MacAddr>().is_err());
        assert!("02:00:00:00:00:00:00".parse::<MacAddr>().is_err());
        assert!("02:00:00:00:00:zz".parse::<MacAddr>().is_err());
        assert!("02:00:00:00:00:100".parse::<MacAddr>().is_err());
    }
}
