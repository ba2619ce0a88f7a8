//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};

// Thread-local scratch buffer used to encode packets and LSAs. It only
// ever grows, and encoding must not yield back to the scheduler while
// holding it.
thread_local!(
    pub static TLS_BUF: RefCell<BytesMut> =
        RefCell::new(BytesMut::with_capacity(65536))
);

// Extra read operations on `Bytes`.
pub trait BytesExt {
    /// Reads a big-endian unsigned 24-bit integer, advancing the
    /// position by 3.
    ///
    /// # Panics
    ///
    /// Panics when fewer than 3 bytes remain.
    fn get_u24(&mut self) -> u32;

    /// Non-panicking variant of `get_u24`.
    fn try_get_u24(&mut self) -> Result<u32, TryGetError>;

    /// Reads an IPv4 address, advancing the position by 4.
    ///
    /// # Panics
    ///
    /// Panics when fewer than 4 bytes remain.
    fn get_ipv4(&mut self) -> Ipv4Addr;

    /// Non-panicking variant of `get_ipv4`.
    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError>;

    /// Reads an IPv4 address, mapping the unspecified address to
    /// `None`. Advances the position by 4.
    ///
    /// # Panics
    ///
    /// Panics when fewer than 4 bytes remain.
    fn get_opt_ipv4(&mut self) -> Option<Ipv4Addr>;

    /// Non-panicking variant of `get_opt_ipv4`.
    fn try_get_opt_ipv4(&mut self) -> Result<Option<Ipv4Addr>, TryGetError>;

    /// Reads an IPv6 address, advancing the position by 16.
    ///
    /// # Panics
    ///
    /// Panics when fewer than 16 bytes remain.
    fn get_ipv6(&mut self) -> Ipv6Addr;

    /// Non-panicking variant of `get_ipv6`.
    fn try_get_ipv6(&mut self) -> Result<Ipv6Addr, TryGetError>;

    /// Reads an IPv6 address, mapping the unspecified address to
    /// `None`. Advances the position by 16.
    ///
    /// # Panics
    ///
    /// Panics when fewer than 16 bytes remain.
    fn get_opt_ipv6(&mut self) -> Option<Ipv6Addr>;

    /// Non-panicking variant of `get_opt_ipv6`.
    fn try_get_opt_ipv6(&mut self) -> Result<Option<Ipv6Addr>, TryGetError>;
}

// Extra write operations on `BytesMut`.
pub trait BytesMutExt {
    /// Writes a big-endian unsigned 24-bit integer (3 bytes).
    fn put_u24(&mut self, n: u32);

    /// Writes an IP address of either family (4 or 16 bytes).
    fn put_ip(&mut self, addr: &IpAddr);

    /// Writes an IPv4 address (4 bytes).
    fn put_ipv4(&mut self, addr: &Ipv4Addr);

    /// Writes an IPv6 address (16 bytes).
    fn put_ipv6(&mut self, addr: &Ipv6Addr);
}

// ===== impl Bytes =====

impl BytesExt for Bytes {
    fn get_u24(&mut self) -> u32 {
        self.try_get_u24().unwrap()
    }

    fn try_get_u24(&mut self) -> Result<u32, TryGetError> {
        let mut n = [0; 4];
        self.try_copy_to_slice(&mut n[1..=3])?;
        Ok(u32::from_be_bytes(n))
    }

    fn get_ipv4(&mut self) -> Ipv4Addr {
        self.try_get_ipv4().unwrap()
    }

    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError> {
        let bytes = self.try_get_u32()?;
        Ok(Ipv4Addr::from(bytes))
    }

    fn get_opt_ipv4(&mut self) -> Option<Ipv4Addr> {
        self.try_get_opt_ipv4().unwrap()
    }

    fn try_get_opt_ipv4(&mut self) -> Result<Option<Ipv4Addr>, TryGetError> {
        let bytes = self.try_get_u32()?;
        let addr = Ipv4Addr::from(bytes);
        Ok((!addr.is_unspecified()).then_some(addr))
    }

    fn get_ipv6(&mut self) -> Ipv6Addr {
        self.try_get_ipv6().unwrap()
    }

    fn try_get_ipv6(&mut self) -> Result<Ipv6Addr, TryGetError> {
        let bytes = self.try_get_u128()?;
        Ok(Ipv6Addr::from(bytes))
    }

    fn get_opt_ipv6(&mut self) -> Option<Ipv6Addr> {
        self.try_get_opt_ipv6().unwrap()
    }

    fn try_get_opt_ipv6(&mut self) -> Result<Option<Ipv6Addr>, TryGetError> {
        let bytes = self.try_get_u128()?;
        let addr = Ipv6Addr::from(bytes);
        Ok((!addr.is_unspecified()).then_some(addr))
    }
}

// ===== impl BytesMut =====

impl BytesMutExt for BytesMut {
    fn put_u24(&mut self, n: u32) {
        let n = n.to_be_bytes();
        self.put_slice(&n[1..=3]);
    }

    fn put_ip(&mut self, addr: &IpAddr) {
        match addr {
            IpAddr::V4(addr) => self.put_slice(&addr.octets()),
            IpAddr::V6(addr) => self.put_slice(&addr.octets()),
        }
    }

    fn put_ipv4(&mut self, addr: &Ipv4Addr) {
        self.put_u32((*addr).into())
    }

    fn put_ipv6(&mut self, addr: &Ipv6Addr) {
        self.put_slice(&addr.octets())
    }
}
