//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, IpNetworkError, Ipv4Network, Ipv6Network};
use num_derive::{FromPrimitive, ToPrimitive};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// Address Family identifier.
//
// IANA registry:
// http://www.iana.org/assignments/address-family-numbers
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum AddressFamily {
    Ipv4 = 1,
    Ipv6 = 2,
}

// Extra operations on IpAddr.
pub trait IpAddrExt {
    // Size of the address in bytes.
    fn length(&self) -> usize;

    // Usable as an interface or neighbor address.
    fn is_usable(&self) -> bool;

    // The all-zeroes address of the given family.
    fn unspecified(af: AddressFamily) -> IpAddr;
}

// Extra operations on Ipv4Addr.
pub trait Ipv4AddrExt {
    const LENGTH: usize;

    // Usable as an interface or neighbor address.
    fn is_usable(&self) -> bool;
}

// Extra operations on Ipv6Addr.
pub trait Ipv6AddrExt {
    const LENGTH: usize;

    // Usable as an interface or neighbor address.
    fn is_usable(&self) -> bool;
}

// Extra operations on Ipv4Network.
pub trait Ipv4NetworkExt {
    const MAX_PREFIXLEN: u8;

    // Zeroes the host bits.
    #[must_use]
    fn apply_mask(&self) -> Ipv4Network;

    // Full-length (host) prefix?
    fn is_host_prefix(&self) -> bool;

    // Returns true if this is a routable network.
    fn is_routable(&self) -> bool;
}

// Extra operations on Ipv6Network.
pub trait Ipv6NetworkExt {
    const MAX_PREFIXLEN: u8;

    // Zeroes the host bits.
    #[must_use]
    fn apply_mask(&self) -> Ipv6Network;

    // Full-length (host) prefix?
    fn is_host_prefix(&self) -> bool;

    // Returns true if this is a routable network.
    fn is_routable(&self) -> bool;
}

// Object-safe-free kind trait allowing code to be generic over IPv4 and
// IPv6 addresses.
pub trait IpAddrKind:
    std::fmt::Debug
    + std::fmt::Display
    + Clone
    + Copy
    + Eq
    + std::hash::Hash
    + Ord
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + DeserializeOwned
    + Serialize
    + Into<IpAddr>
{
    fn address_family(&self) -> AddressFamily;

    fn get(addr: IpAddr) -> Option<Self>;

    fn is_usable(&self) -> bool;

    fn unspecified() -> Self;
}

// Kind trait allowing code to be generic over IPv4 and IPv6 networks.
pub trait IpNetworkKind<I: IpAddrKind>:
    std::fmt::Debug
    + std::fmt::Display
    + Clone
    + Copy
    + Eq
    + std::hash::Hash
    + Ord
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + DeserializeOwned
    + Serialize
    + Into<IpNetwork>
{
    fn new(addr: I, prefix: u8) -> Result<Self, IpNetworkError>;

    fn default(af: AddressFamily) -> Self;

    fn address_family(&self) -> AddressFamily;

    fn get(prefix: IpNetwork) -> Option<Self>;

    fn contains(&self, ip: I) -> bool;

    fn is_supernet_of(self, other: Self) -> bool;

    fn ip(&self) -> I;

    fn mask(&self) -> I;

    fn prefix(&self) -> u8;

    #[must_use]
    fn apply_mask(&self) -> Self;

    fn is_routable(&self) -> bool;
}

// ===== impl AddressFamily =====

impl AddressFamily {
    pub fn addr_len(&self) -> usize {
        match self {
            AddressFamily::Ipv4 => Ipv4Addr::LENGTH,
            AddressFamily::Ipv6 => Ipv6Addr::LENGTH,
        }
    }

    pub fn max_prefixlen(&self) -> u8 {
        match self {
            AddressFamily::Ipv4 => Ipv4Network::MAX_PREFIXLEN,
            AddressFamily::Ipv6 => Ipv6Network::MAX_PREFIXLEN,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

// ===== impl IpAddr =====

impl IpAddrExt for IpAddr {
    fn length(&self) -> usize {
        match self {
            IpAddr::V4(_) => Ipv4Addr::LENGTH,
            IpAddr::V6(_) => Ipv6Addr::LENGTH,
        }
    }

    fn is_usable(&self) -> bool {
        match self {
            IpAddr::V4(addr) => Ipv4AddrExt::is_usable(addr),
            IpAddr::V6(addr) => Ipv6AddrExt::is_usable(addr),
        }
    }

    fn unspecified(af: AddressFamily) -> IpAddr {
        match af {
            AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

impl IpAddrKind for IpAddr {
    fn address_family(&self) -> AddressFamily {
        match self {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    fn get(addr: IpAddr) -> Option<Self> {
        Some(addr)
    }

    fn is_usable(&self) -> bool {
        IpAddrExt::is_usable(self)
    }

    fn unspecified() -> Self {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    }
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    const LENGTH: usize = 4;

    fn is_usable(&self) -> bool {
        !self.is_unspecified()
            && !self.is_loopback()
            && !self.is_broadcast()
            && !self.is_multicast()
    }
}

impl IpAddrKind for Ipv4Addr {
    fn address_family(&self) -> AddressFamily {
        AddressFamily::Ipv4
    }

    fn get(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V4(addr) => Some(addr),
            _ => None,
        }
    }

    fn is_usable(&self) -> bool {
        Ipv4AddrExt::is_usable(self)
    }

    fn unspecified() -> Self {
        Ipv4Addr::UNSPECIFIED
    }
}

// ===== impl Ipv6Addr =====

impl Ipv6AddrExt for Ipv6Addr {
    const LENGTH: usize = 16;

    fn is_usable(&self) -> bool {
        !self.is_unspecified() && !self.is_loopback() && !self.is_multicast()
    }
}

impl IpAddrKind for Ipv6Addr {
    fn address_family(&self) -> AddressFamily {
        AddressFamily::Ipv6
    }

    fn get(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V6(addr) => Some(addr),
            _ => None,
        }
    }

    fn is_usable(&self) -> bool {
        Ipv6AddrExt::is_usable(self)
    }

    fn unspecified() -> Self {
        Ipv6Addr::UNSPECIFIED
    }
}

// ===== impl IpNetwork =====

impl IpNetworkKind<IpAddr> for IpNetwork {
    fn new(addr: IpAddr, prefix: u8) -> Result<Self, IpNetworkError> {
        IpNetwork::new(addr, prefix)
    }

    fn default(af: AddressFamily) -> Self {
        match af {
            AddressFamily::Ipv4 => IpNetwork::V4(
                <Ipv4Network as IpNetworkKind<Ipv4Addr>>::default(af),
            ),
            AddressFamily::Ipv6 => IpNetwork::V6(
                <Ipv6Network as IpNetworkKind<Ipv6Addr>>::default(af),
            ),
        }
    }

    fn address_family(&self) -> AddressFamily {
        match self {
            IpNetwork::V4(_) => AddressFamily::Ipv4,
            IpNetwork::V6(_) => AddressFamily::Ipv6,
        }
    }

    fn get(prefix: IpNetwork) -> Option<Self> {
        Some(prefix)
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (IpNetwork::V4(prefix), IpAddr::V4(ip)) => prefix.contains(ip),
            (IpNetwork::V6(prefix), IpAddr::V6(ip)) => prefix.contains(ip),
            _ => false,
        }
    }

    fn is_supernet_of(self, other: Self) -> bool {
        match (self, other) {
            (IpNetwork::V4(prefix), IpNetwork::V4(other)) => {
                prefix.is_supernet_of(other)
            }
            (IpNetwork::V6(prefix), IpNetwork::V6(other)) => {
                prefix.is_supernet_of(other)
            }
            _ => false,
        }
    }

    fn ip(&self) -> IpAddr {
        match self {
            IpNetwork::V4(prefix) => IpAddr::V4(prefix.ip()),
            IpNetwork::V6(prefix) => IpAddr::V6(prefix.ip()),
        }
    }

    fn mask(&self) -> IpAddr {
        match self {
            IpNetwork::V4(prefix) => IpAddr::V4(prefix.mask()),
            IpNetwork::V6(prefix) => IpAddr::V6(prefix.mask()),
        }
    }

    fn prefix(&self) -> u8 {
        match self {
            IpNetwork::V4(prefix) => prefix.prefix(),
            IpNetwork::V6(prefix) => prefix.prefix(),
        }
    }

    fn apply_mask(&self) -> Self {
        match self {
            IpNetwork::V4(prefix) => IpNetwork::V4(Ipv4NetworkExt::apply_mask(prefix)),
            IpNetwork::V6(prefix) => IpNetwork::V6(Ipv6NetworkExt::apply_mask(prefix)),
        }
    }

    fn is_routable(&self) -> bool {
        match self {
            IpNetwork::V4(prefix) => Ipv4NetworkExt::is_routable(prefix),
            IpNetwork::V6(prefix) => Ipv6NetworkExt::is_routable(prefix),
        }
    }
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    const MAX_PREFIXLEN: u8 = 32;

    fn apply_mask(&self) -> Ipv4Network {
        Ipv4Network::new(self.network(), self.prefix()).unwrap()
    }

    fn is_host_prefix(&self) -> bool {
        self.prefix() == Self::MAX_PREFIXLEN
    }

    fn is_routable(&self) -> bool {
        let addr = self.ip();
        !addr.is_loopback() && !addr.is_link_local() && !addr.is_multicast()
    }
}

impl IpNetworkKind<Ipv4Addr> for Ipv4Network {
    fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, IpNetworkError> {
        Ipv4Network::new(addr, prefix)
    }

    fn default(_af: AddressFamily) -> Self {
        Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap()
    }

    fn address_family(&self) -> AddressFamily {
        AddressFamily::Ipv4
    }

    fn get(prefix: IpNetwork) -> Option<Self> {
        match prefix {
            IpNetwork::V4(prefix) => Some(prefix),
            _ => None,
        }
    }

    fn contains(&self, ip: Ipv4Addr) -> bool {
        Ipv4Network::contains(*self, ip)
    }

    fn is_supernet_of(self, other: Self) -> bool {
        Ipv4Network::is_supernet_of(self, other)
    }

    fn ip(&self) -> Ipv4Addr {
        Ipv4Network::ip(*self)
    }

    fn mask(&self) -> Ipv4Addr {
        Ipv4Network::mask(*self)
    }

    fn prefix(&self) -> u8 {
        Ipv4Network::prefix(*self)
    }

    fn apply_mask(&self) -> Self {
        Ipv4NetworkExt::apply_mask(self)
    }

    fn is_routable(&self) -> bool {
        Ipv4NetworkExt::is_routable(self)
    }
}

// ===== impl Ipv6Network =====

impl Ipv6NetworkExt for Ipv6Network {
    const MAX_PREFIXLEN: u8 = 128;

    fn apply_mask(&self) -> Ipv6Network {
        Ipv6Network::new(self.network(), self.prefix()).unwrap()
    }

    fn is_host_prefix(&self) -> bool {
        self.prefix() == Self::MAX_PREFIXLEN
    }

    fn is_routable(&self) -> bool {
        let addr = self.ip();
        !addr.is_loopback() && !addr.is_multicast()
            && (addr.segments()[0] & 0xffc0) != 0xfe80
    }
}

impl IpNetworkKind<Ipv6Addr> for Ipv6Network {
    fn new(addr: Ipv6Addr, prefix: u8) -> Result<Self, IpNetworkError> {
        Ipv6Network::new(addr, prefix)
    }

    fn default(_af: AddressFamily) -> Self {
        Ipv6Network::new(Ipv6Addr::UNSPECIFIED, 0).unwrap()
    }

    fn address_family(&self) -> AddressFamily {
        AddressFamily::Ipv6
    }

    fn get(prefix: IpNetwork) -> Option<Self> {
        match prefix {
            IpNetwork::V6(prefix) => Some(prefix),
            _ => None,
        }
    }

    fn contains(&self, ip: Ipv6Addr) -> bool {
        Ipv6Network::contains(self, ip)
    }

    fn is_supernet_of(self, other: Self) -> bool {
        Ipv6Network::is_supernet_of(self, other)
    }

    fn ip(&self) -> Ipv6Addr {
        Ipv6Network::ip(self)
    }

    fn mask(&self) -> Ipv6Addr {
        Ipv6Network::mask(self)
    }

    fn prefix(&self) -> u8 {
        Ipv6Network::prefix(self)
    }

    fn apply_mask(&self) -> Self {
        Ipv6NetworkExt::apply_mask(self)
    }

    fn is_routable(&self) -> bool {
        Ipv6NetworkExt::is_routable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_addresses() {
        assert!(!Ipv4AddrExt::is_usable(&Ipv4Addr::UNSPECIFIED));
        assert!(!Ipv4AddrExt::is_usable(&Ipv4Addr::BROADCAST));
        assert!(!Ipv4AddrExt::is_usable(&Ipv4Addr::new(127, 0, 0, 1)));
        assert!(Ipv4AddrExt::is_usable(&Ipv4Addr::new(10, 0, 1, 1)));
        assert!(!Ipv6AddrExt::is_usable(&Ipv6Addr::UNSPECIFIED));
        assert!(Ipv6AddrExt::is_usable(&"fe80::1".parse().unwrap()));
    }

    #[test]
    fn apply_mask() {
        let prefix: Ipv4Network = "10.0.1.55/24".parse().unwrap();
        let masked = Ipv4NetworkExt::apply_mask(&prefix);
        assert_eq!(masked.ip(), Ipv4Addr::new(10, 0, 1, 0));
        assert_eq!(masked.prefix(), 24);
    }
}
