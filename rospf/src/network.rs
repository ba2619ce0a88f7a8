//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock as Lazy;

use derive_new::new;
use rospf_utils::ip::{IpAddrKind, IpNetworkKind};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::version::{Ospfv2, Ospfv3, Version};

// OSPF IP protocol number.
pub const OSPF_IP_PROTO: i32 = 89;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum MulticastAddr {
    AllSpfRtrs,
    AllDrRtrs,
}

// Destination of an outgoing packet. Packet I/O is a collaborator: the
// messages produced here are consumed by whatever owns the raw sockets.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
#[serde(bound = "A: serde::de::DeserializeOwned + serde::Serialize")]
pub struct SendDestination<A: IpAddrKind> {
    pub ifindex: u32,
    pub addrs: SmallVec<[A; 4]>,
}

// Addressing details that differ between the two OSPF versions:
// transport address types and the well-known multicast groups.
pub trait NetworkVersion<V: Version> {
    type NetIpAddr: IpAddrKind;
    type NetIpNetwork: IpNetworkKind<Self::NetIpAddr>;

    // Return the IP address of the specified OSPF multicast group.
    fn multicast_addr(addr: MulticastAddr) -> &'static Self::NetIpAddr;
}

// ===== impl Ospfv2 =====

static ALL_SPF_RTRS_V2: Lazy<Ipv4Addr> =
    Lazy::new(|| Ipv4Addr::new(224, 0, 0, 5));
static ALL_DR_RTRS_V2: Lazy<Ipv4Addr> =
    Lazy::new(|| Ipv4Addr::new(224, 0, 0, 6));

impl NetworkVersion<Self> for Ospfv2 {
    type NetIpAddr = Ipv4Addr;
    type NetIpNetwork = ipnetwork::Ipv4Network;

    fn multicast_addr(addr: MulticastAddr) -> &'static Ipv4Addr {
        match addr {
            MulticastAddr::AllSpfRtrs => &ALL_SPF_RTRS_V2,
            MulticastAddr::AllDrRtrs => &ALL_DR_RTRS_V2,
        }
    }
}

// ===== impl Ospfv3 =====

static ALL_SPF_RTRS_V3: Lazy<Ipv6Addr> =
    Lazy::new(|| "ff02::5".parse().unwrap());
static ALL_DR_RTRS_V3: Lazy<Ipv6Addr> =
    Lazy::new(|| "ff02::6".parse().unwrap());

impl NetworkVersion<Self> for Ospfv3 {
    type NetIpAddr = Ipv6Addr;
    type NetIpNetwork = ipnetwork::Ipv6Network;

    fn multicast_addr(addr: MulticastAddr) -> &'static Ipv6Addr {
        match addr {
            MulticastAddr::AllSpfRtrs => &ALL_SPF_RTRS_V3,
            MulticastAddr::AllDrRtrs => &ALL_DR_RTRS_V3,
        }
    }
}
