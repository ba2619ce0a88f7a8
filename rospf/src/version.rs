//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::{IpNetwork, Ipv4Network};
use rospf_utils::ip::{IpAddrKind, IpNetworkKind};
use rospf_utils::protocol::Protocol;

use crate::area::AreaVersion;
use crate::instance::InstanceVersion;
use crate::interface::InterfaceVersion;
use crate::lsdb::LsdbVersion;
use crate::neighbor::NeighborVersion;
use crate::network::NetworkVersion;
use crate::packet::PacketVersion;
use crate::packet::lsa::LsaVersion;
use crate::spf::SpfVersion;

// Umbrella trait tying together everything that differs between the two
// OSPF versions. The engine is written against this trait; `Ospfv2` and
// `Ospfv3` are zero-sized markers selecting one behavior set at compile
// time.
//
// Each supertrait groups the hooks of one subsystem: packet and LSA
// codecs, LSDB origination rules, FSM details, SPF helpers, and so on.
pub trait Version:
    AreaVersion<Self>
    + InstanceVersion<Self>
    + InterfaceVersion<Self>
    + LsaVersion<Self>
    + LsdbVersion<Self>
    + NeighborVersion<Self>
    + NetworkVersion<Self>
    + PacketVersion<Self>
    + SpfVersion<Self>
    + Clone
    + Default
    + Eq
    + PartialEq
    + std::fmt::Debug
    + Send
    + Sync
    + 'static
{
    const PROTOCOL: Protocol;

    // Address and prefix types routed by this OSPF version.
    type IpAddr: IpAddrKind;
    type IpNetwork: IpNetworkKind<Self::IpAddr>;
}

// OSPF version 2 (RFC 2328): IPv4 routing, IPv4 transport.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ospfv2();

// OSPF version 3 (RFC 5340): IPv6 (and, with RFC 5838 address families,
// IPv4) routing over IPv6 transport.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Ospfv3();

// ===== impl Ospfv2 =====

impl Version for Ospfv2 {
    const PROTOCOL: Protocol = Protocol::Ospfv2;

    type IpAddr = Ipv4Addr;
    type IpNetwork = Ipv4Network;
}

// ===== impl Ospfv3 =====

impl Version for Ospfv3 {
    const PROTOCOL: Protocol = Protocol::Ospfv3;

    type IpAddr = IpAddr;
    type IpNetwork = IpNetwork;
}
