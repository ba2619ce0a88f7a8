//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{error, warn, warn_span};

use crate::collections::{AreaId, InterfaceId, LsaEntryId, NeighborId};
use crate::interface::ism;
use crate::neighbor::nsm;
use crate::packet::PacketType;
use crate::packet::error::DecodeError;
use crate::spf;
use crate::version::Version;

// Process exit codes for unrecoverable link-state database errors.
pub mod fatal_code {
    pub const LSDB_DUPLICATE_KEY: i32 = 20;
    pub const LSDB_CORRUPT_BINS: i32 = 21;
    pub const LSDB_CORRUPT_TREE: i32 = 22;
}

// OSPF errors.
#[derive(Debug)]
pub enum Error<V: Version> {
    // Inter-task communication
    AreaIdNotFound(AreaId),
    InterfaceIdNotFound(InterfaceId),
    NeighborIdNotFound(NeighborId),
    LsaEntryIdNotFound(LsaEntryId),
    // Packet input
    InvalidSrcAddr(V::NetIpAddr),
    InvalidDstAddr(V::NetIpAddr),
    PacketDecodeError(DecodeError),
    UnknownNeighbor(V::NetIpAddr, Ipv4Addr),
    PacketAuthInvalidSeqno(V::NetIpAddr, u64),
    InterfaceCfgError(String, V::NetIpAddr, PacketType, InterfaceCfgError),
    DbDescReject(Ipv4Addr, nsm::State),
    // SPF
    SpfRootNotFound(Ipv4Addr),
    SpfNexthopCalcError(V::VertexId),
    // Other
    IsmUnexpectedEvent(ism::State, ism::Event),
    NsmUnexpectedEvent(Ipv4Addr, nsm::State, nsm::Event),
    SpfDelayUnexpectedEvent(spf::fsm::State, spf::fsm::Event),
}

// OSPF interface configuration errors.
#[derive(Debug)]
pub enum InterfaceCfgError {
    AfBitClear,
    AreaIdMismatch(Ipv4Addr, Ipv4Addr),
    HelloMaskMismatch(Ipv4Addr, Ipv4Addr),
    HelloIntervalMismatch(u16, u16),
    DeadIntervalMismatch(u32, u32),
    ExternalRoutingCapabilityMismatch(bool),
    MtuMismatch(u16),
    DuplicateRouterId(Ipv4Addr),
}

// OSPF configuration rejection reasons. The previous value of the field is
// always retained.
#[derive(Debug)]
pub enum ConfigError {
    AreaNotFound(Ipv4Addr),
    InterfaceNotFound(String),
    NssaBackbone,
    VirtualLinkNotBackbone(Ipv4Addr),
    InvalidValue(&'static str),
}

// ===== impl Error =====

impl<V> Error<V>
where
    V: Version,
{
    pub(crate) fn log(&self) {
        match self {
            Error::AreaIdNotFound(area_id) => {
                warn!(?area_id, "{}", self);
            }
            Error::InterfaceIdNotFound(iface_id) => {
                warn!(?iface_id, "{}", self);
            }
            Error::NeighborIdNotFound(nbr_id) => {
                warn!(?nbr_id, "{}", self);
            }
            Error::LsaEntryIdNotFound(entry_id) => {
                warn!(?entry_id, "{}", self);
            }
            Error::InvalidSrcAddr(addr) => {
                warn!(address = %addr, "{}", self);
            }
            Error::InvalidDstAddr(addr) => {
                warn!(address = %addr, "{}", self);
            }
            Error::PacketDecodeError(error) => {
                warn!(%error, "{}", self);
            }
            Error::UnknownNeighbor(source, router_id) => {
                warn!(%source, %router_id, "{}", self);
            }
            Error::PacketAuthInvalidSeqno(source, seqno) => {
                warn!(%source, %seqno, "{}", self);
            }
            Error::InterfaceCfgError(iface, source, _, error) => {
                warn_span!("interface", name = %iface, %source).in_scope(|| {
                    error.log();
                })
            }
            Error::DbDescReject(router_id, state) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn!(?state, "{}", self);
                })
            }
            Error::SpfRootNotFound(area_id) => {
                warn!(%area_id, "{}", self);
            }
            Error::SpfNexthopCalcError(vertex_id) => {
                warn!(?vertex_id, "{}", self);
            }
            Error::IsmUnexpectedEvent(state, event) => warn_span!("fsm")
                .in_scope(|| {
                    warn!(?state, ?event, "{}", self);
                }),
            Error::NsmUnexpectedEvent(router_id, state, event) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn_span!("fsm").in_scope(|| {
                        warn!(?state, ?event, "{}", self);
                    })
                })
            }
            Error::SpfDelayUnexpectedEvent(state, event) => {
                warn!(?state, ?event, "{}", self);
            }
        }
    }
}

impl<V> std::fmt::Display for Error<V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AreaIdNotFound(..) => {
                write!(f, "area ID not found")
            }
            Error::InterfaceIdNotFound(..) => {
                write!(f, "interface ID not found")
            }
            Error::NeighborIdNotFound(..) => {
                write!(f, "neighbor ID not found")
            }
            Error::LsaEntryIdNotFound(..) => {
                write!(f, "LSA entry ID not found")
            }
            Error::InvalidSrcAddr(..) => {
                write!(f, "invalid source address")
            }
            Error::InvalidDstAddr(..) => {
                write!(f, "invalid destination address")
            }
            Error::PacketDecodeError(..) => {
                write!(f, "failed to decode packet")
            }
            Error::UnknownNeighbor(..) => {
                write!(f, "unknown neighbor")
            }
            Error::PacketAuthInvalidSeqno(..) => {
                write!(f, "authentication failed: decreasing sequence number")
            }
            Error::InterfaceCfgError(_, _, _, error) => error.fmt(f),
            Error::DbDescReject(..) => {
                write!(f, "database description packet rejected")
            }
            Error::SpfRootNotFound(..) => {
                write!(f, "SPF root not found")
            }
            Error::SpfNexthopCalcError(..) => {
                write!(f, "failed to calculate nexthop address")
            }
            Error::IsmUnexpectedEvent(..) => {
                write!(f, "unexpected event")
            }
            Error::NsmUnexpectedEvent(..) => {
                write!(f, "unexpected event")
            }
            Error::SpfDelayUnexpectedEvent(..) => {
                write!(f, "unexpected SPF Delay FSM event")
            }
        }
    }
}

impl<V> std::error::Error for Error<V> where V: Version {}

// ===== impl InterfaceCfgError =====

impl InterfaceCfgError {
    pub(crate) fn log(&self) {
        match self {
            InterfaceCfgError::AfBitClear => {
                warn!("{}", self);
            }
            InterfaceCfgError::AreaIdMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::HelloMaskMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::HelloIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::DeadIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::ExternalRoutingCapabilityMismatch(e_bit) => {
                warn!(%e_bit, "{}", self);
            }
            InterfaceCfgError::MtuMismatch(mtu) => {
                warn!(%mtu, "{}", self);
            }
            InterfaceCfgError::DuplicateRouterId(router_id) => {
                warn!(%router_id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for InterfaceCfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceCfgError::AfBitClear => {
                write!(f, "AF-bit is clear for non-default address family")
            }
            InterfaceCfgError::AreaIdMismatch(..) => {
                write!(f, "area ID mismatch")
            }
            InterfaceCfgError::HelloMaskMismatch(..) => {
                write!(f, "network mask mismatch")
            }
            InterfaceCfgError::HelloIntervalMismatch(..) => {
                write!(f, "hello interval mismatch")
            }
            InterfaceCfgError::DeadIntervalMismatch(..) => {
                write!(f, "dead interval mismatch")
            }
            InterfaceCfgError::ExternalRoutingCapabilityMismatch(..) => {
                write!(f, "external routing capability mismatch")
            }
            InterfaceCfgError::MtuMismatch(..) => {
                write!(f, "MTU mismatch")
            }
            InterfaceCfgError::DuplicateRouterId(..) => {
                write!(f, "duplicate Router ID")
            }
        }
    }
}

impl std::error::Error for InterfaceCfgError {}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::AreaNotFound(area_id) => {
                write!(f, "area {} not found", area_id)
            }
            ConfigError::InterfaceNotFound(ifname) => {
                write!(f, "interface {} not found", ifname)
            }
            ConfigError::NssaBackbone => {
                write!(f, "the backbone area can't be configured as NSSA")
            }
            ConfigError::VirtualLinkNotBackbone(area_id) => {
                write!(
                    f,
                    "virtual links require the backbone area (transit area {})",
                    area_id
                )
            }
            ConfigError::InvalidValue(field) => {
                write!(f, "invalid value for {}", field)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ===== global functions =====

// Terminates the process after an unrecoverable database inconsistency.
// Each reason carries a distinguishable exit code.
pub(crate) fn fatal<V>(code: i32, msg: &str) -> !
where
    V: Version,
{
    error!(protocol = %V::PROTOCOL, code, "{}", msg);
    std::process::exit(code);
}
