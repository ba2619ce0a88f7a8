//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::gr::GrExitReason;
use crate::interface::{Interface, ism};
use crate::neighbor::{NeighborNetId, nsm};
use crate::packet::Packet;
use crate::packet::error::LsaValidationError;
use crate::packet::lsa::GrReason;
use crate::spf;
use crate::version::Version;

// OSPF debug messages.
#[derive(Debug)]
pub enum Debug<'a, V: Version> {
    // Instances
    InstanceCreate,
    InstanceDelete,
    InstanceStart,
    InstanceStop(InstanceInactiveReason),
    // Interfaces
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceStart(&'a str),
    InterfaceStop(&'a str, InterfaceInactiveReason),
    IsmEvent(&'a str, &'a ism::State, &'a ism::Event),
    IsmTransition(&'a str, &'a ism::State, &'a ism::State),
    IsmDrElection(
        &'a str,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
        Option<NeighborNetId>,
    ),
    // Neighbors
    NeighborCreate(Ipv4Addr),
    NeighborDelete(Ipv4Addr),
    NsmEvent(Ipv4Addr, &'a nsm::State, &'a nsm::Event),
    NsmTransition(Ipv4Addr, &'a nsm::State, &'a nsm::State),
    NsmRxmtWatchdog(Ipv4Addr, u16),
    // Network
    PacketRx(
        &'a Interface<V>,
        &'a V::NetIpAddr,
        &'a V::NetIpAddr,
        &'a Packet<V>,
    ),
    PacketTx(u32, &'a V::NetIpAddr, &'a Packet<V>),
    PacketRxIgnore(Ipv4Addr, &'a nsm::State),
    // Flooding
    QuestionableAck(Ipv4Addr, &'a V::LsaHdr),
    LsaDiscard(Ipv4Addr, &'a V::LsaHdr, &'a LsaValidationError),
    LsaMinArrivalDiscard(Ipv4Addr, &'a V::LsaHdr),
    LsaSelfOriginated(Ipv4Addr, &'a V::LsaHdr),
    // LSDB maintenance
    LsaInstall(&'a V::LsaHdr),
    LsaOriginate(&'a V::LsaHdr),
    LsaOriginateMinInterval(&'a V::LsaHdr),
    LsaOriginateBacklogged(&'a V::IpNetwork),
    LsaFlush(&'a V::LsaHdr, LsaFlushReason),
    LsaRefresh(&'a V::LsaHdr),
    LsdbOverflowEnter(u32),
    LsdbOverflowExit,
    // SPF
    SpfDelayFsmEvent(&'a spf::fsm::State, &'a spf::fsm::Event),
    SpfDelayFsmTransition(&'a spf::fsm::State, &'a spf::fsm::State),
    SpfNetworkUnreachableAbr(&'a V::IpNetwork, Ipv4Addr),
    SpfRouterUnreachableAbr(&'a Ipv4Addr, Ipv4Addr),
    SpfUnreachableAsbr(&'a V::IpNetwork, Ipv4Addr),
    SpfUnresolvableFwdAddr(&'a V::IpNetwork, &'a V::IpAddr),
    // Graceful Restart
    GrHelperReject(Ipv4Addr, GrRejectReason),
    GrHelperEnter(Ipv4Addr, GrReason, u32),
    GrHelperExit(Ipv4Addr, GrExitReason),
    GrRestartEnter(u32),
    GrRestartExit(GrExitReason),
}

// Reason why an OSPF instance is inactive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstanceInactiveReason {
    AdminDown,
    MissingRouterId,
    Resetting,
}

// Reason why OSPF is inactive on an interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum InterfaceInactiveReason {
    InstanceDown,
    AdminDown,
    OperationalDown,
    MissingIfindex,
    MissingMtu,
    MissingIpv4Address,
    MissingLinkLocalAddress,
    VirtualLinkUnresolved,
    LoopedBack,
    Resetting,
}

// Reason why a SeqNoMismatch event was generated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SeqNoMismatchReason {
    InconsistentFlags,
    InconsistentOptions,
    InconsistentSeqNo,
    UnexpectedDbDesc,
    InvalidLsaType,
}

// Reason why an LSA is being flushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaFlushReason {
    Expiry,
    PrematureAging,
}

// Reason why the router failed to enter the helper mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum GrRejectReason {
    NeighborNotFull,
    TopologyChange,
    GracePeriodExpired,
    HelperDisabled,
}

// ===== impl Debug =====

impl<'a, V> Debug<'a, V>
where
    V: Version,
{
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate
            | Debug::InstanceDelete
            | Debug::InstanceStart => {
                debug!("{}", self);
            }
            Debug::InstanceStop(reason) => {
                debug!(%reason, "{}", self);
            }
            Debug::InterfaceCreate(name)
            | Debug::InterfaceDelete(name)
            | Debug::InterfaceStart(name) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::InterfaceStop(name, reason) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%reason, "{}", self);
                })
            }
            Debug::IsmEvent(name, state, event) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    })
                })
            }
            Debug::IsmTransition(name, old_state, new_state) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                })
            }
            Debug::IsmDrElection(name, old_dr, new_dr, old_bdr, new_bdr) => {
                debug_span!("interface", %name).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(
                            ?old_dr,
                            ?new_dr,
                            ?old_bdr,
                            ?new_bdr,
                            "{}",
                            self
                        );
                    })
                })
            }
            Debug::NeighborCreate(router_id)
            | Debug::NeighborDelete(router_id) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::NsmEvent(router_id, state, event) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    })
                })
            }
            Debug::NsmTransition(router_id, old_state, new_state) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                })
            }
            Debug::NsmRxmtWatchdog(router_id, rounds) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(%rounds, "{}", self);
                })
            }
            Debug::PacketRx(iface, src, dst, packet) => {
                debug_span!("network").in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data = serde_json::to_string(&packet).unwrap();
                        debug!(interface = %iface.name, %src, %dst, %data, "{}", self);
                    })
                })
            }
            Debug::PacketTx(ifindex, addr, packet) => {
                // Parent span(s): network:output
                let data = serde_json::to_string(&packet).unwrap();
                debug!(%ifindex, %addr, %data, "{}", self);
            }
            Debug::PacketRxIgnore(router_id, state) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?state, "{}", self);
                })
            }
            Debug::QuestionableAck(router_id, lsa_hdr)
            | Debug::LsaMinArrivalDiscard(router_id, lsa_hdr)
            | Debug::LsaSelfOriginated(router_id, lsa_hdr) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?lsa_hdr, "{}", self);
                })
            }
            Debug::LsaDiscard(router_id, lsa_hdr, error) => {
                debug_span!("neighbor", %router_id, %error).in_scope(|| {
                    debug!(?lsa_hdr, "{}", self);
                })
            }
            Debug::LsaInstall(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaOriginateMinInterval(lsa_hdr)
            | Debug::LsaRefresh(lsa_hdr) => {
                debug!(?lsa_hdr, "{}", self);
            }
            Debug::LsaOriginateBacklogged(prefix) => {
                debug!(%prefix, "{}", self);
            }
            Debug::LsaFlush(lsa_hdr, reason) => {
                debug!(?lsa_hdr, %reason, "{}", self);
            }
            Debug::LsdbOverflowEnter(count) => {
                debug!(%count, "{}", self);
            }
            Debug::LsdbOverflowExit => {
                debug!("{}", self);
            }
            Debug::SpfDelayFsmEvent(state, event) => {
                debug!(?state, ?event, "{}", self);
            }
            Debug::SpfDelayFsmTransition(old_state, new_state) => {
                debug!(?old_state, ?new_state, "{}", self);
            }
            Debug::SpfNetworkUnreachableAbr(destination, abr) => {
                debug!(%destination, %abr, "{}", self);
            }
            Debug::SpfRouterUnreachableAbr(router_id, abr) => {
                debug!(%router_id, %abr, "{}", self);
            }
            Debug::SpfUnreachableAsbr(destination, asbr) => {
                debug!(%destination, %asbr, "{}", self);
            }
            Debug::SpfUnresolvableFwdAddr(destination, fwd_addr) => {
                debug!(%destination, %fwd_addr, "{}", self);
            }
            Debug::GrHelperReject(router_id, reason) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(%reason, "{}", self);
                })
            }
            Debug::GrHelperEnter(router_id, reason, grace_period) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(%reason, %grace_period, "{}", self);
                })
            }
            Debug::GrHelperExit(router_id, reason) => {
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(%reason, "{}", self);
                })
            }
            Debug::GrRestartEnter(grace_period) => {
                debug!(%grace_period, "{}", self);
            }
            Debug::GrRestartExit(reason) => {
                debug!(%reason, "{}", self);
            }
        }
    }
}

impl<'a, V> std::fmt::Display for Debug<'a, V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => {
                write!(f, "instance created")
            }
            Debug::InstanceDelete => {
                write!(f, "instance deleted")
            }
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop(..) => {
                write!(f, "stopping instance")
            }
            Debug::InterfaceCreate(..) => {
                write!(f, "interface created")
            }
            Debug::InterfaceDelete(..) => {
                write!(f, "interface deleted")
            }
            Debug::InterfaceStart(..) => {
                write!(f, "starting interface")
            }
            Debug::InterfaceStop(..) => {
                write!(f, "stopping interface")
            }
            Debug::IsmEvent(..) => {
                write!(f, "event")
            }
            Debug::IsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::IsmDrElection(..) => {
                write!(f, "DR election")
            }
            Debug::NeighborCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NeighborDelete(..) => {
                write!(f, "neighbor deleted")
            }
            Debug::NsmEvent(..) => {
                write!(f, "event")
            }
            Debug::NsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::NsmRxmtWatchdog(..) => {
                write!(f, "tearing down neighbor: no retransmission progress")
            }
            Debug::PacketRx(..) | Debug::PacketTx(..) => {
                write!(f, "packet")
            }
            Debug::PacketRxIgnore(..) => {
                write!(
                    f,
                    "ignoring packet received from a non-adjacent neighbor"
                )
            }
            Debug::QuestionableAck(..) => {
                write!(f, "received questionable ack")
            }
            Debug::LsaDiscard(..) => {
                write!(f, "discarding LSA")
            }
            Debug::LsaMinArrivalDiscard(..) => {
                write!(f, "discarding LSA due to the MinLSArrival check")
            }
            Debug::LsaSelfOriginated(..) => {
                write!(f, "received self-originated LSA")
            }
            Debug::LsaInstall(..) => {
                write!(f, "installing LSA")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating LSA")
            }
            Debug::LsaOriginateMinInterval(..) => {
                write!(
                    f,
                    "postponing LSA origination due to the MinLSInterval check"
                )
            }
            Debug::LsaOriginateBacklogged(..) => {
                write!(
                    f,
                    "postponing external LSA origination due to rate limiting"
                )
            }
            Debug::LsaFlush(..) => {
                write!(f, "flushing LSA")
            }
            Debug::LsaRefresh(..) => {
                write!(f, "refreshing LSA")
            }
            Debug::LsdbOverflowEnter(..) => {
                write!(f, "entering external LSDB overflow state")
            }
            Debug::LsdbOverflowExit => {
                write!(f, "leaving external LSDB overflow state")
            }
            Debug::SpfDelayFsmEvent(..) => {
                write!(f, "SPF Delay FSM event")
            }
            Debug::SpfDelayFsmTransition(..) => {
                write!(f, "SPF Delay FSM state transition")
            }
            Debug::SpfNetworkUnreachableAbr(..)
            | Debug::SpfRouterUnreachableAbr(..) => {
                write!(f, "no route found for originating ABR")
            }
            Debug::SpfUnreachableAsbr(..) => {
                write!(f, "no route found for originating ASBR")
            }
            Debug::SpfUnresolvableFwdAddr(..) => {
                write!(f, "no route found for forwarding address")
            }
            Debug::GrHelperReject(..) => {
                write!(f, "failed to enter helper mode")
            }
            Debug::GrHelperEnter(..) => {
                write!(f, "entering helper mode")
            }
            Debug::GrHelperExit(..) => {
                write!(f, "exiting from helper mode")
            }
            Debug::GrRestartEnter(..) => {
                write!(f, "entering graceful restart")
            }
            Debug::GrRestartExit(..) => {
                write!(f, "exiting graceful restart")
            }
        }
    }
}

// ===== impl InstanceInactiveReason =====

impl std::fmt::Display for InstanceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceInactiveReason::AdminDown => {
                write!(f, "administrative status down")
            }
            InstanceInactiveReason::MissingRouterId => {
                write!(f, "missing router-id")
            }
            InstanceInactiveReason::Resetting => {
                write!(f, "resetting")
            }
        }
    }
}

// ===== impl InterfaceInactiveReason =====

impl std::fmt::Display for InterfaceInactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceInactiveReason::InstanceDown => {
                write!(f, "OSPF instance down")
            }
            InterfaceInactiveReason::AdminDown => {
                write!(f, "administrative status down")
            }
            InterfaceInactiveReason::OperationalDown => {
                write!(f, "operational status down")
            }
            InterfaceInactiveReason::MissingIfindex => {
                write!(f, "missing ifindex")
            }
            InterfaceInactiveReason::MissingMtu => {
                write!(f, "missing MTU")
            }
            InterfaceInactiveReason::MissingIpv4Address => {
                write!(f, "missing IPv4 address")
            }
            InterfaceInactiveReason::MissingLinkLocalAddress => {
                write!(f, "missing link local IPv6 address")
            }
            InterfaceInactiveReason::VirtualLinkUnresolved => {
                write!(f, "virtual link endpoint not resolved")
            }
            InterfaceInactiveReason::LoopedBack => {
                write!(f, "interface is looped back")
            }
            InterfaceInactiveReason::Resetting => {
                write!(f, "resetting")
            }
        }
    }
}

// ===== impl SeqNoMismatchReason =====

impl std::fmt::Display for SeqNoMismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeqNoMismatchReason::InconsistentFlags => {
                write!(f, "inconsistent flags")
            }
            SeqNoMismatchReason::InconsistentOptions => {
                write!(f, "inconsistent options")
            }
            SeqNoMismatchReason::InconsistentSeqNo => {
                write!(f, "inconsistent sequence number")
            }
            SeqNoMismatchReason::UnexpectedDbDesc => {
                write!(f, "unexpected database description packet")
            }
            SeqNoMismatchReason::InvalidLsaType => {
                write!(f, "invalid LSA type")
            }
        }
    }
}

// ===== impl LsaFlushReason =====

impl std::fmt::Display for LsaFlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsaFlushReason::Expiry => {
                write!(f, "LSA reached MaxAge")
            }
            LsaFlushReason::PrematureAging => {
                write!(f, "premature aging")
            }
        }
    }
}

// ===== impl GrRejectReason =====

impl std::fmt::Display for GrRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrRejectReason::NeighborNotFull => {
                write!(f, "neighbor is not fully adjacent")
            }
            GrRejectReason::TopologyChange => {
                write!(
                    f,
                    "network topology has changed since the router restarted"
                )
            }
            GrRejectReason::GracePeriodExpired => {
                write!(f, "grace period has already expired")
            }
            GrRejectReason::HelperDisabled => {
                write!(f, "graceful restart helper mode is disabled")
            }
        }
    }
}
