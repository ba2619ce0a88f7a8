//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ipnetwork::{Ipv4Network, Ipv6Network};
use self::ism::{Event, State};
use rospf_utils::UnboundedSender;
use rospf_utils::ip::{AddressFamily, IpNetworkKind};
use rospf_utils::keychain::{Key, Keychains};
use rospf_utils::southbound::InterfaceFlags;
use rospf_utils::task::{IntervalTask, TimeoutTask};
use smallvec::smallvec;

use crate::area::Area;
use crate::collections::{Arena, InterfaceId, Lsdb, NeighborIndex, Neighbors};
use crate::configuration::InterfaceCfg;
use crate::debug::{Debug, InterfaceInactiveReason};
use crate::error::{Error, InterfaceCfgError};
use crate::instance::InstanceUpView;
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborNetId, nsm};
use crate::network::{MulticastAddr, NetworkVersion, SendDestination};
use crate::packet::Packet;
use crate::packet::auth::AuthMethod;
use crate::packet::lsa::{Lsa, LsaHdrVersion, LsaKey};
use crate::tasks;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::version::Version;

#[derive(Debug)]
pub struct Interface<V: Version> {
    pub id: InterfaceId,
    pub name: String,
    pub system: InterfaceSys<V>,
    pub config: InterfaceCfg<V>,
    pub state: InterfaceState<V>,
}

#[derive(Debug)]
pub struct InterfaceSys<V: Version> {
    pub flags: InterfaceFlags,
    pub ifindex: Option<u32>,
    pub mtu: Option<u16>,
    // List of addresses associated with this interface.
    pub addr_list: BTreeSet<V::IpNetwork>,
    // OSPFv2: primary address.
    pub primary_addr: Option<Ipv4Network>,
    pub unnumbered: bool,
    // OSPFv3: link-local address.
    pub linklocal_addr: Option<Ipv6Network>,
}

#[derive(Debug)]
pub struct InterfaceState<V: Version> {
    pub ism_state: State,
    // Handle to the packet Tx channel of the I/O collaborator.
    pub net: Option<InterfaceNet<V>>,
    // Source address used when sending packets.
    pub src_addr: Option<V::NetIpAddr>,
    // The network DR/BDR.
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors<V>,
    // List of LSAs enqueued for transmission.
    pub ls_update_list: BTreeMap<LsaKey<V::LsaType>, Arc<Lsa<V>>>,
    // List of pending delayed Acks.
    pub ls_ack_list: BTreeMap<LsaKey<V::LsaType>, V::LsaHdr>,
    pub event_count: u32,
    pub discontinuity_time: DateTime<Utc>,
    // LSDB of link-scope LSAs.
    pub lsdb: Lsdb<V>,
    pub network_lsa_self: Option<LsaKey<V::LsaType>>,
    // Authentication data.
    pub auth: Option<AuthMethod>,
    // Virtual link endpoint, resolved through the transit area's SPT.
    pub vlink: Option<VirtualLinkState<V>>,
    pub tasks: InterfaceTasks<V>,
}

#[derive(Debug)]
pub struct InterfaceNet<V: Version> {
    // Packet Tx channel towards the I/O collaborator.
    pub tx: UnboundedSender<NetTxPacketMsg<V>>,
}

// Virtual link runtime state, recomputed after each SPF run in the
// transit area.
#[derive(Debug)]
pub struct VirtualLinkState<V: Version> {
    // Address of the remote endpoint.
    pub dst: V::NetIpAddr,
    // Local address used to reach the endpoint.
    pub src: V::NetIpAddr,
    // Ifindex of the underlying interface towards the endpoint.
    pub ifindex: u32,
    // Cost of the intra-area path through the transit area.
    pub cost: u16,
}

#[derive(Debug)]
pub struct InterfaceTasks<V: Version> {
    // ISM Hello Tx interval task.
    pub hello_interval: Option<IntervalTask>,
    // NBMA poll interval tasks.
    pub nbma_poll_interval: HashMap<V::NetIpAddr, IntervalTask>,
    // ISM WaitTimer task.
    pub wait_timer: Option<TimeoutTask>,
    // LS Update timer task.
    pub ls_update_timer: Option<TimeoutTask>,
    // Delayed Ack task.
    pub ls_delayed_ack: Option<TimeoutTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum InterfaceType {
    Broadcast,
    NonBroadcast,
    PointToMultipoint,
    PointToPoint,
    VirtualLink,
}

#[derive(Clone, Copy, Debug)]
struct DrCandidate {
    router_id: Ipv4Addr,
    net_id: NeighborNetId,
    dr: Option<NeighborNetId>,
    bdr: Option<NeighborNetId>,
    priority: u8,
}

// Interface state machine.
pub mod ism {
    use serde::{Deserialize, Serialize};

    use crate::debug::InterfaceInactiveReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Loopback,
        Waiting,
        PointToPoint,
        DrOther,
        Backup,
        Dr,
    }

    #[derive(Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        WaitTimer,
        BackupSeen,
        NbrChange,
        LoopInd,
        UnloopInd,
        InterfaceDown(InterfaceInactiveReason),
    }
}

// The interface behaviors that differ between the versions: readiness,
// packet destination validation and transmission details.
pub trait InterfaceVersion<V: Version> {
    // Return whether the interface is ready for OSPF operation.
    fn is_ready(
        af: AddressFamily,
        iface: &Interface<V>,
    ) -> Result<(), InterfaceInactiveReason>;

    // Return the source address used to send OSPF packets.
    fn src_addr(iface_sys: &InterfaceSys<V>) -> V::NetIpAddr;

    // Generate an OSPF Hello message.
    fn generate_hello(
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) -> Packet<V>;

    // Validate the destination of the received packet.
    fn validate_packet_dst(
        iface: &Interface<V>,
        dst: V::NetIpAddr,
    ) -> Result<(), Error<V>>;

    // Validate the source of the received packet.
    fn validate_packet_src(
        iface: &Interface<V>,
        src: V::NetIpAddr,
    ) -> Result<(), Error<V>>;

    // Check if the interface and the received packet have matching Instance
    // IDs (OSPFv3 only).
    fn packet_instance_id_match(
        iface: &Interface<V>,
        packet_hdr: &V::PacketHdr,
    ) -> bool;

    // Validate the received Hello packet.
    fn validate_hello(
        iface: &Interface<V>,
        hello: &V::PacketHello,
    ) -> Result<(), InterfaceCfgError>;

    // Return the maximum packet size that can be sent on this interface.
    fn max_packet_size(iface: &Interface<V>) -> u16;

    // Find neighbor identified by its source address or Router-ID.
    fn get_neighbor<'a>(
        iface: &mut Interface<V>,
        src: &V::NetIpAddr,
        router_id: Ipv4Addr,
        neighbors: &'a mut Arena<Neighbor<V>>,
    ) -> Option<(NeighborIndex, &'a mut Neighbor<V>)>;

    // Incorporate a system address into the interface, returning whether it
    // is relevant to this OSPF version.
    fn addr_add(iface: &mut Interface<V>, addr: ipnetwork::IpNetwork) -> bool;

    // Remove a system address from the interface, returning whether it was
    // present.
    fn addr_del(iface: &mut Interface<V>, addr: ipnetwork::IpNetwork) -> bool;
}

// ===== impl Interface =====

impl<V> Interface<V>
where
    V: Version,
{
    pub(crate) fn new(id: InterfaceId, name: String) -> Interface<V> {
        Debug::<V>::InterfaceCreate(&name).log();

        Interface {
            id,
            name,
            system: InterfaceSys::default(),
            config: InterfaceCfg::default(),
            state: InterfaceState::default(),
        }
    }

    // Checks if the interface needs to be started or stopped in response to a
    // configuration or southbound event.
    pub(crate) fn update(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        neighbors: &mut Arena<Neighbor<V>>,
        lsa_entries: &Arena<LsaEntry<V>>,
    ) {
        // Work out whether the operational change maps to an ISM event.
        let event = match V::is_ready(instance.state.af, self) {
            Ok(_) => {
                let ism_state = self.state.ism_state;
                if self.system.flags.contains(InterfaceFlags::LOOPBACK) {
                    if ism_state == State::Loopback {
                        return;
                    }
                    Event::LoopInd
                } else if ism_state == State::Loopback {
                    Event::UnloopInd
                } else if ism_state == State::Down {
                    Event::InterfaceUp
                } else {
                    return;
                }
            }
            Err(reason) if !self.is_down() => Event::InterfaceDown(reason),
            _ => return,
        };

        self.fsm(area, instance, neighbors, lsa_entries, event);
    }

    fn start(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        neighbors: &Arena<Neighbor<V>>,
    ) -> State {
        Debug::<V>::InterfaceStart(&self.name).log();

        self.state.src_addr = match &self.state.vlink {
            Some(vlink) => Some(vlink.src),
            None => Some(V::src_addr(&self.system)),
        };

        if !self.is_passive() {
            self.state.auth = self.auth(&instance.shared.keychains);

            // Attach to the packet I/O channel.
            self.state.net = Some(InterfaceNet {
                tx: instance.tx.net_tx.clone(),
            });

            self.hello_interval_start(area, instance);
        }

        let new_ism_state = match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => State::PointToPoint,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                if self.config.priority == 0 {
                    State::DrOther
                } else {
                    State::Waiting
                }
            }
        };

        if new_ism_state == State::Waiting {
            let task = tasks::ism_wait_timer(self, area, instance);
            self.state.tasks.wait_timer = Some(task);

            if self.config.if_type == InterfaceType::NonBroadcast {
                // On NBMA networks the configured neighbors that could
                // become DR get a Start event right away.
                for nbr in self
                    .config
                    .static_nbrs
                    .iter()
                    .filter(|(_, snbr)| snbr.priority != 0)
                    .filter_map(|(addr, _)| {
                        self.state
                            .neighbors
                            .iter(neighbors)
                            .find(|nbr| nbr.src == *addr)
                    })
                {
                    instance.tx.protocol_input.nsm_event(
                        area.id,
                        self.id,
                        nbr.id,
                        nsm::Event::Start,
                    );
                }
            }
        }

        new_ism_state
    }

    // Tearing down only applies to an active interface.
    fn stop(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        neighbors: &mut Arena<Neighbor<V>>,
        lsa_entries: &Arena<LsaEntry<V>>,
        reason: InterfaceInactiveReason,
    ) {
        if self.is_down() {
            return;
        }

        Debug::<V>::InterfaceStop(&self.name, reason).log();

        let event = match reason {
            InterfaceInactiveReason::OperationalDown
            | InterfaceInactiveReason::MissingIfindex
            | InterfaceInactiveReason::MissingMtu
            | InterfaceInactiveReason::MissingIpv4Address
            | InterfaceInactiveReason::MissingLinkLocalAddress
            | InterfaceInactiveReason::VirtualLinkUnresolved => {
                nsm::Event::LinkDown
            }
            _ => nsm::Event::Kill,
        };
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.fsm(self, area, instance, lsa_entries, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        self.state.net = None;
        self.state.src_addr = None;
        self.state.dr = None;
        self.state.bdr = None;
        self.state.neighbors = Default::default();
        self.state.ls_update_list = Default::default();
        self.state.ls_ack_list = Default::default();
        // The link-scope LSDB deliberately survives the reset.
        self.state.auth = None;
        self.state.tasks = Default::default();
    }

    // Rebuilds the Hello transmission with current parameters.
    pub(crate) fn sync_hello_tx(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        if !self.is_passive() && self.state.ism_state >= ism::State::Waiting {
            self.hello_interval_start(area, instance);
        }
    }

    pub(crate) fn reset(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        neighbors: &mut Arena<Neighbor<V>>,
        lsa_entries: &Arena<LsaEntry<V>>,
    ) {
        for event in [
            ism::Event::InterfaceDown(InterfaceInactiveReason::Resetting),
            ism::Event::InterfaceUp,
        ] {
            self.fsm(area, instance, neighbors, lsa_entries, event);
        }
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn is_passive(&self) -> bool {
        self.system.flags.contains(InterfaceFlags::LOOPBACK)
            || self.config.passive
    }

    pub(crate) fn is_dr_or_backup(&self) -> bool {
        matches!(self.state.ism_state, State::Dr | State::Backup)
    }

    pub(crate) fn is_broadcast_or_nbma(&self) -> bool {
        matches!(
            self.config.if_type,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast
        )
    }

    pub(crate) fn is_virtual_link(&self) -> bool {
        self.config.if_type == InterfaceType::VirtualLink
    }

    fn auth(&self, keychains: &Keychains) -> Option<AuthMethod> {
        if let (Some(key), Some(key_id), Some(algo)) = (
            &self.config.auth_key,
            self.config.auth_keyid,
            self.config.auth_algo,
        ) {
            let auth_key =
                Key::new(key_id as u64, algo, key.as_bytes().to_vec());
            return Some(AuthMethod::ManualKey(auth_key));
        }

        if let Some(keychain) = &self.config.auth_keychain
            && let Some(keychain) = keychains.get(keychain)
        {
            return Some(AuthMethod::Keychain(keychain.clone()));
        }

        None
    }

    pub(crate) fn auth_update(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        self.state.auth = self.auth(&instance.shared.keychains);
        if self.state.net.is_some() {
            self.sync_hello_tx(area, instance);
        }
    }

    pub(crate) fn fsm(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        neighbors: &mut Arena<Neighbor<V>>,
        lsa_entries: &Arena<LsaEntry<V>>,
        event: Event,
    ) {
        Debug::<V>::IsmEvent(&self.name, &self.state.ism_state, &event).log();

        let new_ism_state = match (self.state.ism_state, &event) {
            (State::Down, Event::InterfaceUp) => {
                self.start(area, instance, neighbors)
            }
            (State::Waiting, Event::NbrChange) => {
                // Not a transition the standard names, but it occurs in
                // practice; silently staying put beats logging an error.
                return;
            }
            (State::Waiting, Event::BackupSeen | Event::WaitTimer) => {
                self.state.tasks.wait_timer = None;

                self.dr_election(area, instance, neighbors)
            }
            (State::DrOther | State::Backup | State::Dr, Event::NbrChange) => {
                self.dr_election(area, instance, neighbors)
            }
            (_, Event::InterfaceDown(reason)) => {
                self.stop(area, instance, neighbors, lsa_entries, *reason);
                State::Down
            }
            (_, Event::LoopInd) => {
                self.stop(
                    area,
                    instance,
                    neighbors,
                    lsa_entries,
                    InterfaceInactiveReason::LoopedBack,
                );
                State::Loopback
            }
            (State::Loopback, Event::UnloopInd) => {
                State::Down
            }
            _ => {
                Error::<V>::IsmUnexpectedEvent(self.state.ism_state, event)
                    .log();
                return;
            }
        };

        if new_ism_state != self.state.ism_state {
            self.fsm_state_change(area, instance, new_ism_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        new_ism_state: State,
    ) {
        // (Re)originate LSAs that might have been affected.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::InterfaceStateChange {
                area_id: area.id,
                iface_id: self.id,
            },
        );
        if self.state.ism_state == ism::State::Dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        // Commit the transition.
        Debug::<V>::IsmTransition(
            &self.name,
            &self.state.ism_state,
            &new_ism_state,
        )
        .log();
        self.state.ism_state = new_ism_state;

        self.state.event_count += 1;
        self.state.discontinuity_time = Utc::now();
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        let addrs = match self.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::Broadcast => {
                smallvec![*V::multicast_addr(MulticastAddr::AllSpfRtrs)]
            }
            InterfaceType::NonBroadcast | InterfaceType::PointToMultipoint => {
                self.config.static_nbrs.keys().copied().collect()
            }
            InterfaceType::VirtualLink => match &self.state.vlink {
                Some(vlink) => smallvec![vlink.dst],
                None => return,
            },
        };
        let dst = SendDestination::new(self.ifindex_resolved(), addrs);
        let interval = self.config.hello_interval;
        let task = tasks::hello_interval(self, area, instance, dst, interval);
        self.state.tasks.hello_interval = Some(task);
    }

    pub(crate) fn nbma_poll_interval_start(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        addr: V::NetIpAddr,
        poll_interval: u16,
    ) {
        let dst = SendDestination::new(self.ifindex_resolved(), smallvec![addr]);
        let task =
            tasks::hello_interval(self, area, instance, dst, poll_interval);
        self.state.tasks.nbma_poll_interval.insert(addr, task);
    }

    pub(crate) fn nbma_poll_interval_stop(&mut self, addr: V::NetIpAddr) {
        self.state.tasks.nbma_poll_interval.remove(&addr);
    }

    // Resolved ifindex: virtual links borrow the ifindex of the underlying
    // interface towards the endpoint.
    pub(crate) fn ifindex_resolved(&self) -> u32 {
        match &self.state.vlink {
            Some(vlink) => vlink.ifindex,
            None => self.system.ifindex.unwrap(),
        }
    }

    fn dr_election(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        neighbors: &Arena<Neighbor<V>>,
    ) -> State {
        let router_id = instance.state.router_id;
        let net_id = V::network_id(&self.state.src_addr.unwrap(), router_id);

        // Remember who we thought DR and BDR were.
        let old_dr = self.state.dr;
        let old_bdr = self.state.bdr;

        // Elect the BDR first.
        let calc_bdr = |iface: &Interface<V>| {
            iface
                .dr_eligible_routers(router_id, net_id, neighbors)
                .filter(|rtr| rtr.dr != Some(rtr.net_id))
                .filter(|rtr| rtr.bdr == Some(rtr.net_id))
                .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                .or_else(|| {
                    iface
                        .dr_eligible_routers(router_id, net_id, neighbors)
                        .filter(|rtr| rtr.dr != Some(rtr.net_id))
                        .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                })
                .map(|rtr| rtr.net_id)
        };
        let mut new_bdr = calc_bdr(self);

        // Then the DR.
        let calc_dr =
            |iface: &Interface<V>, new_bdr: &mut Option<NeighborNetId>| {
                iface
                    .dr_eligible_routers(router_id, net_id, neighbors)
                    .filter(|rtr| rtr.dr == Some(rtr.net_id))
                    .max_by_key(|rtr| (rtr.priority, rtr.router_id))
                    .map(|rtr| rtr.net_id)
                    .or(*new_bdr)
            };
        let mut new_dr = calc_dr(self, &mut new_bdr);
        self.state.dr = new_dr;
        self.state.bdr = new_bdr;

        // If our own role changed, the election reruns once with the
        // new self-declaration in place.
        if (new_dr == Some(net_id) || old_dr == Some(net_id))
            && new_dr != old_dr
            || (new_bdr == Some(net_id) || old_bdr == Some(net_id))
                && new_bdr != old_bdr
        {
            // Second election pass.
            new_bdr = calc_bdr(self);
            new_dr = calc_dr(self, &mut new_bdr);
            self.state.dr = new_dr;
            self.state.bdr = new_bdr;
        }

        // The elected roles decide the interface state.
        Debug::<V>::IsmDrElection(
            &self.name, old_dr, new_dr, old_bdr, new_bdr,
        )
        .log();
        let next_state = if new_dr == Some(net_id) {
            ism::State::Dr
        } else if new_bdr == Some(net_id) {
            ism::State::Backup
        } else {
            ism::State::DrOther
        };

        // A router that just became DR or BDR on an NBMA network
        // starts polling the non-eligible neighbors too.
        if self.config.if_type == InterfaceType::NonBroadcast
            && matches!(next_state, ism::State::Dr | ism::State::Backup)
        {
            for nbr in self
                .config
                .static_nbrs
                .iter()
                .filter(|(_, snbr)| snbr.priority == 0)
                .filter_map(|(addr, _)| {
                    self.state
                        .neighbors
                        .iter(neighbors)
                        .find(|nbr| nbr.src == *addr)
                })
            {
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    self.id,
                    nbr.id,
                    nsm::Event::Start,
                );
            }
        }

        // Changed DR/BDR means adjacencies may need forming or
        // tearing down; AdjOk? sorts that out per neighbor.
        if new_dr != old_dr || new_bdr != old_bdr {
            for nbr in self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            {
                instance.tx.protocol_input.nsm_event(
                    area.id,
                    self.id,
                    nbr.id,
                    nsm::Event::AdjOk,
                );
            }

            // The Hello contents changed with the election outcome.
            self.sync_hello_tx(area, instance);
        }

        // A DR change invalidates LSAs that name it.
        if new_dr != old_dr {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::InterfaceDrChange {
                    area_id: area.id,
                    iface_id: self.id,
                },
            );
        }

        next_state
    }

    fn dr_eligible_routers<'a>(
        &'a self,
        router_id: Ipv4Addr,
        net_id: NeighborNetId,
        neighbors: &'a Arena<Neighbor<V>>,
    ) -> impl Iterator<Item = DrCandidate> + 'a {
        let myself = (self.config.priority != 0).then_some(DrCandidate {
            router_id,
            net_id,
            dr: self.state.dr,
            bdr: self.state.bdr,
            priority: self.config.priority,
        });

        let nbrs = self
            .state
            .neighbors
            .iter(neighbors)
            .filter(|nbr| nbr.state >= nsm::State::TwoWay)
            .filter(|nbr| nbr.priority != 0)
            .map(|nbr| DrCandidate {
                router_id: nbr.router_id,
                net_id: nbr.network_id(),
                dr: nbr.dr,
                bdr: nbr.bdr,
                priority: nbr.priority,
            });

        myself.into_iter().chain(nbrs)
    }

    pub(crate) fn need_adjacency(&self, nbr: &Neighbor<V>) -> bool {
        match self.config.if_type {
            InterfaceType::PointToPoint
            | InterfaceType::PointToMultipoint
            | InterfaceType::VirtualLink => true,
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let nbr_net_id = nbr.network_id();
                self.state.ism_state == State::Dr
                    || self.state.ism_state == State::Backup
                    || self.state.dr == Some(nbr_net_id)
                    || self.state.bdr == Some(nbr_net_id)
            }
        }
    }

    pub(crate) fn enqueue_ls_update(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        lsa_key: LsaKey<V::LsaType>,
        lsa: Arc<Lsa<V>>,
    ) {
        self.state.ls_update_list.insert(lsa_key, lsa);

        // Arm the transmission timer on first use.
        if self.state.tasks.ls_update_timer.is_none() {
            let task = tasks::ls_update_timer(self, area, instance);
            self.state.tasks.ls_update_timer = Some(task);
        }
    }

    pub(crate) fn enqueue_delayed_ack(
        &mut self,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        lsa_hdr: &V::LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        // Arm the delayed ack timer on first use.
        if self.state.tasks.ls_delayed_ack.is_none() {
            let task = tasks::delayed_ack_timer(self, area, instance);
            self.state.tasks.ls_delayed_ack = Some(task);
        }
    }

    pub(crate) fn send_packet(&self, msg: NetTxPacketMsg<V>) {
        let _ = self.state.net.as_ref().unwrap().tx.send(msg);
    }
}

impl<V> Drop for Interface<V>
where
    V: Version,
{
    fn drop(&mut self) {
        Debug::<V>::InterfaceDelete(&self.name).log();
    }
}

// ===== impl InterfaceSys =====

impl<V> InterfaceSys<V>
where
    V: Version,
{
    // Whether one of the interface's subnets covers the address.
    pub(crate) fn contains_addr(&self, addr: &V::IpAddr) -> bool {
        for local in &self.addr_list {
            if local.contains(*addr) {
                return true;
            }
        }

        false
    }
}

impl<V> Default for InterfaceSys<V>
where
    V: Version,
{
    fn default() -> InterfaceSys<V> {
        InterfaceSys {
            flags: Default::default(),
            ifindex: None,
            mtu: None,
            addr_list: Default::default(),
            primary_addr: None,
            unnumbered: false,
            linklocal_addr: None,
        }
    }
}

// ===== impl InterfaceState =====

impl<V> Default for InterfaceState<V>
where
    V: Version,
{
    fn default() -> InterfaceState<V> {
        InterfaceState {
            ism_state: Default::default(),
            net: None,
            src_addr: None,
            dr: None,
            bdr: None,
            neighbors: Default::default(),
            ls_update_list: Default::default(),
            ls_ack_list: Default::default(),
            event_count: 0,
            discontinuity_time: Utc::now(),
            lsdb: Default::default(),
            network_lsa_self: None,
            auth: None,
            vlink: None,
            tasks: Default::default(),
        }
    }
}

// ===== impl InterfaceTasks =====

impl<V> Default for InterfaceTasks<V>
where
    V: Version,
{
    fn default() -> InterfaceTasks<V> {
        InterfaceTasks {
            hello_interval: Default::default(),
            nbma_poll_interval: Default::default(),
            wait_timer: Default::default(),
            ls_update_timer: Default::default(),
            ls_delayed_ack: Default::default(),
        }
    }
}

// ===== global functions =====

// Helper for the `is_ready` method containing code common to both OSPF
// versions.
pub(crate) fn is_ready_common<V>(
    iface: &Interface<V>,
) -> Result<(), InterfaceInactiveReason>
where
    V: Version,
{
    if !iface.config.enabled {
        return Err(InterfaceInactiveReason::AdminDown);
    }

    // Virtual links become operational once the transit area provides a
    // path to the configured endpoint.
    if iface.is_virtual_link() {
        if iface.state.vlink.is_none() {
            return Err(InterfaceInactiveReason::VirtualLinkUnresolved);
        }
        return Ok(());
    }

    if !iface.system.flags.contains(InterfaceFlags::OPERATIVE) {
        return Err(InterfaceInactiveReason::OperationalDown);
    }

    if iface.system.ifindex.is_none() {
        return Err(InterfaceInactiveReason::MissingIfindex);
    }

    if iface.system.mtu.is_none() {
        return Err(InterfaceInactiveReason::MissingMtu);
    }

    Ok(())
}

pub(crate) fn validate_packet_dst_common<V>(
    iface: &Interface<V>,
    dst: V::NetIpAddr,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // AllSPFRouters is accepted on any operational interface.
    if dst == *V::multicast_addr(MulticastAddr::AllSpfRtrs) {
        return Ok(());
    }

    // AllDRouters is only for the DR and Backup.
    if dst == *V::multicast_addr(MulticastAddr::AllDrRtrs)
        && iface.is_dr_or_backup()
    {
        return Ok(());
    }

    Err(Error::InvalidDstAddr(dst))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(
        router_id: [u8; 4],
        priority: u8,
        dr: Option<[u8; 4]>,
        bdr: Option<[u8; 4]>,
    ) -> DrCandidate {
        let addr = Ipv4Addr::from(router_id);
        DrCandidate {
            router_id: addr,
            net_id: addr.into(),
            dr: dr.map(|a| Ipv4Addr::from(a).into()),
            bdr: bdr.map(|a| Ipv4Addr::from(a).into()),
            priority,
        }
    }

    // Applies the two election passes over a fixed candidate list the same
    // way `dr_election` does.
    fn elect(
        cands: &[DrCandidate],
    ) -> (Option<NeighborNetId>, Option<NeighborNetId>) {
        let bdr = cands
            .iter()
            .filter(|rtr| rtr.dr != Some(rtr.net_id))
            .filter(|rtr| rtr.bdr == Some(rtr.net_id))
            .max_by_key(|rtr| (rtr.priority, rtr.router_id))
            .or_else(|| {
                cands
                    .iter()
                    .filter(|rtr| rtr.dr != Some(rtr.net_id))
                    .max_by_key(|rtr| (rtr.priority, rtr.router_id))
            })
            .map(|rtr| rtr.net_id);
        let dr = cands
            .iter()
            .filter(|rtr| rtr.dr == Some(rtr.net_id))
            .max_by_key(|rtr| (rtr.priority, rtr.router_id))
            .map(|rtr| rtr.net_id)
            .or(bdr);
        (dr, bdr)
    }

    #[test]
    fn dr_election_priority_and_router_id_tiebreak() {
        // Priorities 5, 3, 3 with no prior declarations: the highest
        // priority becomes DR and the priority tie for BDR is broken by the
        // higher router-id.
        let cands = [
            cand([10, 0, 0, 10], 5, None, None),
            cand([10, 0, 0, 20], 3, None, None),
            cand([10, 0, 0, 30], 3, None, None),
        ];
        let (dr, bdr) = elect(&cands);
        // With no declared DR, the elected BDR is promoted.
        assert_eq!(dr, Some(Ipv4Addr::new(10, 0, 0, 10).into()));
        assert_eq!(bdr, Some(Ipv4Addr::new(10, 0, 0, 10).into()));

        // Second pass with declarations in place.
        let cands = [
            cand([10, 0, 0, 10], 5, Some([10, 0, 0, 10]), None),
            cand([10, 0, 0, 20], 3, Some([10, 0, 0, 10]), None),
            cand([10, 0, 0, 30], 3, Some([10, 0, 0, 10]), None),
        ];
        let (dr, bdr) = elect(&cands);
        assert_eq!(dr, Some(Ipv4Addr::new(10, 0, 0, 10).into()));
        assert_eq!(bdr, Some(Ipv4Addr::new(10, 0, 0, 30).into()));
    }

    #[test]
    fn dr_election_declared_dr_sticks() {
        // A declared DR is not preempted by a higher priority candidate.
        let cands = [
            cand([10, 0, 0, 10], 10, None, None),
            cand([10, 0, 0, 20], 1, Some([10, 0, 0, 20]), None),
        ];
        let (dr, _) = elect(&cands);
        assert_eq!(dr, Some(Ipv4Addr::new(10, 0, 0, 20).into()));
    }
}
