//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use self::nsm::{Event, State};
use rand::RngCore;
use rospf_utils::task::{IntervalTask, TimeoutTask};
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::collections::{Arena, NeighborId};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{LsaEntry, LsaOriginateEvent};
use crate::output;
use crate::packet::lsa::{GrReason, Lsa, LsaHdrVersion, LsaKey};
use crate::packet::{DbDescFlags, DbDescVersion, PacketType};
use crate::tasks;
use crate::tasks::messages::input::RxmtIntervalMsg;
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::version::Version;

// One row of the neighbor table. Everything the protocol remembers about
// an adjacent router lives here: the identity learned from its Hellos,
// the database-exchange handshake state, and the per-neighbor LSA lists.
#[derive(Debug)]
pub struct Neighbor<V: Version> {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    // Interface ID the neighbor reports for this link (OSPFv3).
    pub iface_id: Option<u32>,
    pub src: V::NetIpAddr,
    // DR and BDR as declared in the neighbor's Hellos.
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub priority: u8,
    pub state: State,

    // Options the neighbor advertised during negotiation.
    pub options: Option<V::PacketOptions>,
    // Database exchange handshake: our flags and sequence, plus the last
    // packets in both directions (duplicates are detected and answered
    // from these).
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc<V>>,
    pub last_sent_dbdesc: Option<NetTxPacketMsg<V>>,
    // Highest authentication sequence number accepted so far, tracked per
    // packet type because RFC 4222 prioritization legitimately reorders
    // types relative to each other.
    pub auth_seqno: HashMap<PacketType, u64>,

    // Consecutive retransmission rounds without any progress; feeds the
    // teardown watchdog.
    pub rxmt_rounds: u16,

    pub event_count: u32,
    pub discontinuity_time: DateTime<Utc>,

    // Set while this router acts as graceful restart helper for the
    // neighbor.
    pub gr: Option<NeighborGrHelper>,
    pub lsa_lists: NeighborLsaLists<V>,
    pub tasks: NeighborTasks,
}

// IPv4-sized value naming a neighbor on a multi-access segment: its
// source address under OSPFv2, its Router ID under OSPFv3.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NeighborNetId(Ipv4Addr);

#[derive(Debug)]
pub struct LastDbDesc<V: Version> {
    pub options: V::PacketOptions,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
}

// The per-neighbor LSA bookkeeping required by reliable flooding and
// database exchange.
#[derive(Debug)]
pub struct NeighborLsaLists<V: Version> {
    // Queued for the next LS Update addressed to this neighbor alone.
    pub ls_update: BTreeMap<LsaKey<V::LsaType>, Arc<Lsa<V>>>,
    // Flooded but not yet acknowledged; replayed by the rxmt timer.
    pub ls_rxmt: BTreeMap<LsaKey<V::LsaType>, Arc<Lsa<V>>>,
    // Still to be described in Database Description packets.
    pub db_summary: BTreeMap<LsaKey<V::LsaType>, Arc<Lsa<V>>>,
    // Instances the neighbor has that we lack, not yet requested.
    pub ls_request: BTreeMap<LsaKey<V::LsaType>, V::LsaHdr>,
    // Requested and awaiting the answering LS Update.
    pub ls_request_pending: BTreeMap<LsaKey<V::LsaType>, V::LsaHdr>,
}

#[derive(Debug)]
pub struct NeighborGrHelper {
    pub restart_reason: GrReason,
    pub grace_period: TimeoutTask,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimeoutTask>,
    pub dbdesc_free_timer: Option<TimeoutTask>,
    rxmt_dbdesc: Option<IntervalTask>,
    rxmt_lsreq: Option<IntervalTask>,
    rxmt_lsupd: Option<IntervalTask>,
}

#[derive(Clone, Copy, Debug)]
#[derive(Deserialize, Serialize)]
pub enum RxmtPacketType {
    DbDesc,
    LsRequest,
    LsUpdate,
}

// Per-version neighbor identification.
pub trait NeighborVersion<V: Version> {
    // Derive the multi-access network identifier for a neighbor.
    fn network_id(addr: &V::NetIpAddr, router_id: Ipv4Addr) -> NeighborNetId;
}

// Neighbor state machine.
pub mod nsm {
    use serde::{Deserialize, Serialize};

    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        Start,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        AdjOk,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

// ===== impl Neighbor =====

impl<V> Neighbor<V>
where
    V: Version,
{
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: V::NetIpAddr,
    ) -> Neighbor<V> {
        Debug::<V>::NeighborCreate(router_id).log();

        // The DD sequence starts at an unpredictable value.
        let dd_seq_no = {
            #[cfg(not(feature = "deterministic"))]
            {
                rand::rng().next_u32()
            }
            #[cfg(feature = "deterministic")]
            {
                // Stable value so test runs can be compared.
                router_id.into()
            }
        };

        Neighbor {
            id,
            router_id,
            iface_id: None,
            src,
            dr: None,
            bdr: None,
            priority: 0,
            state: State::Down,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no,
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            auth_seqno: Default::default(),
            rxmt_rounds: 0,
            event_count: 0,
            discontinuity_time: Utc::now(),
            gr: None,
            lsa_lists: Default::default(),
            tasks: Default::default(),
        }
    }

    // Runs the RFC 2328 section 10.3 state machine for one event. State
    // changes flow through `transition` so the side effects stay in one
    // place.
    pub(crate) fn fsm(
        &mut self,
        iface: &mut Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        lsa_entries: &Arena<LsaEntry<V>>,
        event: Event,
    ) {
        Debug::<V>::NsmEvent(self.router_id, &self.state, &event).log();

        let next = match (self.state, &event) {
            (State::Down, Event::Start) => {
                // NBMA only: the interface layer handles the Hello polls
                // towards the configured neighbor.
                self.inactivity_timer_reset(iface, area, instance);
                Some(State::Attempt)
            }
            (State::Down | State::Attempt, Event::HelloRcvd) => {
                self.inactivity_timer_reset(iface, area, instance);
                Some(State::Init)
            }
            (state, Event::HelloRcvd) if state >= State::Init => {
                // Liveness refresh only.
                self.inactivity_timer_reset(iface, area, instance);
                None
            }
            (State::Init, Event::TwoWayRcvd)
            | (State::TwoWay, Event::AdjOk) => {
                if iface.need_adjacency(self) {
                    Some(self.exstart_begin(iface, area, instance))
                } else {
                    Some(State::TwoWay)
                }
            }
            (State::ExStart, Event::NegotiationDone) => {
                // Negotiation settled master/slave; describe the database.
                self.db_summary_load(iface, area, instance, lsa_entries);
                self.dd_flags.remove(DbDescFlags::I);
                Some(State::Exchange)
            }
            (State::Exchange, Event::ExchangeDone) => {
                if self.lsa_lists.ls_request.is_empty()
                    && self.lsa_lists.ls_request_pending.is_empty()
                {
                    Some(State::Full)
                } else {
                    // Outstanding requests still need answers.
                    Some(State::Loading)
                }
            }
            (State::Loading, Event::LoadingDone) => Some(State::Full),
            (state, Event::AdjOk) if state >= State::ExStart => {
                if iface.need_adjacency(self) {
                    None
                } else {
                    // The adjacency is no longer wanted; fall back to
                    // bidirectional-only.
                    self.adjacency_clear();
                    Some(State::TwoWay)
                }
            }
            (state, Event::SeqNoMismatch(_) | Event::BadLsReq)
                if state >= State::Exchange =>
            {
                // The exchange went off the rails; redo it from scratch.
                self.adjacency_clear();
                Some(self.exstart_begin(iface, area, instance))
            }
            (_, Event::Kill | Event::LinkDown | Event::InactivityTimer) => {
                self.adjacency_clear();
                self.tasks.inactivity_timer = None;

                // A helper keeps a restarting neighbor in place through
                // its dead interval; the grace period timer removes it if
                // the restart never completes.
                if event == Event::InactivityTimer && self.gr.is_some() {
                    None
                } else {
                    Some(State::Down)
                }
            }
            (state, Event::OneWayRcvd) if state >= State::TwoWay => {
                self.adjacency_clear();
                self.tasks.inactivity_timer = None;

                // Same helper exemption as above.
                if self.gr.is_some() { None } else { Some(State::Init) }
            }
            (state, Event::TwoWayRcvd) if state >= State::TwoWay => None,
            (State::Init, Event::OneWayRcvd) => None,
            _ => {
                Error::<V>::NsmUnexpectedEvent(
                    self.router_id,
                    self.state,
                    event,
                )
                .log();
                return;
            }
        };

        if let Some(next) = next
            && next != self.state
        {
            self.transition(iface, area, instance, event, next);
        }
    }

    // Kicks off (or restarts) database exchange: fresh sequence number,
    // all three negotiation bits, and the opening empty description.
    fn exstart_begin(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) -> State {
        self.dd_seq_no += 1;
        self.dd_flags
            .insert(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS);
        output::send_dbdesc(self, iface, area, instance);
        State::ExStart
    }

    // Seeds the summary list with every LSA this neighbor may receive.
    // MaxAge LSAs skip the description phase and go straight onto the
    // retransmission list.
    fn db_summary_load(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        lsa_entries: &Arena<LsaEntry<V>>,
    ) {
        let options = self.options;
        for entry in iface
            .state
            .lsdb
            .iter(lsa_entries)
            .chain(area.state.lsdb.iter(lsa_entries))
            .chain(instance.state.lsdb.iter(lsa_entries))
            .map(|(_, entry)| entry)
            .filter(|entry| {
                V::lsa_type_is_valid(
                    Some(area.config.area_type),
                    options,
                    entry.data.hdr.lsa_type(),
                )
            })
        {
            let lsa_key = entry.data.hdr.key();
            if entry.data.hdr.is_maxage() {
                self.lsa_lists.ls_rxmt.insert(lsa_key, entry.data.clone());
                self.rxmt_lsupd_start_check(iface, area, instance);
            } else {
                self.lsa_lists.db_summary.insert(lsa_key, entry.data.clone());
            }
        }
    }

    // Applies a state change and its knock-on effects.
    fn transition(
        &mut self,
        iface: &mut Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        event: Event,
        next: State,
    ) {
        let was_bidir = self.state >= State::TwoWay;
        let is_bidir = next >= State::TwoWay;

        // Gaining or losing bidirectional communication can change the
        // outcome of DR election on multi-access segments.
        if was_bidir != is_bidir && iface.is_broadcast_or_nbma() {
            instance.tx.protocol_input.ism_event(
                area.id,
                iface.id,
                ism::Event::NbrChange,
            );
        }

        // Entering or leaving Full changes the links this router
        // advertises.
        if (next == State::Full || self.state == State::Full)
            && self.gr.is_none()
        {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::NeighborToFromFull {
                    area_id: area.id,
                    iface_id: iface.id,
                },
            );
        }

        // Dead NBMA neighbors keep receiving Hellos, just at the slower
        // poll cadence.
        if iface.config.if_type == InterfaceType::NonBroadcast {
            if next == State::Down && event == Event::InactivityTimer {
                if let Some(snbr) = iface.config.static_nbrs.get(&self.src) {
                    iface.nbma_poll_interval_start(
                        area,
                        instance,
                        self.src,
                        snbr.poll_interval,
                    );
                }
            } else if self.state == State::Down {
                iface.nbma_poll_interval_stop(self.src);
            }
        }

        Debug::<V>::NsmTransition(self.router_id, &self.state, &next).log();
        self.state = next;

        self.event_count += 1;
        self.discontinuity_time = Utc::now();
    }

    pub(crate) fn loading_done_check(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        // Nothing to do while requests are still in flight.
        if !self.lsa_lists.ls_request_pending.is_empty() {
            return;
        }

        self.rxmt_lsreq_stop();

        if !self.lsa_lists.ls_request.is_empty() {
            // More instances remain to be requested.
            output::send_lsreq(self, iface, area, instance);
        } else if self.state == nsm::State::Loading {
            // The database is synchronized.
            instance.tx.protocol_input.nsm_event(
                area.id,
                iface.id,
                self.id,
                nsm::Event::LoadingDone,
            );
        }
    }

    // Forgets all database-exchange progress and flooding state. The
    // neighbor identity and Hello-derived values survive.
    fn adjacency_clear(&mut self) {
        self.options = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.lsa_lists = Default::default();
        self.rxmt_rounds = 0;
        self.tasks.dbdesc_free_timer = None;
        self.tasks.rxmt_dbdesc = None;
        self.tasks.rxmt_lsreq = None;
        self.tasks.rxmt_lsupd = None;
    }

    pub(crate) fn dbdesc_is_dup(&self, dbdesc: &V::PacketDbDesc) -> bool {
        self.last_rcvd_dbdesc.as_ref().is_some_and(|last| {
            last.options == dbdesc.options()
                && last.dd_flags == dbdesc.dd_flags()
                && last.dd_seq_no == dbdesc.dd_seq_no()
        })
    }

    pub(crate) fn network_id(&self) -> NeighborNetId {
        <V as NeighborVersion<V>>::network_id(&self.src, self.router_id)
    }

    pub(crate) fn inactivity_timer_start(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        let task = tasks::nsm_inactivity_timer(self, iface, area, instance);
        self.tasks.inactivity_timer = Some(task);
    }

    fn inactivity_timer_reset(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        match self.tasks.inactivity_timer.as_mut() {
            Some(timer) => timer.reset(None),
            None => self.inactivity_timer_start(iface, area, instance),
        }
    }

    pub(crate) fn rxmt_dbdesc_start(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        let task = self.rxmt_task(iface, area, instance, RxmtPacketType::DbDesc);
        self.tasks.rxmt_dbdesc = Some(task);
    }

    pub(crate) fn rxmt_dbdesc_stop(&mut self) {
        self.tasks.rxmt_dbdesc = None;
        self.rxmt_rounds = 0;
    }

    pub(crate) fn rxmt_lsreq_start(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        let task =
            self.rxmt_task(iface, area, instance, RxmtPacketType::LsRequest);
        self.tasks.rxmt_lsreq = Some(task);
    }

    fn rxmt_lsreq_stop(&mut self) {
        self.tasks.rxmt_lsreq = None;
        self.rxmt_rounds = 0;
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
    ) {
        if !self.lsa_lists.ls_rxmt.is_empty()
            && self.tasks.rxmt_lsupd.is_none()
        {
            let task =
                self.rxmt_task(iface, area, instance, RxmtPacketType::LsUpdate);
            self.tasks.rxmt_lsupd = Some(task);
        }
    }

    pub(crate) fn rxmt_lsupd_stop_check(&mut self) {
        // Every acknowledged LSA counts as forward progress.
        self.rxmt_rounds = 0;
        if self.lsa_lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_some()
        {
            self.tasks.rxmt_lsupd = None;
        }
    }

    fn rxmt_task(
        &self,
        iface: &Interface<V>,
        area: &Area<V>,
        instance: &InstanceUpView<'_, V>,
        packet_type: RxmtPacketType,
    ) -> IntervalTask {
        let msg = RxmtIntervalMsg {
            area_key: area.id.into(),
            iface_key: iface.id.into(),
            nbr_key: self.id.into(),
            packet_type,
        };
        tasks::packet_rxmt_interval(iface, msg, instance)
    }

    // Shared watchdog for the DD/LSR/LSA retransmission timers: a
    // neighbor that ignores `max_rxmt_window` consecutive rounds is
    // assumed dead and torn down.
    pub(crate) fn rxmt_watchdog_tick(&mut self, max_rxmt_window: u16) -> bool {
        self.rxmt_rounds = self.rxmt_rounds.saturating_add(1);
        if self.rxmt_rounds >= max_rxmt_window {
            Debug::<V>::NsmRxmtWatchdog(self.router_id, self.rxmt_rounds)
                .log();
            return true;
        }

        false
    }
}

impl<V> Drop for Neighbor<V>
where
    V: Version,
{
    fn drop(&mut self) {
        Debug::<V>::NeighborDelete(self.router_id).log();
    }
}

// ===== impl NeighborNetId =====

impl NeighborNetId {
    pub(crate) fn get(&self) -> Ipv4Addr {
        self.0
    }
}

impl std::fmt::Display for NeighborNetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Ipv4Addr> for NeighborNetId {
    fn from(addr: Ipv4Addr) -> NeighborNetId {
        NeighborNetId(addr)
    }
}

// ===== impl NeighborLsaLists =====

impl<V> Default for NeighborLsaLists<V>
where
    V: Version,
{
    fn default() -> NeighborLsaLists<V> {
        NeighborLsaLists {
            ls_update: Default::default(),
            ls_rxmt: Default::default(),
            db_summary: Default::default(),
            ls_request: Default::default(),
            ls_request_pending: Default::default(),
        }
    }
}
