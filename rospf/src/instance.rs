//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use rospf_utils::ibus::{IbusMsg, IbusReceiver, IbusSender};
use rospf_utils::ip::AddressFamily;
use rospf_utils::keychain::Keychains;
use rospf_utils::southbound::RouteRedistributeMsg;
use rospf_utils::task::{IntervalTask, TimeoutTask};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver, UnboundedSender};

use crate::collections::{
    AreaId, Areas, Arena, InterfaceId, LsaEntryId, Lsdb, LsdbId, NeighborId,
};
use crate::configuration::{ConfigMsg, ConfigRound, InstanceCfg};
use crate::debug::{Debug, InstanceInactiveReason, LsaFlushReason};
use crate::interface::{Interface, ism};
use crate::lsdb::{
    ExternalRoute, LsaEntry, LsaLogEntry, LsaOriginateEvent,
};
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::LsaKey;
use crate::route::{RouteNet, RouteNetFlags};
use crate::spf::{SpfLogEntry, SpfTriggerLsa};
use crate::tasks;
use crate::tasks::messages::input::{
    AgeTickMsg, DbDescFreeMsg, DelayedAckMsg, GrRestartExpiryMsg,
    GracePeriodMsg, IsmEventMsg, LsaFlushMsg, LsaOrigCheckMsg,
    LsaOrigEventMsg, LsdbMaxAgeSweepMsg, NetRxPacketMsg, NsmEventMsg,
    OverflowExitMsg, RxmtIntervalMsg, SendLsUpdateMsg, SpfDelayEventMsg,
};
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::tasks::messages::ProtocolInputMsg;
use crate::version::Version;
use crate::{configuration, events, gr, ibus, lsdb, output, spf};

pub struct Instance<V: Version> {
    pub name: String,
    pub system: InstanceSys<V>,
    pub config: InstanceCfg,
    // Items touched by the ongoing configuration round.
    pub config_round: Option<ConfigRound<V>>,
    pub state: Option<InstanceState<V>>,
    pub arenas: InstanceArenas<V>,
    pub tx: InstanceChannelsTx<V>,
    pub shared: InstanceShared,
}

#[derive(Debug, Default)]
pub struct InstanceShared {
    // Key-chains learned from the key-chain collaborator.
    pub keychains: Keychains,
}

#[derive(Debug)]
pub struct InstanceSys<V: Version> {
    pub router_id: Option<Ipv4Addr>,
    // Redistributed routes after policy application.
    pub redistributed: BTreeMap<V::IpNetwork, ExternalRoute<V>>,
    // Redistributed routes as received, kept for policy resyncs.
    pub redistribute_input: BTreeMap<IpNetwork, RouteRedistributeMsg>,
    // LSA-IDs allocated to originated AS-external LSAs (OSPFv3's Link
    // State IDs carry no addressing semantics).
    pub ext_lsa_ids: BTreeMap<V::IpNetwork, u32>,
    pub next_ext_lsa_id: u32,
}

#[derive(Debug)]
pub struct InstanceState<V: Version> {
    pub af: AddressFamily,
    pub router_id: Ipv4Addr,
    // LSDB of AS-scope LSAs.
    pub lsdb: Lsdb<V>,
    // One-second tick driving the LSDB aging wheels.
    pub age_tick: Option<IntervalTask>,
    // SPF scheduling state.
    pub spf_last_event_rcvd: Option<Instant>,
    pub spf_last_time: Option<Instant>,
    pub spf_delay_state: spf::fsm::State,
    pub spf_delay_timer: Option<TimeoutTask>,
    pub spf_hold_down_timer: Option<TimeoutTask>,
    pub spf_learn_timer: Option<TimeoutTask>,
    // Changes accumulated since the last SPF run.
    pub spf_trigger_lsas: Vec<SpfTriggerLsa<V>>,
    pub spf_schedule_time: Option<Instant>,
    pub rib: BTreeMap<V::IpNetwork, RouteNet<V>>,
    // AS-external LSAs originated by NSSA translation.
    pub nssa_translated: std::collections::BTreeSet<LsaKey<V::LsaType>>,
    // External origination pacing.
    pub ext_orig_budget: u32,
    pub ext_orig_backlog: VecDeque<V::IpNetwork>,
    // External LSDB overflow state (RFC 1765). `Some` while in overflow,
    // holding the exit timer.
    pub overflow: Option<TimeoutTask>,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
    pub discontinuity_time: DateTime<Utc>,
    // LSA log.
    pub lsa_log: VecDeque<LsaLogEntry<V>>,
    pub lsa_log_next_id: u32,
    // SPF log.
    pub spf_log: VecDeque<SpfLogEntry<V>>,
    pub spf_log_next_id: u32,
    // Number of neighbors performing a graceful restart.
    pub gr_helper_count: usize,
    // Ongoing graceful restart of the local instance.
    pub gr_restart: Option<GrRestartState>,
    // Authentication non-decreasing sequence number.
    pub auth_seqno: Arc<AtomicU64>,
}

// State of the local graceful restart.
#[derive(Debug)]
pub struct GrRestartState {
    pub grace_period: u32,
    pub timer: TimeoutTask,
}

#[derive(Debug, Default)]
pub struct InstanceArenas<V: Version> {
    pub areas: Areas<V>,
    pub interfaces: Arena<Interface<V>>,
    pub neighbors: Arena<Neighbor<V>>,
    pub lsa_entries: Arena<LsaEntry<V>>,
}

// Senders owned by the instance and cloned into its auxiliary tasks.
#[derive(Clone, Debug)]
pub struct InstanceChannelsTx<V: Version> {
    pub protocol_input: ProtocolInputChannelsTx<V>,
    // Packet Tx channel towards the I/O collaborator.
    pub net_tx: UnboundedSender<NetTxPacketMsg<V>>,
    // Bus channel towards the collaborating daemons.
    pub ibus: IbusSender,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx<V: Version> {
    // Interface FSM event.
    pub ism_event: UnboundedSender<IsmEventMsg>,
    // Neighbor FSM event.
    pub nsm_event: UnboundedSender<NsmEventMsg>,
    // Packet Rx event.
    pub net_packet_rx: Sender<NetRxPacketMsg<V>>,
    // Free last sent/received Database Description packets.
    pub dbdesc_free: Sender<DbDescFreeMsg>,
    // Request to send LS Update.
    pub send_lsupd: UnboundedSender<SendLsUpdateMsg>,
    // Packet retransmission interval.
    pub rxmt_interval: Sender<RxmtIntervalMsg>,
    // Delayed Ack timeout.
    pub delayed_ack_timeout: UnboundedSender<DelayedAckMsg>,
    // LSA originate event.
    pub lsa_orig_event: UnboundedSender<LsaOrigEventMsg>,
    // LSA originate check.
    pub lsa_orig_check: UnboundedSender<LsaOrigCheckMsg<V>>,
    // LSA flush event.
    pub lsa_flush: UnboundedSender<LsaFlushMsg<V>>,
    // Aging wheel tick.
    pub age_tick: UnboundedSender<AgeTickMsg>,
    // LSDB MaxAge sweep timer.
    pub lsdb_maxage_sweep_interval: Sender<LsdbMaxAgeSweepMsg>,
    // Overflow exit timer.
    pub overflow_exit: UnboundedSender<OverflowExitMsg>,
    // SPF run event.
    pub spf_delay_event: UnboundedSender<SpfDelayEventMsg>,
    // Grace period timeout.
    pub grace_period: Sender<GracePeriodMsg>,
    // Local grace period expiry.
    pub gr_restart_expiry: UnboundedSender<GrRestartExpiryMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx<V: Version> {
    pub ism_event: UnboundedReceiver<IsmEventMsg>,
    pub nsm_event: UnboundedReceiver<NsmEventMsg>,
    pub net_packet_rx: Receiver<NetRxPacketMsg<V>>,
    pub dbdesc_free: Receiver<DbDescFreeMsg>,
    pub send_lsupd: UnboundedReceiver<SendLsUpdateMsg>,
    pub rxmt_interval: Receiver<RxmtIntervalMsg>,
    pub delayed_ack_timeout: UnboundedReceiver<DelayedAckMsg>,
    pub lsa_orig_event: UnboundedReceiver<LsaOrigEventMsg>,
    pub lsa_orig_check: UnboundedReceiver<LsaOrigCheckMsg<V>>,
    pub lsa_flush: UnboundedReceiver<LsaFlushMsg<V>>,
    pub age_tick: UnboundedReceiver<AgeTickMsg>,
    pub lsdb_maxage_sweep_interval: Receiver<LsdbMaxAgeSweepMsg>,
    pub overflow_exit: UnboundedReceiver<OverflowExitMsg>,
    pub spf_delay_event: UnboundedReceiver<SpfDelayEventMsg>,
    pub grace_period: Receiver<GracePeriodMsg>,
    pub gr_restart_expiry: UnboundedReceiver<GrRestartExpiryMsg>,
}

// Receivers driven by the instance event loop.
pub struct InstanceChannelsRx<V: Version> {
    pub config: UnboundedReceiver<ConfigMsg<V>>,
    pub ibus: IbusReceiver,
    pub protocol_input: ProtocolInputChannelsRx<V>,
}

// Endpoints handed to the embedding application: configuration input, bus
// input, and both halves of the packet I/O boundary.
pub struct InstanceHandle<V: Version> {
    pub config: UnboundedSender<ConfigMsg<V>>,
    pub ibus: IbusSender,
    pub net_rx: Sender<NetRxPacketMsg<V>>,
    pub net_tx: UnboundedReceiver<NetTxPacketMsg<V>>,
}

pub struct InstanceUpView<'a, V: Version> {
    pub name: &'a str,
    pub system: &'a InstanceSys<V>,
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState<V>,
    pub tx: &'a InstanceChannelsTx<V>,
    pub shared: &'a InstanceShared,
}

// Per-version instance hooks.
pub trait InstanceVersion<V: Version> {
    const STRICT_AUTH_SEQNO_CHECK: bool;

    // Return the instance's address family (IPv4 or IPv6).
    fn address_family(instance: &Instance<V>) -> AddressFamily;

    // Return the instance's initial authentication sequence number.
    fn initial_auth_seqno() -> u64;
}

// ===== impl Instance =====

impl<V> Instance<V>
where
    V: Version,
{
    // Creates a new instance along with the receiver halves of its channels
    // and the endpoints used by the embedding application.
    pub fn new(
        name: String,
    ) -> (Instance<V>, InstanceChannelsRx<V>, InstanceHandle<V>) {
        Debug::<V>::InstanceCreate.log();

        let (protocol_input_tx, protocol_input_rx) =
            protocol_input_channels();
        let (net_tx_tx, net_tx_rx) = mpsc::unbounded_channel();
        let (config_tx, config_rx) = mpsc::unbounded_channel();
        let (ibus_tx, ibus_rx) = mpsc::unbounded_channel();

        let handle = InstanceHandle {
            config: config_tx,
            ibus: ibus_tx.clone(),
            net_rx: protocol_input_tx.net_packet_rx.clone(),
            net_tx: net_tx_rx,
        };
        let rx = InstanceChannelsRx {
            config: config_rx,
            ibus: ibus_rx,
            protocol_input: protocol_input_rx,
        };
        let instance = Instance {
            name,
            system: InstanceSys::default(),
            config: InstanceCfg::default(),
            config_round: None,
            state: None,
            arenas: Default::default(),
            tx: InstanceChannelsTx {
                protocol_input: protocol_input_tx,
                net_tx: net_tx_tx,
                ibus: ibus_tx,
            },
            shared: Default::default(),
        };

        (instance, rx, handle)
    }

    // Drives the instance: a single task owns all protocol state and runs
    // every handler to completion.
    pub async fn run(mut self, mut rx: InstanceChannelsRx<V>) {
        loop {
            tokio::select! {
                biased;
                msg = rx.config.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(error) =
                        configuration::process_config_msg(&mut self, msg)
                    {
                        tracing::warn!(%error, "configuration rejected");
                    }
                }
                msg = rx.ibus.recv() => {
                    let Some(msg) = msg else { break };
                    self.process_ibus_msg(msg);
                }
                msg = rx.protocol_input.recv() => {
                    let Some(msg) = msg else { break };
                    self.process_protocol_msg(msg);
                }
            }
        }

        self.shutdown();
    }

    // Checks if the instance needs to be started or stopped in response to a
    // configuration or southbound event.
    pub(crate) fn update(&mut self) {
        let router_id = self.get_router_id();

        match self.is_ready(router_id) {
            Ok(()) if !self.is_active() => {
                let af = V::address_family(self);
                self.start(af, router_id.unwrap());
            }
            Err(reason) if self.is_active() => {
                self.stop(reason);
            }
            _ => (),
        }
    }

    fn start(&mut self, af: AddressFamily, router_id: Ipv4Addr) {
        Debug::<V>::InstanceStart.log();

        let mut state = InstanceState::new(af, router_id);

        // Start the aging wheel cadence.
        state.age_tick = Some(tasks::age_tick_interval::<V>(
            &self.tx.protocol_input.age_tick,
        ));

        // Store instance initial state.
        self.state = Some(state);

        let (instance, arenas) = self.as_up().unwrap();
        for area in arenas.areas.iter() {
            // Try to start interfaces.
            for iface_idx in area.interfaces.indexes() {
                let iface = &mut arenas.interfaces[iface_idx];

                iface.update(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                );
            }

            // Originate the initial per-area LSAs.
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::AreaStart { area_id: area.id },
            );
        }

        // Enter the hitless restart state when resuming after a planned
        // restart.
        if self.config.gr.restart_enabled {
            let (mut instance, arenas) = self.as_up().unwrap();
            gr::restart_initiate(&mut instance, arenas);
        }
    }

    fn stop(&mut self, reason: InstanceInactiveReason) {
        if !self.is_active() {
            return;
        }

        Debug::<V>::InstanceStop(reason).log();

        // Flush all self-originated LSAs.
        let (mut instance, arenas) = self.as_up().unwrap();
        lsdb::flush_all_self_originated(&mut instance, arenas);

        // Uninstall all routes.
        for (dest, route) in instance
            .state
            .rib
            .iter()
            .filter(|(_, route)| route.flags.contains(RouteNetFlags::INSTALLED))
        {
            crate::southbound::route_uninstall(&instance, dest, route);
        }

        for area in arenas.areas.iter_mut() {
            // Clear area's state.
            area.state = Default::default();

            // Stop interfaces.
            for iface_idx in area.interfaces.indexes() {
                let iface = &mut arenas.interfaces[iface_idx];
                if iface.is_down() || iface.is_passive() {
                    continue;
                }

                // Send pending LS Updates.
                output::send_lsupd(
                    None,
                    iface,
                    area,
                    &instance,
                    &mut arenas.neighbors,
                );

                let reason = crate::debug::InterfaceInactiveReason::InstanceDown;
                iface.fsm(
                    area,
                    &instance,
                    &mut arenas.neighbors,
                    &arenas.lsa_entries,
                    ism::Event::InterfaceDown(reason),
                );
            }
        }

        // Clear instance state.
        self.state = None;
    }

    pub(crate) fn reset(&mut self) {
        if self.is_active() {
            self.stop(InstanceInactiveReason::Resetting);
            self.update();
        }
    }

    fn shutdown(&mut self) {
        // Ensure instance is disabled before exiting.
        self.stop(InstanceInactiveReason::AdminDown);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.is_some()
    }

    // Returns whether the instance is ready for OSPF operation.
    fn is_ready(
        &self,
        router_id: Option<Ipv4Addr>,
    ) -> Result<(), InstanceInactiveReason> {
        if !self.config.enabled || self.arenas.interfaces.is_empty() {
            return Err(InstanceInactiveReason::AdminDown);
        }

        if router_id.is_none() {
            return Err(InstanceInactiveReason::MissingRouterId);
        }

        Ok(())
    }

    pub(crate) fn get_router_id(&self) -> Option<Ipv4Addr> {
        self.config.router_id.or(self.system.router_id)
    }

    fn process_ibus_msg(&mut self, msg: IbusMsg) {
        if let Err(error) = ibus::process_ibus_msg(self, msg) {
            error.log();
        }
    }

    fn process_protocol_msg(&mut self, msg: ProtocolInputMsg<V>) {
        // Ignore event if the instance isn't active.
        if let Some((mut instance, arenas)) = self.as_up()
            && let Err(error) =
                events::process_protocol_msg(&mut instance, arenas, msg)
        {
            error.log();
        }
    }

    pub(crate) fn as_up(
        &mut self,
    ) -> Option<(InstanceUpView<'_, V>, &mut InstanceArenas<V>)> {
        if let Some(state) = &mut self.state {
            let instance = InstanceUpView {
                name: &self.name,
                system: &self.system,
                config: &self.config,
                state,
                tx: &self.tx,
                shared: &self.shared,
            };
            Some((instance, &mut self.arenas))
        } else {
            None
        }
    }
}

impl<V> std::fmt::Debug for Instance<V>
where
    V: Version,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance").field("name", &self.name).finish()
    }
}

impl<V> Drop for Instance<V>
where
    V: Version,
{
    fn drop(&mut self) {
        Debug::<V>::InstanceDelete.log();
    }
}

// ===== impl InstanceSys =====

impl<V> Default for InstanceSys<V>
where
    V: Version,
{
    fn default() -> InstanceSys<V> {
        InstanceSys {
            router_id: None,
            redistributed: Default::default(),
            redistribute_input: Default::default(),
            ext_lsa_ids: Default::default(),
            next_ext_lsa_id: 0,
        }
    }
}

// ===== impl InstanceState =====

impl<V> InstanceState<V>
where
    V: Version,
{
    fn new(af: AddressFamily, router_id: Ipv4Addr) -> InstanceState<V> {
        InstanceState {
            af,
            router_id,
            lsdb: Default::default(),
            age_tick: None,
            spf_last_event_rcvd: None,
            spf_last_time: None,
            spf_delay_state: spf::fsm::State::Quiet,
            spf_delay_timer: None,
            spf_hold_down_timer: None,
            spf_learn_timer: None,
            spf_trigger_lsas: Default::default(),
            spf_schedule_time: None,
            rib: Default::default(),
            nssa_translated: Default::default(),
            ext_orig_budget: u32::MAX,
            ext_orig_backlog: Default::default(),
            overflow: None,
            orig_lsa_count: 0,
            rx_lsa_count: 0,
            discontinuity_time: Utc::now(),
            lsa_log: Default::default(),
            lsa_log_next_id: 0,
            spf_log: Default::default(),
            spf_log_next_id: 0,
            gr_helper_count: 0,
            gr_restart: None,
            auth_seqno: Arc::new(V::initial_auth_seqno().into()),
        }
    }
}

// ===== impl ProtocolInputChannelsTx =====

impl<V> ProtocolInputChannelsTx<V>
where
    V: Version,
{
    pub(crate) fn ism_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        event: ism::Event,
    ) {
        let _ = self.ism_event.send(IsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            event,
        });
    }

    pub(crate) fn nsm_event(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        let _ = self.nsm_event.send(NsmEventMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: nbr_id.into(),
            event,
        });
    }

    pub(crate) fn send_lsupd(
        &self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        let _ = self.send_lsupd.send(SendLsUpdateMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: nbr_id.map(std::convert::Into::into),
        });
    }

    pub(crate) fn lsa_orig_event(&self, event: LsaOriginateEvent) {
        let _ = self.lsa_orig_event.send(LsaOrigEventMsg { event });
    }

    pub(crate) fn lsa_orig_check(
        &self,
        lsdb_id: LsdbId,
        options: Option<V::PacketOptions>,
        lsa_id: Ipv4Addr,
        lsa_body: V::LsaBody,
    ) {
        let _ = self.lsa_orig_check.send(LsaOrigCheckMsg {
            lsdb_key: lsdb_id.into(),
            options,
            lsa_id,
            lsa_body,
        });
    }

    pub(crate) fn lsa_flush(
        &self,
        lsdb_id: LsdbId,
        entry_id: LsaEntryId,
        reason: LsaFlushReason,
    ) {
        let _ = self.lsa_flush.send(LsaFlushMsg {
            lsdb_key: lsdb_id.into(),
            entry_key: entry_id.into(),
            reason,
        });
    }

    pub(crate) fn spf_delay_event(&self, event: spf::fsm::Event) {
        let _ = self.spf_delay_event.send(SpfDelayEventMsg { event });
    }
}

// ===== impl ProtocolInputChannelsRx =====

impl<V> ProtocolInputChannelsRx<V>
where
    V: Version,
{
    async fn recv(&mut self) -> Option<ProtocolInputMsg<V>> {
        tokio::select! {
            biased;
            msg = self.ism_event.recv() => {
                msg.map(ProtocolInputMsg::IsmEvent)
            }
            msg = self.nsm_event.recv() => {
                msg.map(ProtocolInputMsg::NsmEvent)
            }
            msg = self.net_packet_rx.recv() => {
                msg.map(ProtocolInputMsg::NetRxPacket)
            }
            msg = self.dbdesc_free.recv() => {
                msg.map(ProtocolInputMsg::DbDescFree)
            }
            msg = self.send_lsupd.recv() => {
                msg.map(ProtocolInputMsg::SendLsUpdate)
            }
            msg = self.rxmt_interval.recv() => {
                msg.map(ProtocolInputMsg::RxmtInterval)
            }
            msg = self.delayed_ack_timeout.recv() => {
                msg.map(ProtocolInputMsg::DelayedAck)
            }
            msg = self.lsa_orig_event.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigEvent)
            }
            msg = self.lsa_orig_check.recv() => {
                msg.map(ProtocolInputMsg::LsaOrigCheck)
            }
            msg = self.lsa_flush.recv() => {
                msg.map(ProtocolInputMsg::LsaFlush)
            }
            msg = self.age_tick.recv() => {
                msg.map(ProtocolInputMsg::AgeTick)
            }
            msg = self.lsdb_maxage_sweep_interval.recv() => {
                msg.map(ProtocolInputMsg::LsdbMaxAgeSweep)
            }
            msg = self.overflow_exit.recv() => {
                msg.map(ProtocolInputMsg::OverflowExit)
            }
            msg = self.spf_delay_event.recv() => {
                msg.map(ProtocolInputMsg::SpfDelayEvent)
            }
            msg = self.grace_period.recv() => {
                msg.map(ProtocolInputMsg::GracePeriod)
            }
            msg = self.gr_restart_expiry.recv() => {
                msg.map(ProtocolInputMsg::GrRestartExpiry)
            }
        }
    }
}

// ===== helper functions =====

fn protocol_input_channels<V>()
-> (ProtocolInputChannelsTx<V>, ProtocolInputChannelsRx<V>)
where
    V: Version,
{
    let (ism_event_tx, ism_event_rx) = mpsc::unbounded_channel();
    let (nsm_event_tx, nsm_event_rx) = mpsc::unbounded_channel();
    let (rx_packet_tx, rx_packet_rx) = mpsc::channel(4);
    let (dbdesc_free_tx, dbdesc_free_rx) = mpsc::channel(4);
    let (send_lsupd_tx, send_lsupd_rx) = mpsc::unbounded_channel();
    let (rxmt_interval_tx, rxmt_interval_rx) = mpsc::channel(4);
    let (delayed_ack_timeout_tx, delayed_ack_timeout_rx) =
        mpsc::unbounded_channel();
    let (lsa_orig_event_tx, lsa_orig_event_rx) = mpsc::unbounded_channel();
    let (lsa_orig_check_tx, lsa_orig_check_rx) = mpsc::unbounded_channel();
    let (lsa_flush_tx, lsa_flush_rx) = mpsc::unbounded_channel();
    let (age_tick_tx, age_tick_rx) = mpsc::unbounded_channel();
    let (lsdb_maxage_sweep_interval_tx, lsdb_maxage_sweep_interval_rx) =
        mpsc::channel(4);
    let (overflow_exit_tx, overflow_exit_rx) = mpsc::unbounded_channel();
    let (spf_delay_event_tx, spf_delay_event_rx) = mpsc::unbounded_channel();
    let (grace_period_tx, grace_period_rx) = mpsc::channel(4);
    let (gr_restart_expiry_tx, gr_restart_expiry_rx) = mpsc::unbounded_channel();

    let tx = ProtocolInputChannelsTx {
        ism_event: ism_event_tx,
        nsm_event: nsm_event_tx,
        net_packet_rx: rx_packet_tx,
        dbdesc_free: dbdesc_free_tx,
        send_lsupd: send_lsupd_tx,
        rxmt_interval: rxmt_interval_tx,
        delayed_ack_timeout: delayed_ack_timeout_tx,
        lsa_orig_event: lsa_orig_event_tx,
        lsa_orig_check: lsa_orig_check_tx,
        lsa_flush: lsa_flush_tx,
        age_tick: age_tick_tx,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_interval_tx,
        overflow_exit: overflow_exit_tx,
        spf_delay_event: spf_delay_event_tx,
        grace_period: grace_period_tx,
        gr_restart_expiry: gr_restart_expiry_tx,
    };
    let rx = ProtocolInputChannelsRx {
        ism_event: ism_event_rx,
        nsm_event: nsm_event_rx,
        net_packet_rx: rx_packet_rx,
        dbdesc_free: dbdesc_free_rx,
        send_lsupd: send_lsupd_rx,
        rxmt_interval: rxmt_interval_rx,
        delayed_ack_timeout: delayed_ack_timeout_rx,
        lsa_orig_event: lsa_orig_event_rx,
        lsa_orig_check: lsa_orig_check_rx,
        lsa_flush: lsa_flush_rx,
        age_tick: age_tick_rx,
        lsdb_maxage_sweep_interval: lsdb_maxage_sweep_interval_rx,
        overflow_exit: overflow_exit_rx,
        spf_delay_event: spf_delay_event_rx,
        grace_period: grace_period_rx,
        gr_restart_expiry: gr_restart_expiry_rx,
    };

    (tx, rx)
}
