//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use derive_new::new;
use rospf_utils::ip::AddressFamily;

use crate::area::Area;
use crate::collections::{Areas, Arena, Lsdb};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::lsdb::{LsaEntry, LsaLogId};
use crate::neighbor::Neighbor;
use crate::packet::lsa::{Lsa, LsaKey};
use crate::route::{Nexthops, PathType, RouteRtr};
use crate::version::Version;
use crate::{area, gr, route, tasks};

// Bounds on the in-memory SPF run log.
const SPF_LOG_MAX_SIZE: usize = 32;
const SPF_LOG_TRIGGER_LSAS_MAX_SIZE: usize = 8;

#[derive(Debug, new)]
pub struct Vertex<V: Version> {
    pub id: V::VertexId,
    pub lsa: V::VertexLsa,
    pub distance: u16,
    pub hops: u16,
    #[new(default)]
    pub nexthops: Nexthops<V::IpAddr>,
}

// What an SPF run needs to recompute, derived from the LSAs that
// triggered it: a full tree rebuild, or route updates for a limited
// set of destinations.
#[derive(Debug)]
pub enum SpfComputation<V: Version> {
    Full,
    Partial(SpfPartialComputation<V>),
}

#[derive(Debug)]
pub struct SpfPartialComputation<V: Version> {
    pub intra: BTreeSet<V::IpNetwork>,
    pub inter_network: BTreeSet<V::IpNetwork>,
    pub inter_router: BTreeSet<Ipv4Addr>,
    pub external: BTreeSet<V::IpNetwork>,
}

#[derive(Debug, new)]
pub struct SpfLink<'a, V: Version> {
    pub parent: Option<(usize, &'a V::LsaRouterLink)>,
    pub id: V::VertexId,
    pub lsa: V::VertexLsa,
    pub cost: u16,
}

#[derive(Debug)]
pub struct SpfIntraAreaNetwork<'a, V: Version> {
    pub vertex: &'a Vertex<V>,
    pub prefix: V::IpNetwork,
    pub prefix_options: V::PrefixOptions,
    pub metric: u16,
}

#[derive(Debug)]
pub struct SpfInterAreaNetwork<V: Version> {
    pub adv_rtr: Ipv4Addr,
    pub prefix: V::IpNetwork,
    pub prefix_options: V::PrefixOptions,
    pub metric: u32,
}

#[derive(Debug)]
pub struct SpfInterAreaRouter<V: Version> {
    pub adv_rtr: Ipv4Addr,
    pub router_id: Ipv4Addr,
    pub options: V::PacketOptions,
    pub flags: V::LsaRouterFlags,
    pub metric: u32,
}

#[derive(Debug)]
pub struct SpfExternalNetwork<V: Version> {
    pub adv_rtr: Ipv4Addr,
    pub e_bit: bool,
    pub prefix: V::IpNetwork,
    pub prefix_options: V::PrefixOptions,
    pub metric: u32,
    pub fwd_addr: Option<V::IpAddr>,
    pub tag: Option<u32>,
}

#[derive(Debug, new)]
pub struct SpfTriggerLsa<V: Version> {
    pub old: Option<Arc<Lsa<V>>>,
    pub new: Arc<Lsa<V>>,
    pub log_id: LsaLogId<V>,
}

#[derive(Debug)]
pub enum SpfLogType {
    Full,
    Intra,
    Inter,
    External,
}

#[derive(Debug, new)]
pub struct SpfLogEntry<V: Version> {
    pub id: u32,
    pub spf_type: SpfLogType,
    pub schedule_time: Instant,
    pub start_time: Instant,
    pub end_time: Instant,
    pub trigger_lsas: Vec<LsaLogId<V>>,
}

// Per-version pieces of the route computation: vertex identity and
// lookup, link enumeration, and the iterators feeding the inter-area,
// external and NSSA route calculations.
pub trait SpfVersion<V: Version> {
    type VertexId: VertexIdVersion;
    type VertexLsa: VertexLsaVersion<V>;

    // Classifies the trigger LSAs into the computation that has to run.
    fn spf_computation_type(
        trigger_lsas: &[SpfTriggerLsa<V>],
    ) -> SpfComputation<V>;

    // Nexthop calculation for a destination directly connected to the
    // root or reached through a directly connected network.
    fn calc_nexthops(
        area: &Area<V>,
        parent: &Vertex<V>,
        parent_link: Option<(usize, &V::LsaRouterLink)>,
        dest_id: V::VertexId,
        dest_lsa: &V::VertexLsa,
        interfaces: &Arena<Interface<V>>,
        neighbors: &Arena<Neighbor<V>>,
        lsa_entries: &Arena<LsaEntry<V>>,
    ) -> Result<Nexthops<V::IpAddr>, Error<V>>;

    // Looks up the LSA backing a vertex.
    fn vertex_lsa_find(
        af: AddressFamily,
        id: V::VertexId,
        area: &Area<V>,
        lsa_entries: &Arena<LsaEntry<V>>,
    ) -> Option<V::VertexLsa>;

    // Enumerates the links a vertex advertises.
    fn vertex_lsa_links<'a>(
        vertex_lsa: &'a Self::VertexLsa,
        af: AddressFamily,
        area: &'a Area<V>,
        lsa_entries: &'a Arena<LsaEntry<V>>,
    ) -> Box<dyn Iterator<Item = SpfLink<'a, V>> + 'a>;

    // Stub networks attached to the area's SPT vertices.
    fn intra_area_networks<'a>(
        area: &'a Area<V>,
        lsa_entries: &'a Arena<LsaEntry<V>>,
    ) -> Box<dyn Iterator<Item = SpfIntraAreaNetwork<'a, V>> + 'a>;

    // Summarized networks advertised into the area.
    fn inter_area_networks<'a>(
        area: &'a Area<V>,
        lsa_entries: &'a Arena<LsaEntry<V>>,
    ) -> Box<dyn Iterator<Item = SpfInterAreaNetwork<V>> + 'a>;

    // Summarized ASBR reachability advertised into the area.
    fn inter_area_routers<'a>(
        lsdb: &'a Lsdb<V>,
        lsa_entries: &'a Arena<LsaEntry<V>>,
    ) -> Box<dyn Iterator<Item = SpfInterAreaRouter<V>> + 'a>;

    // AS-external destinations.
    fn external_networks<'a>(
        lsdb: &'a Lsdb<V>,
        lsa_entries: &'a Arena<LsaEntry<V>>,
    ) -> Box<dyn Iterator<Item = SpfExternalNetwork<V>> + 'a>;

    // Type-7 destinations within an NSSA.
    fn nssa_networks<'a>(
        area: &'a Area<V>,
        lsa_entries: &'a Arena<LsaEntry<V>>,
    ) -> Box<dyn Iterator<Item = SpfExternalNetwork<V>> + 'a>;

    // Resolves the far-end address of a virtual link across its
    // transit area.
    fn virtual_link_endpoint(
        area: &Area<V>,
        nbr_router_id: Ipv4Addr,
        lsa_entries: &Arena<LsaEntry<V>>,
    ) -> Option<V::NetIpAddr>;
}

// Vertex identifier ordering matters: network vertices sort before
// router vertices so the tree calculation finds every equal-cost path.
pub trait VertexIdVersion
where
    Self: Send
        + Sync
        + Clone
        + Copy
        + std::fmt::Debug
        + Eq
        + Ord
        + PartialEq
        + PartialOrd,
{
    fn new_root(router_id: Ipv4Addr) -> Self;
}

pub trait VertexLsaVersion<V: Version>
where
    Self: Send + Sync + std::fmt::Debug,
{
    fn is_router(&self) -> bool;
    fn router_v_bit(&self) -> bool;
    fn router_id(&self) -> Ipv4Addr;
    fn router_options(&self) -> V::PacketOptions;
    fn router_flags(&self) -> V::LsaRouterFlags;
    fn origin(&self) -> LsaKey<V::LsaType>;
}

// SPF scheduling state machine (RFC 8405).
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Quiet,
        ShortWait,
        LongWait,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        Igp,
        DelayTimer,
        HoldDownTimer,
        LearnTimer,
        ConfigChange,
    }
}

// ===== global functions =====

pub(crate) fn fsm<V>(
    event: fsm::Event,
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    Debug::<V>::SpfDelayFsmEvent(&instance.state.spf_delay_state, &event)
        .log();

    instance.state.spf_last_event_rcvd = Some(Instant::now());

    let next_state = match (instance.state.spf_delay_state, &event) {
        // First IGP event out of the quiet period: schedule a fast SPF
        // run and arm the learn and hold-down timers.
        (fsm::State::Quiet, fsm::Event::Igp) => {
            spf_timer_arm(instance, instance.config.spf_initial_delay);

            let task = tasks::spf_delay_timer(
                instance,
                fsm::Event::LearnTimer,
                instance.config.spf_time_to_learn,
            );
            instance.state.spf_learn_timer = Some(task);

            let task = tasks::spf_delay_timer(
                instance,
                fsm::Event::HoldDownTimer,
                instance.config.spf_hold_down,
            );
            instance.state.spf_hold_down_timer = Some(task);

            Some(fsm::State::ShortWait)
        }
        // Further events while short-waiting keep pushing the hold-down
        // out and schedule with the short delay.
        (fsm::State::ShortWait, fsm::Event::Igp) => {
            hold_down_restart(instance);
            spf_timer_arm(instance, instance.config.spf_short_delay);
            None
        }
        // Learn timer firing means the network is still churning past
        // the learning window; switch to the long delay.
        (fsm::State::ShortWait, fsm::Event::LearnTimer) => {
            instance.state.spf_learn_timer = None;
            Some(fsm::State::LongWait)
        }
        (fsm::State::LongWait, fsm::Event::Igp) => {
            hold_down_restart(instance);
            spf_timer_arm(instance, instance.config.spf_long_delay);
            None
        }
        // A full hold-down interval with no IGP events: the network is
        // stable again.
        (fsm::State::LongWait, fsm::Event::HoldDownTimer) => {
            instance.state.spf_hold_down_timer = None;
            Some(fsm::State::Quiet)
        }
        (fsm::State::ShortWait, fsm::Event::HoldDownTimer) => {
            instance.state.spf_hold_down_timer = None;
            instance.state.spf_learn_timer = None;
            Some(fsm::State::Quiet)
        }
        // The scheduled run fires in any state.
        (_, fsm::Event::DelayTimer) => {
            instance.state.spf_delay_timer = None;
            compute_spf(instance, arenas, false);
            None
        }
        // Configuration changes force an immediate full run; the
        // scheduled run is superseded but the other timers stand.
        (_, fsm::Event::ConfigChange) => {
            instance.state.spf_delay_timer = None;
            compute_spf(instance, arenas, true);
            None
        }
        _ => {
            return Err(Error::SpfDelayUnexpectedEvent(
                instance.state.spf_delay_state,
                event,
            ));
        }
    };

    if let Some(next_state) = next_state
        && next_state != instance.state.spf_delay_state
    {
        Debug::<V>::SpfDelayFsmTransition(
            &instance.state.spf_delay_state,
            &next_state,
        )
        .log();
        instance.state.spf_delay_state = next_state;
    }

    Ok(())
}

// ===== helper functions =====

// Arms the SPF timer with the given delay unless a run is already
// scheduled.
fn spf_timer_arm<V>(instance: &mut InstanceUpView<'_, V>, delay: u32)
where
    V: Version,
{
    if instance.state.spf_delay_timer.is_none() {
        let task =
            tasks::spf_delay_timer(instance, fsm::Event::DelayTimer, delay);
        instance.state.spf_delay_timer = Some(task);
    }
}

// Restarts the hold-down timer from its full interval.
fn hold_down_restart<V>(instance: &mut InstanceUpView<'_, V>)
where
    V: Version,
{
    if let Some(timer) = &mut instance.state.spf_hold_down_timer {
        let timeout =
            Duration::from_millis(instance.config.spf_hold_down.into());
        timer.reset(Some(timeout));
    }
}

// Runs the route computation and everything that hangs off it:
// summary origination, NSSA translation, virtual link resolution and
// the graceful restart convergence check.
fn compute_spf<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    force_full_run: bool,
) where
    V: Version,
{
    let schedule_time = instance
        .state
        .spf_schedule_time
        .take()
        .unwrap_or_else(Instant::now);
    let start_time = Instant::now();

    // The LSAs that changed since the last run decide how much work is
    // needed.
    let trigger_lsas = std::mem::take(&mut instance.state.spf_trigger_lsas);
    let mut computation = match force_full_run {
        true => SpfComputation::Full,
        false => V::spf_computation_type(&trigger_lsas),
    };

    match &mut computation {
        SpfComputation::Full => {
            for area in arenas.areas.iter_mut() {
                run_area(
                    area,
                    instance,
                    &arenas.interfaces,
                    &arenas.neighbors,
                    &arenas.lsa_entries,
                );
            }
            route::update_rib_full(
                instance,
                &mut arenas.areas,
                &arenas.interfaces,
                &arenas.lsa_entries,
            );
        }
        SpfComputation::Partial(partial) => {
            route::update_rib_partial(
                partial,
                instance,
                &mut arenas.areas,
                &arenas.interfaces,
                &arenas.lsa_entries,
            );
        }
    }

    area::update_summary_lsas(
        instance,
        &mut arenas.areas,
        &arenas.interfaces,
        &arenas.lsa_entries,
    );
    area::update_type7_translation(
        instance,
        &arenas.areas,
        &arenas.interfaces,
        &arenas.lsa_entries,
    );
    area::update_virtual_links(instance, arenas);

    // A routing table that has converged back may complete an ongoing
    // graceful restart.
    gr::restart_convergence_check(instance, arenas);

    let end_time = Instant::now();
    instance.state.spf_last_time = Some(end_time);

    log_spf_run(
        instance,
        &computation,
        schedule_time,
        start_time,
        end_time,
        trigger_lsas,
    );
}

// Dijkstra over one area's link state database (RFC 2328, section
// 16.1).
fn run_area<V>(
    area: &mut Area<V>,
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &Arena<Interface<V>>,
    neighbors: &Arena<Neighbor<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let af = instance.state.af;
    area.state.transit_capability = false;

    // The tree grows from this router's own router LSA. Without it
    // there is nothing to compute.
    let root_id = V::VertexId::new_root(instance.state.router_id);
    let Some(root_lsa) = V::vertex_lsa_find(af, root_id, area, lsa_entries)
    else {
        Error::<V>::SpfRootNotFound(area.area_id).log();
        return;
    };
    let root = Vertex::<V>::new(root_id, root_lsa, 0, 0);

    // Candidates are keyed by (distance, id), so popping the first
    // entry always yields the closest one.
    let mut spt = BTreeMap::new();
    let mut candidates = BTreeMap::new();
    candidates.insert((root.distance, root.id), root);

    area.state.routers.clear();

    while let Some(((_, vertex_id), vertex)) = candidates.pop_first() {
        // The closest candidate's distance is final; move it onto the
        // tree.
        spt.insert(vertex.id, vertex);
        let vertex = spt.get(&vertex_id).unwrap();

        if vertex.lsa.is_router() {
            let route = RouteRtr::new(
                area.area_id,
                PathType::IntraArea,
                vertex.lsa.router_options(),
                vertex.lsa.router_flags(),
                vertex.distance.into(),
                vertex.nexthops.clone(),
            );
            area.state.routers.insert(vertex.lsa.router_id(), route);

            if vertex.lsa.router_v_bit() {
                area.state.transit_capability = true;
            }
        }

        for link in V::vertex_lsa_links(&vertex.lsa, af, area, lsa_entries) {
            // Only bidirectional connectivity counts.
            if !V::vertex_lsa_links(&link.lsa, af, area, lsa_entries)
                .any(|back| back.id == vertex.id)
            {
                continue;
            }

            // Vertices already on the tree are done.
            if spt.contains_key(&link.id) {
                continue;
            }

            let distance = vertex.distance.saturating_add(link.cost);
            let mut hops = vertex.hops;
            if link.lsa.is_router() {
                hops = hops.saturating_add(1);
            }

            // An existing candidate survives unless this path is
            // strictly shorter, in which case it's re-keyed.
            if let Some((key, cand)) = candidates
                .iter_mut()
                .find(|(_, cand)| cand.id == link.id)
            {
                match distance.cmp(&cand.distance) {
                    Ordering::Greater => continue,
                    Ordering::Equal => {}
                    Ordering::Less => {
                        let key = *key;
                        candidates.remove(&key);
                    }
                }
            }
            let cand =
                candidates.entry((distance, link.id)).or_insert_with(|| {
                    Vertex::new(link.id, link.lsa, distance, hops)
                });

            // Equal-cost paths accumulate their nexthops.
            match calc_nexthops(
                area,
                vertex,
                link.parent,
                link.id,
                &cand.lsa,
                interfaces,
                neighbors,
                lsa_entries,
            ) {
                Ok(nexthops) => cand.nexthops.extend(nexthops),
                Err(error) => error.log(),
            }
        }
    }

    area.state.spt = spt;

    area.state.spf_run_count += 1;
    area.state.discontinuity_time = Utc::now();
}

fn calc_nexthops<V>(
    area: &Area<V>,
    parent: &Vertex<V>,
    parent_link: Option<(usize, &V::LsaRouterLink)>,
    dest_id: V::VertexId,
    dest_lsa: &V::VertexLsa,
    interfaces: &Arena<Interface<V>>,
    neighbors: &Arena<Neighbor<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
) -> Result<Nexthops<V::IpAddr>, Error<V>>
where
    V: Version,
{
    if parent.hops == 0 {
        // Destination is adjacent to the root, directly or across one
        // transit network; the version-specific rules apply.
        V::calc_nexthops(
            area,
            parent,
            parent_link,
            dest_id,
            dest_lsa,
            interfaces,
            neighbors,
            lsa_entries,
        )
    } else {
        // Past the first router hop every descendant inherits the
        // parent's nexthops.
        Ok(parent.nexthops.clone())
    }
}

fn log_spf_run<V>(
    instance: &mut InstanceUpView<'_, V>,
    computation: &SpfComputation<V>,
    schedule_time: Instant,
    start_time: Instant,
    end_time: Instant,
    trigger_lsas: Vec<SpfTriggerLsa<V>>,
) where
    V: Version,
{
    let log_id = &mut instance.state.spf_log_next_id;
    *log_id += 1;

    let spf_log_type = match computation {
        SpfComputation::Full => SpfLogType::Full,
        SpfComputation::Partial(partial) => {
            if !partial.intra.is_empty() {
                SpfLogType::Intra
            } else if !partial.inter_network.is_empty() {
                SpfLogType::Inter
            } else {
                SpfLogType::External
            }
        }
    };

    let trigger_lsas = trigger_lsas
        .into_iter()
        .take(SPF_LOG_TRIGGER_LSAS_MAX_SIZE)
        .map(|tlsa| tlsa.log_id)
        .collect();

    let log_entry = SpfLogEntry::new(
        *log_id,
        spf_log_type,
        schedule_time,
        start_time,
        end_time,
        trigger_lsas,
    );
    instance.state.spf_log.push_front(log_entry);
    instance.state.spf_log.truncate(SPF_LOG_MAX_SIZE);
}
