//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{btree_map, hash_map};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use chrono::Utc;
use derive_new::new;
use rospf_utils::southbound::RedistMetricType;
use serde::{Deserialize, Serialize};

use crate::area::{Area, AreaType};
use crate::collections::{
    AreaId, AreaIndex, Areas, Arena, InterfaceId, InterfaceIndex, LsaEntryId,
    LsaEntryIndex, LsdbId, LsdbIndex, lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::gr;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::packet::lsa::{
    GrReason, Lsa, LsaBodyVersion, LsaHdrVersion, LsaKey, LsaTypeVersion,
};
use crate::route::{SummaryNet, SummaryRtr};
use crate::spf;
use crate::spf::SpfTriggerLsa;
use crate::tasks;
use crate::version::Version;

// Architectural constants of RFC 2328, appendix B.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_INFINITY: u32 = 0x00ffffff;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_RESERVED_SEQ_NO: u32 = 0x80000000;
pub const LSA_MIN_INTERVAL: u16 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;
pub const LSA_DO_NOT_AGE: u16 = 0x8000;
pub const MAX_LINK_METRIC: u16 = 0xffff;

// Bound on the in-memory LSA log.
const LSA_LOG_MAX_SIZE: usize = 64;

#[derive(Debug)]
pub struct LsaEntry<V: Version> {
    pub id: LsaEntryId,
    pub data: Arc<Lsa<V>>,
    // Aging wheel bin holding this entry (`None` for DoNotAge and MaxAge
    // entries).
    pub bin: Option<usize>,
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub enum LsaOriginateEvent {
    AreaStart {
        area_id: AreaId,
    },
    InterfaceStateChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceDrChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceAddrAddDel {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    InterfaceCostChange {
        area_id: AreaId,
    },
    NeighborToFromFull {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    NeighborInterfaceIdChange {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    LinkLsaRcvd {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    SelfOriginatedLsaRcvd {
        lsdb_id: LsdbId,
        entry_id: LsaEntryId,
    },
    StubRouterChange,
    GrHelperExit {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
}

// An LSA whose origination was postponed by the MinLSInterval check. The
// aging wheel releases it once the previous instance turns five seconds
// old.
#[derive(Debug)]
pub struct LsaDelayedOrig<V: Version> {
    pub data: Lsa<V>,
}

// A route redistributed from another protocol, pending or active as a
// self-originated external LSA.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct ExternalRoute<V: Version> {
    pub metric: u32,
    pub metric_type: RedistMetricType,
    pub tag: u32,
    pub fwd_addr: Option<V::IpAddr>,
}

#[derive(Debug, new)]
pub struct LsaLogEntry<V: Version> {
    pub id: u32,
    pub lsa: LsaLogId<V>,
    pub rcvd_time: Option<Instant>,
    pub reason: LsaLogReason,
}

#[derive(Clone, Debug)]
pub struct LsaLogId<V: Version> {
    pub area_id: Option<Ipv4Addr>,
    pub lsa_type: V::LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
}

#[derive(Debug)]
pub enum LsaLogReason {
    Refresh,
    ContentChange,
    Purge,
}

// Per-version origination and installation rules.
pub trait LsdbVersion<V: Version> {
    // Whether the given LSA type may enter this area or be sent to
    // this neighbor.
    fn lsa_type_is_valid(
        area_type: Option<AreaType>,
        nbr_options: Option<V::PacketOptions>,
        lsa_type: V::LsaType,
    ) -> bool;

    // Tells whether this router originated the LSA.
    fn lsa_is_self_originated(
        lsa: &Lsa<V>,
        router_id: Ipv4Addr,
        interfaces: &Arena<Interface<V>>,
    ) -> bool;

    // Reacts to an origination event by issuing or withdrawing the
    // affected self-originated LSAs.
    fn lsa_orig_event(
        instance: &InstanceUpView<'_, V>,
        arenas: &InstanceArenas<V>,
        event: LsaOriginateEvent,
    ) -> Result<(), Error<V>>;

    // Originate Type-3 Summary LSA (OSPFv2) or Inter-Area-Prefix-LSA
    // (OSPFv3).
    fn lsa_orig_inter_area_network(
        area: &mut Area<V>,
        instance: &InstanceUpView<'_, V>,
        prefix: V::IpNetwork,
        lsa_id: Option<u32>,
        summary: &SummaryNet<V>,
    ) -> u32;

    // Originate Type-4 Summary LSA (OSPFv2) or Inter-Area-Router-LSA
    // (OSPFv3).
    fn lsa_orig_inter_area_router(
        area: &mut Area<V>,
        instance: &InstanceUpView<'_, V>,
        router_id: Ipv4Addr,
        lsa_id: Option<u32>,
        summary: &SummaryRtr<V>,
    ) -> u32;

    // Originate an AS-external LSA (and NSSA LSAs for attached NSSA areas)
    // for a redistributed route, or flush it when `route` is `None`.
    fn lsa_orig_external(
        instance: &InstanceUpView<'_, V>,
        arenas: &InstanceArenas<V>,
        prefix: V::IpNetwork,
        route: Option<&ExternalRoute<V>>,
    );

    // Build the AS-external LSA body equivalent to the given NSSA LSA, for
    // Type-7 to Type-5 translation at an NSSA border router. Returns the
    // external prefix, the LSA-ID and options to use, and the body. `None`
    // means the LSA is not eligible for translation (e.g. P-bit clear).
    fn lsa_translate_type7(
        instance: &InstanceUpView<'_, V>,
        lsa: &Lsa<V>,
    ) -> Option<(V::IpNetwork, Ipv4Addr, Option<V::PacketOptions>, V::LsaBody)>;

    // Check whether the LSA is a non-default AS-external LSA, for the
    // purposes of the database overflow limit.
    fn lsa_is_nondefault_external(lsa: &Lsa<V>) -> bool;

    // Build a link-scope Grace-LSA announcing the given grace period.
    // Returns the LSA-ID and options to use along with the body.
    fn grace_lsa_body(
        iface: &Interface<V>,
        grace_period: u32,
        reason: GrReason,
    ) -> (Ipv4Addr, Option<V::PacketOptions>, V::LsaBody);

    // Maps an LSA type to the scope of LSDB it lives in.
    fn lsdb_get_by_lsa_type(
        iface_idx: InterfaceIndex,
        area_idx: AreaIndex,
        lsa_type: V::LsaType,
    ) -> LsdbIndex;

    // Version-specific hook run after an LSA is installed.
    fn lsdb_install(
        instance: &mut InstanceUpView<'_, V>,
        arenas: &mut InstanceArenas<V>,
        lsdb_idx: LsdbIndex,
        lsdb_id: LsdbId,
        lsa: &Lsa<V>,
    );
}

// ===== impl LsaEntry =====

impl<V> LsaEntry<V>
where
    V: Version,
{
    pub(crate) fn new(id: LsaEntryId, data: Arc<Lsa<V>>) -> LsaEntry<V> {
        LsaEntry {
            id,
            data,
            bin: None,
            flags: Default::default(),
        }
    }
}

// ===== impl LsaLogId =====

impl<V> LsaLogId<V>
where
    V: Version,
{
    pub(crate) fn new(
        areas: &Areas<V>,
        lsdb_idx: LsdbIndex,
        lsa: &Lsa<V>,
    ) -> Self {
        let area_id = match lsdb_idx {
            LsdbIndex::Link(area_idx, _) | LsdbIndex::Area(area_idx) => {
                let area = &areas[area_idx];
                Some(area.area_id)
            }
            LsdbIndex::As => None,
        };

        LsaLogId {
            area_id,
            lsa_type: lsa.hdr.lsa_type(),
            lsa_id: lsa.hdr.lsa_id(),
            adv_rtr: lsa.hdr.adv_rtr(),
            seq_no: lsa.hdr.seq_no(),
        }
    }
}

// ===== global functions =====

// Decides which of two LSA instances is more recent (RFC 2328,
// section 13.1). Greater means `a` wins, Less means `b` wins,
// Equal means the instances are indistinguishable.
pub(crate) fn lsa_compare<V>(a: &V::LsaHdr, b: &V::LsaHdr) -> Ordering
where
    V: Version,
{
    // Sequence numbers are compared as signed 32-bit integers.
    let a_seq_no = a.seq_no() as i32;
    let b_seq_no = b.seq_no() as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    let cmp = a.cksum().cmp(&b.cksum());
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    if a.age().abs_diff(b.age()) > LSA_MAX_AGE_DIFF {
        return b.age().cmp(&a.age());
    }

    Ordering::Equal
}

// Decides whether two instances carry the same contents (RFC
// 2328, section 13.2).
fn lsa_same_contents<V>(a: &Lsa<V>, b: &Lsa<V>) -> bool
where
    V: Version,
{
    if a.hdr.options() != b.hdr.options() {
        return false;
    }

    if a.hdr.is_maxage() ^ b.hdr.is_maxage() {
        return false;
    }

    if a.hdr.length() != b.hdr.length() {
        return false;
    }

    let hdr_length = V::LsaHdr::LENGTH as usize;
    a.raw[hdr_length..] == b.raw[hdr_length..]
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check<V>(entry: &LsaEntry<V>) -> bool
where
    V: Version,
{
    if !entry.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    #[cfg(feature = "deterministic")]
    {
        false
    }
    #[cfg(not(feature = "deterministic"))]
    {
        match entry.data.base_time {
            Some(lsa_base_time) => {
                lsa_base_time.elapsed().as_secs() < LSA_MIN_ARRIVAL
            }
            None => false,
        }
    }
}

// Checks if the given LSA was originated less than MinLSInterval seconds
// ago.
fn lsa_min_orig_interval_check<V>(entry: &LsaEntry<V>) -> bool
where
    V: Version,
{
    if entry.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    #[cfg(feature = "deterministic")]
    {
        false
    }
    #[cfg(not(feature = "deterministic"))]
    {
        match entry.data.base_time {
            Some(lsa_base_time) => {
                lsa_base_time.elapsed().as_secs() < LSA_MIN_INTERVAL as u64
            }
            None => false,
        }
    }
}

// Puts a received or self-originated LSA into its database and
// triggers everything that depends on the change.
pub(crate) fn install<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    lsdb_idx: LsdbIndex,
    lsa: Arc<Lsa<V>>,
) -> LsaEntryIndex
where
    V: Version,
{
    Debug::<V>::LsaInstall(&lsa.hdr).log();

    // Purge the superseded instance from every retransmission list.
    rxmt_lists_remove(arenas, lsdb_idx, &lsa);

    let (lsdb_id, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    // The superseded instance, if any, leaves the database first.
    let old_lsa = match lsdb.get(&arenas.lsa_entries, &lsa.hdr.key()) {
        Some((old_entry_idx, old_entry)) => {
            let old_lsa = old_entry.data.clone();
            lsdb.delete(&mut arenas.lsa_entries, old_entry_idx);
            Some(old_lsa)
        }
        None => None,
    };

    let (entry_idx, entry) = lsdb.insert(
        &mut arenas.lsa_entries,
        lsdb_id,
        lsa.clone(),
        &instance.tx.protocol_input,
    );

    // Mark our own LSAs on the way in.
    if V::lsa_is_self_originated(
        &entry.data,
        instance.state.router_id,
        &arenas.interfaces,
    ) {
        entry.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }

    // Routes only need recomputing when the contents changed (RFC
    // 2328, section 13.2). Unknown types and self-originated
    // summaries don't feed the computation either.
    let mut content_change = true;
    if let Some(old_lsa) = &old_lsa
        && lsa_same_contents(old_lsa, &lsa)
    {
        content_change = false;
    }
    let lsa_type = lsa.hdr.lsa_type();
    let self_orig_summary = entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
        && (lsa_type == V::type3_summary() || lsa_type == V::type4_summary());
    let route_recalc =
        content_change && !lsa.body.is_unknown() && !self_orig_summary;

    // A network topology change forces the termination of a graceful
    // restart.
    if content_change
        && lsa.hdr.lsa_type().is_gr_topology_info()
        && instance.state.gr_helper_count > 0
        && instance.config.gr.helper_strict_lsa_checking
    {
        gr::helper_process_topology_change(
            Some(lsa.hdr.lsa_type()),
            instance,
            arenas,
        );
    }

    // Track the count of non-default AS-external LSAs for the overflow
    // check.
    if V::lsa_is_nondefault_external(&lsa) {
        overflow_check(instance, arenas);
    }

    V::lsdb_install(instance, arenas, lsdb_idx, lsdb_id, &lsa);

    let lsa_log_id = LsaLogId::new(&arenas.areas, lsdb_idx, &lsa);
    let reason = if lsa.hdr.is_maxage() {
        LsaLogReason::Purge
    } else if content_change {
        LsaLogReason::ContentChange
    } else {
        LsaLogReason::Refresh
    };
    log_lsa(instance, lsa_log_id.clone(), lsa.base_time, reason);

    if route_recalc {
        // Remember what changed for the partial-run classification.
        let trigger_lsa = SpfTriggerLsa::new(old_lsa, lsa, lsa_log_id);
        instance.state.spf_trigger_lsas.push(trigger_lsa);

        instance
            .state
            .spf_schedule_time
            .get_or_insert_with(Instant::now);
        instance
            .tx
            .protocol_input
            .spf_delay_event(spf::fsm::Event::Igp);
    }

    entry_idx
}

// Puts a new instance of a self-originated LSA into circulation.
pub(crate) fn originate<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    lsdb_idx: LsdbIndex,
    lsa: Lsa<V>,
) where
    V: Version,
{
    let (_, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );

    let lsa_key = lsa.hdr.key();
    if let Some((old_entry_idx, _)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        // A sequence number at MaxSequenceNumber can't be incremented.
        // The instance is flushed first, and once every adjacency has
        // acknowledged the flush, the successor starts over at
        // InitialSequenceNumber.
        if lsa.hdr.seq_no() == LSA_MAX_SEQ_NO + 1 {
            // Park the successor and flush what's there.
            match lsdb.reissue.entry(lsa_key) {
                hash_map::Entry::Occupied(mut o) => {
                    *o.get_mut() = lsa;
                }
                hash_map::Entry::Vacant(v) => {
                    v.insert(lsa);
                }
            }
            let reason = LsaFlushReason::PrematureAging;
            flush(instance, arenas, lsdb_idx, old_entry_idx, reason);
            return;
        }

        // Reinstallation of an identity that is still awaiting its MaxAge
        // acknowledgments is deferred until the MaxAge list drains.
        if lsdb.maxage_lsas.contains(&old_entry_idx) {
            lsdb.reissue.insert(lsa_key, lsa);
            return;
        }
    }

    Debug::<V>::LsaOriginate(&lsa.hdr).log();

    let entry_idx = install(instance, arenas, lsdb_idx, Arc::new(lsa));

    let entry = &arenas.lsa_entries[entry_idx];
    flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &entry.data,
        None,
    );

    instance.state.orig_lsa_count += 1;
    instance.state.discontinuity_time = Utc::now();

    // The refresh at LSRefreshTime is driven by the LSDB aging wheel, so
    // there's no per-LSA timer to arm here.
}

// Origination entry point: applies the redundancy and pacing
// checks before anything reaches the database.
pub(crate) fn originate_check<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    lsdb_idx: LsdbIndex,
    options: Option<V::PacketOptions>,
    lsa_id: Ipv4Addr,
    lsa_body: V::LsaBody,
) where
    V: Version,
{
    let (_, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );
    let adv_rtr = instance.state.router_id;
    let lsa_key = LsaKey::new(lsa_body.lsa_type(), adv_rtr, lsa_id);

    let seq_no = lsdb
        .get(&arenas.lsa_entries, &lsa_key)
        .map(|(_, old_entry)| old_entry.data.hdr.seq_no() + 1)
        .unwrap_or(LSA_INIT_SEQ_NO);

    let lsa = Lsa::new(0, options, lsa_id, adv_rtr, seq_no, lsa_body);

    // An existing database copy shapes what happens next.
    if let Some((_, old_entry)) = lsdb.get(&arenas.lsa_entries, &lsa_key) {
        // Identical contents make a new instance pointless (RFC 2328,
        // section 12.4), unless the database copy was learned from the
        // network, in which case it must be superseded.
        // number.
        if lsa_same_contents(&old_entry.data, &lsa)
            && !old_entry.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check. Postponed originations are
        // released when the aging wheel finds the database copy at the
        // MinLSInterval offset.
        if lsdb.delayed_orig.contains_key(&lsa_key)
            || lsa_min_orig_interval_check(old_entry)
        {
            Debug::<V>::LsaOriginateMinInterval(&lsa.hdr).log();

            lsdb.delayed_orig
                .insert(lsa_key, LsaDelayedOrig { data: lsa });
            return;
        }
    }

    originate(instance, arenas, lsdb_idx, lsa);
}

// Prematurely ages an LSA out of the routing domain.
pub(crate) fn flush<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    lsdb_idx: LsdbIndex,
    entry_idx: LsaEntryIndex,
    reason: LsaFlushReason,
) where
    V: Version,
{
    // Flushing is idempotent.
    let entry = &mut arenas.lsa_entries[entry_idx];
    if entry.data.hdr.is_maxage() {
        return;
    }

    if reason == LsaFlushReason::PrematureAging {
        debug_assert!(entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED));
    }

    Debug::<V>::LsaFlush(&entry.data.hdr, reason).log();

    let mut lsa = (*entry.data).clone();
    lsa.set_maxage();
    let lsa = Arc::new(lsa);

    // Reinstall so retransmission lists and routes see the MaxAge
    // instance.
    let entry_idx = install(instance, arenas, lsdb_idx, lsa);

    let entry = &arenas.lsa_entries[entry_idx];
    let _ = flood(
        instance,
        &arenas.areas,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        lsdb_idx,
        &entry.data,
        None,
    );

    let (_, lsdb) = lsdb_index_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        lsdb_idx,
    );
    let lsa_key = entry.data.hdr.key();

    // A pending deferred origination of the same identity is void now.
    lsdb.delayed_orig.remove(&lsa_key);
}

// Withdraws every LSA this router has originated, across all
// scopes.
pub(crate) fn flush_all_self_originated<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    let reason = LsaFlushReason::PrematureAging;
    let mut idxs = vec![];

    let lsdb_idx = LsdbIndex::As;
    idxs.extend(
        instance
            .state
            .lsdb
            .iter(&arenas.lsa_entries)
            .filter(|(_, entry)| {
                entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
            })
            .map(|(entry_idx, _)| (lsdb_idx, entry_idx)),
    );

    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        let lsdb_idx = LsdbIndex::Area(area_idx);
        idxs.extend(
            area.state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter(|(_, entry)| {
                    entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
                .map(|(entry_idx, _)| (lsdb_idx, entry_idx)),
        );

        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            let lsdb_idx = LsdbIndex::Link(area_idx, iface_idx);
            idxs.extend(
                iface
                    .state
                    .lsdb
                    .iter(&arenas.lsa_entries)
                    .filter(|(_, entry)| {
                        entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                    })
                    .map(|(entry_idx, _)| (lsdb_idx, entry_idx)),
            );
        }
    }

    for (lsdb_idx, entry_idx) in idxs {
        flush(instance, arenas, lsdb_idx, entry_idx, reason);
    }
}

// ===== external route origination =====

// Originates or flushes the external LSAs for a redistributed route,
// subject to the configured flood rate and the overflow state.
pub(crate) fn orig_external_route<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    prefix: V::IpNetwork,
) where
    V: Version,
{
    let Some(route) = instance.system.redistributed.get(&prefix).cloned()
    else {
        V::lsa_orig_external(instance, arenas, prefix, None);
        return;
    };

    // While in overflow state, non-default externals must not be
    // originated.
    if instance.state.overflow.is_some() && !is_default_prefix::<V>(&prefix) {
        return;
    }

    // Enforce the configured origination rate; the backlog is drained once
    // per second by the aging tick.
    if instance.config.new_flood_rate.is_some() {
        if instance.state.ext_orig_budget == 0 {
            Debug::<V>::LsaOriginateBacklogged(&prefix).log();
            instance.state.ext_orig_backlog.push_back(prefix);
            return;
        }
        instance.state.ext_orig_budget -= 1;
    }

    V::lsa_orig_external(instance, arenas, prefix, Some(&route));
}

// Drains the rate-limited external origination backlog; called once per
// second from the aging tick.
pub(crate) fn drain_external_backlog<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    instance.state.ext_orig_budget =
        instance.config.new_flood_rate.unwrap_or(u32::MAX);

    while instance.state.ext_orig_budget > 0 {
        let Some(prefix) = instance.state.ext_orig_backlog.pop_front() else {
            break;
        };
        orig_external_route(instance, arenas, prefix);
    }
}

// Checks whether the number of non-default AS-external LSAs exceeds the
// configured limit, entering the overflow state if so.
pub(crate) fn overflow_check<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    let Some(limit) = instance.config.ext_lsdb_limit else {
        return;
    };
    if instance.state.overflow.is_some() {
        return;
    }

    let count = count_nondefault_externals(instance, arenas);
    if count <= limit {
        return;
    }

    Debug::<V>::LsdbOverflowEnter(count).log();

    // Enter the overflow state before flushing, so the flushes themselves
    // don't re-enter this check.
    let timeout = instance.config.exit_overflow_interval;
    let task = tasks::overflow_exit_timer(instance, timeout);
    instance.state.overflow = Some(task);

    // Flush self-originated non-default externals and refuse to originate
    // new ones until the exit interval elapses with the count below the
    // limit.
    let idxs = instance
        .state
        .lsdb
        .iter(&arenas.lsa_entries)
        .filter(|(_, entry)| entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED))
        .filter(|(_, entry)| V::lsa_is_nondefault_external(&entry.data))
        .map(|(entry_idx, _)| entry_idx)
        .collect::<Vec<_>>();
    for entry_idx in idxs {
        flush(
            instance,
            arenas,
            LsdbIndex::As,
            entry_idx,
            LsaFlushReason::PrematureAging,
        );
    }
}

// Handles the expiry of the overflow exit timer: leave the overflow state
// if the database shrank below the limit, otherwise wait another interval.
pub(crate) fn overflow_exit_check<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    if instance.state.overflow.is_none() {
        return;
    }

    let limit = instance.config.ext_lsdb_limit.unwrap_or(u32::MAX);
    if count_nondefault_externals(instance, arenas) < limit {
        Debug::<V>::LsdbOverflowExit.log();
        instance.state.overflow = None;

        // Reoriginate the redistributed routes that were withheld.
        for prefix in
            instance.system.redistributed.keys().copied().collect::<Vec<_>>()
        {
            orig_external_route(instance, arenas, prefix);
        }
    } else {
        let timeout = instance.config.exit_overflow_interval;
        let task = tasks::overflow_exit_timer(instance, timeout);
        instance.state.overflow = Some(task);
    }
}

fn count_nondefault_externals<V>(
    instance: &InstanceUpView<'_, V>,
    arenas: &InstanceArenas<V>,
) -> u32
where
    V: Version,
{
    instance
        .state
        .lsdb
        .iter(&arenas.lsa_entries)
        .filter(|(_, entry)| !entry.data.hdr.is_maxage())
        .filter(|(_, entry)| V::lsa_is_nondefault_external(&entry.data))
        .count() as u32
}

fn is_default_prefix<V>(prefix: &V::IpNetwork) -> bool
where
    V: Version,
{
    use rospf_utils::ip::IpNetworkKind;
    prefix.prefix() == 0
}

// ===== helper functions =====

// Walks the neighbors in the LSA's scope and purges superseded
// instances from their retransmission lists.
fn rxmt_lists_remove<V>(
    arenas: &mut InstanceArenas<V>,
    lsdb_idx: LsdbIndex,
    lsa: &Lsa<V>,
) where
    V: Version,
{
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];

        match lsdb_idx {
            LsdbIndex::Link(lsdb_area_idx, _)
            | LsdbIndex::Area(lsdb_area_idx) => {
                if area_idx != lsdb_area_idx {
                    continue;
                }
            }
            _ => (),
        }

        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];

            if let LsdbIndex::Link(_, lsdb_iface_idx) = lsdb_idx
                && iface_idx != lsdb_iface_idx
            {
                continue;
            }

            for nbr_idx in iface.state.neighbors.indexes() {
                let nbr = &mut arenas.neighbors[nbr_idx];

                // Only older instances are purged; an equal or newer copy on
                // the list is a different event.
                if let btree_map::Entry::Occupied(o) =
                    nbr.lsa_lists.ls_rxmt.entry(lsa.hdr.key())
                {
                    let old_lsa = o.get();
                    if lsa_compare::<V>(&old_lsa.hdr, &lsa.hdr)
                        == Ordering::Less
                    {
                        o.remove();
                        nbr.rxmt_lsupd_stop_check();
                    }
                }
            }
        }
    }
}

// Adds log entry for the newly installed LSA.
fn log_lsa<V>(
    instance: &mut InstanceUpView<'_, V>,
    lsa: LsaLogId<V>,
    rcvd_time: Option<Instant>,
    reason: LsaLogReason,
) where
    V: Version,
{
    let log_id = &mut instance.state.lsa_log_next_id;
    *log_id += 1;

    let log_entry = LsaLogEntry::new(*log_id, lsa, rcvd_time, reason);
    instance.state.lsa_log.push_front(log_entry);

    // Oldest entries fall off the end.
    instance.state.lsa_log.truncate(LSA_LOG_MAX_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ospfv2::packet::Options;
    use crate::ospfv2::packet::lsa::{LsaHdr, LsaType, LsaTypeCode};
    use crate::version::Ospfv2;

    fn hdr(age: u16, seq_no: u32, cksum: u16) -> LsaHdr {
        LsaHdr {
            age,
            options: Options::E,
            lsa_type: LsaType(LsaTypeCode::Router as u8),
            lsa_id: [1, 1, 1, 1].into(),
            adv_rtr: [1, 1, 1, 1].into(),
            seq_no,
            cksum,
            length: 24,
        }
    }

    #[test]
    fn compare_signed_seq_no() {
        // InitialSequenceNumber (negative as i32) loses to any positive
        // sequence number.
        let a = hdr(1, LSA_INIT_SEQ_NO, 0x1111);
        let b = hdr(1, 0x00000001, 0x1111);
        assert_eq!(lsa_compare::<Ospfv2>(&a, &b), Ordering::Less);
        assert_eq!(lsa_compare::<Ospfv2>(&b, &a), Ordering::Greater);

        // MaxSequenceNumber beats everything.
        let c = hdr(1, LSA_MAX_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare::<Ospfv2>(&c, &b), Ordering::Greater);
    }

    #[test]
    fn compare_checksum_tiebreak() {
        let a = hdr(1, LSA_INIT_SEQ_NO, 0x2222);
        let b = hdr(1, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare::<Ospfv2>(&a, &b), Ordering::Greater);
    }

    #[test]
    fn compare_maxage_precedence() {
        let a = hdr(LSA_MAX_AGE, LSA_INIT_SEQ_NO, 0x1111);
        let b = hdr(10, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare::<Ospfv2>(&a, &b), Ordering::Greater);
    }

    #[test]
    fn compare_age_difference() {
        // Ages differing by more than MaxAgeDiff: the younger copy wins.
        let a = hdr(10, LSA_INIT_SEQ_NO, 0x1111);
        let b = hdr(10 + LSA_MAX_AGE_DIFF + 1, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare::<Ospfv2>(&a, &b), Ordering::Greater);

        // Within MaxAgeDiff the instances are equivalent.
        let c = hdr(10 + LSA_MAX_AGE_DIFF, LSA_INIT_SEQ_NO, 0x1111);
        assert_eq!(lsa_compare::<Ospfv2>(&a, &c), Ordering::Equal);
    }
}
