//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::btree_map;
use std::sync::Arc;

use crate::area::Area;
use crate::collections::{
    Areas, Arena, InterfaceIndex, LsdbIndex, NeighborIndex,
};
use crate::instance::InstanceUpView;
use crate::interface::{Interface, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{Lsa, LsaHdrVersion};
use crate::version::Version;

// ===== global functions =====

// Floods an LSA out of the interfaces selected by its scope. `src`
// identifies the interface/neighbor the LSA arrived from, if any.
//
// Returns whether the LSA was echoed back out of the receiving interface,
// which decides later whether a delayed ack is owed to the sender.
pub(crate) fn flood<V>(
    instance: &InstanceUpView<'_, V>,
    areas: &Areas<V>,
    interfaces: &mut Arena<Interface<V>>,
    neighbors: &mut Arena<Neighbor<V>>,
    lsdb_idx: LsdbIndex,
    lsa: &Arc<Lsa<V>>,
    src: Option<(InterfaceIndex, NeighborIndex)>,
) -> bool
where
    V: Version,
{
    // The LSDB the LSA was installed into already encodes its flooding
    // scope (including the OSPFv3 U-bit handling), so the candidate
    // interface set follows directly from the LSDB index. AS-scope LSAs
    // skip stub and NSSA areas.
    let mut candidates = vec![];
    match lsdb_idx {
        LsdbIndex::Link(area_idx, iface_idx) => {
            candidates.push((area_idx, iface_idx));
        }
        LsdbIndex::Area(area_idx) => {
            let area = &areas[area_idx];
            candidates
                .extend(area.interfaces.indexes().map(|i| (area_idx, i)));
        }
        LsdbIndex::As => {
            for area_idx in areas.indexes() {
                let area = &areas[area_idx];
                if !V::lsa_type_is_valid(
                    Some(area.config.area_type),
                    None,
                    lsa.hdr.lsa_type(),
                ) {
                    continue;
                }
                candidates
                    .extend(area.interfaces.indexes().map(|i| (area_idx, i)));
            }
        }
    }

    let mut echoed = false;
    for (area_idx, iface_idx) in candidates {
        let area = &areas[area_idx];
        echoed |= flood_interface(
            iface_idx, area, instance, interfaces, neighbors, lsa, src,
        );
    }

    echoed
}

// ===== helper functions =====

// RFC 2328, section 13.3: examine one interface's neighbors, load the
// retransmission lists, and decide whether the LSA goes out of this
// interface at all.
fn flood_interface<V>(
    iface_idx: InterfaceIndex,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    interfaces: &mut Arena<Interface<V>>,
    neighbors: &mut Arena<Neighbor<V>>,
    lsa: &Arc<Lsa<V>>,
    src: Option<(InterfaceIndex, NeighborIndex)>,
) -> bool
where
    V: Version,
{
    let iface = &mut interfaces[iface_idx];
    let lsa_key = lsa.hdr.key();

    // Walk the attached neighbors, loading retransmission lists. The LSA
    // only needs to go out of the interface if at least one neighbor ended
    // up holding it for retransmission.
    let mut rxmt_loaded = false;
    for nbr_idx in iface.state.neighbors.indexes() {
        let nbr = &mut neighbors[nbr_idx];

        // Neighbors below Exchange have no database to synchronize yet.
        if nbr.state < nsm::State::Exchange {
            continue;
        }

        // Skip neighbors that can't accept this LSA type.
        if !V::lsa_type_is_valid(
            Some(area.config.area_type),
            nbr.options,
            lsa.hdr.lsa_type(),
        ) {
            continue;
        }

        // An adjacency still forming may have this LSA on its request
        // list; reconcile the request against the copy being flooded.
        if nbr.state != nsm::State::Full
            && !request_list_reconcile(nbr, iface, area, instance, lsa)
        {
            continue;
        }

        // Never reflect the LSA back at its sender.
        if let Some((_, src_nbr_idx)) = src
            && src_nbr_idx == nbr_idx
        {
            continue;
        }

        // Hold the LSA for this neighbor until it acknowledges it.
        nbr.lsa_lists.ls_rxmt.insert(lsa_key, lsa.clone());
        nbr.rxmt_lsupd_start_check(iface, area, instance);
        rxmt_loaded = true;
    }

    if !rxmt_loaded {
        return false;
    }

    // Suppression rules for the receiving interface: when the LSA came in
    // from the DR or BDR the segment has already seen it, and a router in
    // Backup state defers to the DR's flood.
    let mut echoed = false;
    if let Some((src_iface_idx, src_nbr_idx)) = src
        && src_iface_idx == iface_idx
    {
        let src_net_id = neighbors[src_nbr_idx].network_id();
        if iface.state.dr == Some(src_net_id)
            || iface.state.bdr == Some(src_net_id)
        {
            return false;
        }
        if iface.state.ism_state == ism::State::Backup {
            return false;
        }
        echoed = true;
    }

    // Queue the LSA on the interface; the transmission is deferred briefly
    // so several LSAs can share one Update packet.
    iface.enqueue_ls_update(area, instance, lsa_key, lsa.clone());

    echoed
}

// Checks the flooded LSA against a forming adjacency's request lists.
// Returns whether the neighbor should still receive the LSA.
fn request_list_reconcile<V>(
    nbr: &mut Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    lsa: &Arc<Lsa<V>>,
) -> bool
where
    V: Version,
{
    use btree_map::Entry::Occupied;

    let lsa_key = lsa.hdr.key();
    let requested = match (
        nbr.lsa_lists.ls_request.entry(lsa_key),
        nbr.lsa_lists.ls_request_pending.entry(lsa_key),
    ) {
        (Occupied(o), _) | (_, Occupied(o)) => o,
        _ => return true,
    };

    match lsdb::lsa_compare::<V>(&lsa.hdr, requested.get()) {
        // The copy being flooded is older than the requested instance;
        // this neighbor must not see it.
        Ordering::Less => false,
        cmp => {
            // The flooded copy satisfies the request.
            requested.remove();
            nbr.loading_done_check(iface, area, instance);

            // Identical instances don't need to be sent a second time.
            cmp != Ordering::Equal
        }
    }
}
