//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use derive_new::new;
use rospf_utils::ip::IpNetworkKind;

use crate::collections::{
    AreaId, AreaIndex, Areas, Arena, Interfaces, Lsdb, LsdbId,
};
use crate::configuration::{AreaCfg, RangeCfg};
use crate::debug::LsaFlushReason;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, VirtualLinkState};
use crate::lsdb::{LSA_INFINITY, LsaEntry, LsaEntryFlags};
use crate::packet::PacketType;
use crate::packet::lsa::{
    LsaHdrVersion, LsaKey, LsaRouterFlagsVersion, LsaVersion,
};
use crate::route::{
    Nexthops, PathType, RouteNetFlags, RouteRtr, SummaryNet, SummaryRtr,
};
use crate::spf::{SpfVersion, Vertex};
use crate::version::Version;

// OSPF area.
#[derive(Debug)]
pub struct Area<V: Version> {
    // ID.
    pub id: AreaId,
    // Area ID.
    pub area_id: Ipv4Addr,
    // Area configuration data.
    pub config: AreaCfg,
    // Area state data.
    pub state: AreaState<V>,
    // Area ranges.
    pub ranges: HashMap<V::IpNetwork, Range>,
    // Area interfaces.
    pub interfaces: Interfaces<V>,
}

// OSPF area state.
#[derive(Debug)]
pub struct AreaState<V: Version> {
    // LSDB of area-scope LSAs.
    pub lsdb: Lsdb<V>,
    // Indicates whether the area can carry data traffic that neither
    // originates nor terminates in the area itself.
    pub transit_capability: bool,
    // Shortest-path tree.
    pub spt: BTreeMap<V::VertexId, Vertex<V>>,
    // Table of all routers in the area.
    pub routers: BTreeMap<Ipv4Addr, RouteRtr<V>>,
    // Table of summaries originated into this area.
    pub net_summaries: BTreeMap<V::IpNetwork, (u32, SummaryNet<V>)>,
    pub rtr_summaries: BTreeMap<Ipv4Addr, (u32, SummaryRtr<V>)>,
    // Statistics.
    pub spf_run_count: u32,
    pub discontinuity_time: DateTime<Utc>,
    // OSPF version-specific data.
    pub version: V::State,
}

// OSPF area type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum AreaType {
    Normal,
    Stub,
    Nssa,
}

// OSPF area range.
#[derive(Debug, Default)]
pub struct Range {
    pub config: RangeCfg,
    pub cost: u32,
}

// Where an Options field can sit in a packet or LSA.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
pub enum OptionsLocation {
    Packet { pkt_type: PacketType, auth: bool },
    Lsa,
}

// Per-version area state and option derivation.
pub trait AreaVersion<V: Version> {
    type State: Send + Sync + Default + std::fmt::Debug;

    // Options advertised in this area's Hellos, Database Description
    // packets and certain LSAs.
    fn area_options(
        area: &Area<V>,
        location: OptionsLocation,
    ) -> V::PacketOptions;
}

// ===== impl Area =====

impl<V> Area<V>
where
    V: Version,
{
    pub(crate) fn new(id: AreaId, area_id: Ipv4Addr) -> Self {
        Self {
            id,
            area_id,
            config: Default::default(),
            state: Default::default(),
            ranges: Default::default(),
            interfaces: Default::default(),
        }
    }

    // An area is active while at least one of its interfaces is
    // operational.
    pub(crate) fn is_active(&self, interfaces: &Arena<Interface<V>>) -> bool {
        self.interfaces
            .iter(interfaces)
            .any(|iface| !iface.is_down())
    }

    pub(crate) fn is_backbone(&self) -> bool {
        self.area_id == Ipv4Addr::UNSPECIFIED
    }

    pub(crate) fn abr_count(&self) -> usize {
        self.state
            .routers
            .values()
            .filter(|router| router.path_type == PathType::IntraArea)
            .filter(|router| router.flags.is_abr())
            .count()
    }

    pub(crate) fn asbr_count(&self) -> usize {
        self.state
            .routers
            .values()
            .filter(|router| router.path_type == PathType::IntraArea)
            .filter(|router| router.flags.is_asbr())
            .count()
    }
}

// ===== impl AreaState =====

impl<V> Default for AreaState<V>
where
    V: Version,
{
    fn default() -> AreaState<V> {
        AreaState {
            lsdb: Default::default(),
            transit_capability: false,
            spt: Default::default(),
            routers: Default::default(),
            net_summaries: Default::default(),
            rtr_summaries: Default::default(),
            spf_run_count: 0,
            discontinuity_time: Utc::now(),
            version: Default::default(),
        }
    }
}

// ===== global functions =====

pub(crate) fn update_summary_lsas<V>(
    instance: &mut InstanceUpView<'_, V>,
    areas: &mut Areas<V>,
    interfaces: &Arena<Interface<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let is_abr = areas.is_abr(interfaces);

    for route in instance.state.rib.values_mut() {
        route.flags.remove(RouteNetFlags::SUMMARIZED);
    }

    // Decide what gets summarized and which ranges are active.
    for area in areas.iter_mut() {
        update_net_ranges(area, is_abr, instance);
    }

    // Then adjust the originated summaries to match.
    for area_idx in areas.indexes().collect::<Vec<_>>() {
        update_net_summary_lsas(area_idx, is_abr, instance, areas, lsa_entries);
        update_rtr_summary_lsas(area_idx, is_abr, instance, areas, lsa_entries);
    }

    // Keep the discard routes of the active ranges in sync.
    crate::route::update_discard_routes(instance, areas, interfaces);
}

// Translates eligible NSSA LSAs into AS-external LSAs. Run on NSSA border
// routers after each routing table update.
pub(crate) fn update_type7_translation<V>(
    instance: &mut InstanceUpView<'_, V>,
    areas: &Areas<V>,
    interfaces: &Arena<Interface<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let adv_rtr = instance.state.router_id;
    let mut translated = BTreeSet::new();

    if areas.is_abr(interfaces) {
        for area in areas
            .iter()
            .filter(|area| area.config.area_type == AreaType::Nssa)
        {
            for (_, entry) in area
                .state
                .lsdb
                .iter_by_type(lsa_entries, V::type7_nssa())
                .filter(|(_, entry)| !entry.data.hdr.is_maxage())
                // Never translate our own NSSA LSAs.
                .filter(|(_, entry)| {
                    !entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
            {
                let Some((prefix, lsa_id, options, lsa_body)) =
                    V::lsa_translate_type7(instance, &entry.data)
                else {
                    continue;
                };

                // Honor configured NSSA ranges: components of a
                // non-advertised range are suppressed.
                if area
                    .ranges
                    .iter()
                    .filter(|(range_prefix, _)| {
                        range_prefix.is_supernet_of(prefix)
                    })
                    .any(|(_, range)| !range.config.advertise)
                {
                    continue;
                }

                instance.tx.protocol_input.lsa_orig_check(
                    LsdbId::As,
                    options,
                    lsa_id,
                    lsa_body,
                );
                translated.insert(LsaKey::new(
                    V::type5_external(),
                    adv_rtr,
                    lsa_id,
                ));
            }
        }
    }

    // Flush previously translated LSAs that no longer have a valid source.
    for lsa_key in instance
        .state
        .nssa_translated
        .difference(&translated)
        .copied()
        .collect::<Vec<_>>()
    {
        if let Some((_, entry)) = instance.state.lsdb.get(lsa_entries, &lsa_key)
        {
            instance.tx.protocol_input.lsa_flush(
                LsdbId::As,
                entry.id,
                LsaFlushReason::PrematureAging,
            );
        }
    }

    instance.state.nssa_translated = translated;
}

// Resolves the endpoints of the configured virtual links through their
// transit areas, updating the virtual interface states accordingly.
pub(crate) fn update_virtual_links<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    // Collect resolution results first to avoid aliasing the arenas.
    let mut updates = vec![];
    for area_idx in arenas.areas.indexes() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes() {
            let iface = &arenas.interfaces[iface_idx];
            if !iface.is_virtual_link() {
                continue;
            }
            let (Some(transit_area_id), Some(nbr_router_id)) = (
                iface.config.vlink_transit_area,
                iface.config.vlink_nbr_id,
            ) else {
                continue;
            };

            let vlink = arenas
                .areas
                .get_by_area_id(transit_area_id)
                .and_then(|(_, transit_area)| {
                    resolve_virtual_link(
                        transit_area,
                        nbr_router_id,
                        &arenas.interfaces,
                        &arenas.lsa_entries,
                    )
                });

            updates.push((area_idx, iface_idx, vlink));
        }
    }

    // Apply the results, bringing the virtual interfaces up or down.
    for (area_idx, iface_idx, vlink) in updates {
        let iface = &mut arenas.interfaces[iface_idx];
        iface.state.vlink = vlink;

        let area = &arenas.areas[area_idx];
        let iface = &mut arenas.interfaces[iface_idx];
        iface.update(
            area,
            instance,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
        );
    }
}

// Computes the virtual link state towards the given endpoint through the
// transit area.
fn resolve_virtual_link<V>(
    transit_area: &Area<V>,
    nbr_router_id: Ipv4Addr,
    interfaces: &Arena<Interface<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
) -> Option<VirtualLinkState<V>>
where
    V: Version,
{
    // The transit area must provide an intra-area route to the endpoint.
    let route = transit_area
        .state
        .routers
        .get(&nbr_router_id)
        .filter(|route| route.path_type == PathType::IntraArea)?;
    let nexthop = route.nexthops.values().next()?;
    let iface = &interfaces[nexthop.iface_idx];

    // The remote address is learned from the endpoint's LSAs in the transit
    // area.
    let dst =
        V::virtual_link_endpoint(transit_area, nbr_router_id, lsa_entries)?;
    let src = V::src_addr(&iface.system);

    Some(VirtualLinkState {
        dst,
        src,
        ifindex: iface.system.ifindex?,
        cost: route.metric.min(u16::MAX as u32) as u16,
    })
}

fn update_net_ranges<V>(
    area: &mut Area<V>,
    is_abr: bool,
    instance: &mut InstanceUpView<'_, V>,
) where
    V: Version,
{
    // Reset area ranges.
    for range in area.ranges.values_mut() {
        range.cost = 0;
    }

    // Area ranges are only checked when the router is an ABR.
    if is_abr {
        for (prefix, route) in instance
            .state
            .rib
            .iter_mut()
            // Select intra-area routes from this area.
            .filter(|(_, route)| route.path_type == PathType::IntraArea)
            .filter(|(_, route)| route.area_id == Some(area.area_id))
                .filter(|(_, route)| route.metric < LSA_INFINITY)
        {
            // Check if the network is contained in an explicitly configured
            // address range.
            if let Some((_, range)) = area
                .ranges
                .iter_mut()
                .find(|(range_prefix, _)| range_prefix.is_supernet_of(*prefix))
            {
                route.flags.insert(RouteNetFlags::SUMMARIZED);

                // The range cost is the maximum of its component costs.
                if route.metric > range.cost {
                    range.cost = route.metric;
                }
            }
        }
    }
}

fn update_net_summary_lsas<V>(
    area_idx: AreaIndex,
    is_abr: bool,
    instance: &InstanceUpView<'_, V>,
    areas: &mut Areas<V>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let area = &areas[area_idx];
    let new_summaries = compute_net_summaries(is_abr, area, instance, areas);

    let area = &mut areas[area_idx];
    let mut old_summaries = std::mem::take(&mut area.state.net_summaries);

    area.state.net_summaries = new_summaries
        .into_iter()
        .map(|(prefix, new_summary)| {
            let lsa_id = match old_summaries.remove(&prefix) {
                Some((old_lsa_id, old_summary)) => {
                    // A changed route reuses its LSA-ID.
                    if new_summary != old_summary {
                        V::lsa_orig_inter_area_network(
                            area,
                            instance,
                            prefix,
                            Some(old_lsa_id),
                            &new_summary,
                        );
                    }
                    old_lsa_id
                }
                None => {
                    V::lsa_orig_inter_area_network(
                        area,
                        instance,
                        prefix,
                        None,
                        &new_summary,
                    )
                }
            };

            (prefix, (lsa_id, new_summary))
        })
        .collect();

    // Withdraw summaries with no backing route.
    let lsa_type = V::type3_summary();
    let lsa_ids = old_summaries.into_values().map(|(lsa_id, _)| lsa_id);
    flush_summary_lsas(lsa_type, lsa_ids, area, instance, lsa_entries);
}

fn update_rtr_summary_lsas<V>(
    area_idx: AreaIndex,
    is_abr: bool,
    instance: &InstanceUpView<'_, V>,
    areas: &mut Areas<V>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let area = &areas[area_idx];
    let new_summaries = compute_rtr_summaries(is_abr, area, areas);

    let area = &mut areas[area_idx];
    let mut old_summaries = std::mem::take(&mut area.state.rtr_summaries);

    area.state.rtr_summaries = new_summaries
        .into_iter()
        .map(|(router_id, new_summary)| {
            let lsa_id = match old_summaries.remove(&router_id) {
                Some((old_lsa_id, old_summary)) => {
                    // A changed route reuses its LSA-ID.
                    if new_summary != old_summary {
                        V::lsa_orig_inter_area_router(
                            area,
                            instance,
                            router_id,
                            Some(old_lsa_id),
                            &new_summary,
                        );
                    }
                    old_lsa_id
                }
                None => {
                    V::lsa_orig_inter_area_router(
                        area,
                        instance,
                        router_id,
                        None,
                        &new_summary,
                    )
                }
            };

            (router_id, (lsa_id, new_summary))
        })
        .collect();

    // Withdraw summaries with no backing route.
    let lsa_type = V::type4_summary();
    let lsa_ids = old_summaries.into_values().map(|(lsa_id, _)| lsa_id);
    flush_summary_lsas(lsa_type, lsa_ids, area, instance, lsa_entries);
}

fn compute_net_summaries<V>(
    is_abr: bool,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    areas: &Areas<V>,
) -> Vec<(V::IpNetwork, SummaryNet<V>)>
where
    V: Version,
{
    let mut summaries = vec![];

    // Only ABRs should originate summaries.
    if !is_abr {
        return summaries;
    }

    // Totally stubby variants suppress everything but the default.
    if area.config.summary {
        let rsummaries = compute_net_regular_summaries(area, instance);
        summaries.extend(rsummaries);

        let rsummaries = compute_net_range_summaries(area, areas);
        summaries.extend(rsummaries);
    }

    // Stub and NSSA areas get a default route injected.
    if area.config.area_type != AreaType::Normal {
        let prefix = V::IpNetwork::default(instance.state.af);
        let default_summary = SummaryNet {
            prefix_options: Default::default(),
            metric: area.config.default_cost,
            flags: Default::default(),
        };
        summaries.push((prefix, default_summary));
    }

    summaries
}

fn compute_net_regular_summaries<'a, V>(
    area: &'a Area<V>,
    instance: &'a InstanceUpView<'_, V>,
) -> impl Iterator<Item = (V::IpNetwork, SummaryNet<V>)> + 'a
where
    V: Version,
{
    instance
        .state
        .rib
        .iter()
        // External routes travel in their own LSAs, never summaries.
        .filter(|(_, route)| {
            !matches!(
                route.path_type,
                PathType::Type1External | PathType::Type2External
            )
        })
        .filter(|(_, route)| route.metric < LSA_INFINITY)
        // Routes from the area itself obviously don't get summarized
        // back into it.
        .filter(|(_, route)| route.area_id != Some(area.area_id))
        // The backbone accepts intra-area routes only.
        .filter(|(_, route)| {
            route.path_type == PathType::IntraArea || !area.is_backbone()
        })
        // Routes whose nexthops point back into the area are not
        // advertised into it.
        .filter(|(_, route)| !nexthops_area_check(&route.nexthops, area))
        // Networks outside every configured range are advertised
        // individually.
        .filter(|(_, route)| {
            // The backbone's configured ranges should be ignored when
            // originating summary-LSAs into transit areas.
            if route.area_id == Some(Ipv4Addr::UNSPECIFIED)
                && area.state.transit_capability
            {
                true
            } else {
                !route.flags.contains(RouteNetFlags::SUMMARIZED)
            }
        })
        .map(|(prefix, route)| {
            let summary = SummaryNet {
                prefix_options: route.prefix_options,
                metric: route.metric,
                flags: Default::default(),
            };
            (*prefix, summary)
        })
}

fn compute_net_range_summaries<'a, V>(
    area: &'a Area<V>,
    areas: &'a Areas<V>,
) -> impl Iterator<Item = (V::IpNetwork, SummaryNet<V>)> + 'a
where
    V: Version,
{
    areas
        .iter()
        .filter(|other_area| other_area.area_id != area.area_id)
        // The backbone's configured ranges should be ignored when
        // originating summary-LSAs into transit areas.
        .filter(|other_area| {
            !(other_area.is_backbone() && area.state.transit_capability)
        })
        .flat_map(|other_area| {
            other_area
                .ranges
                .iter()
                .filter(|(_, range)| range.cost != 0)
                .filter(|(_, range)| range.config.advertise)
                        .map(|(range_prefix, range)| {
                    let summary = SummaryNet {
                        prefix_options: Default::default(),
                        metric: range.config.cost.unwrap_or(range.cost),
                        flags: Default::default(),
                    };
                    (*range_prefix, summary)
                })
        })
}

fn compute_rtr_summaries<V>(
    is_abr: bool,
    area: &Area<V>,
    areas: &Areas<V>,
) -> Vec<(Ipv4Addr, SummaryRtr<V>)>
where
    V: Version,
{
    // Some configurations never produce router summaries.
    if !is_abr || area.config.area_type != AreaType::Normal {
        return Vec::new();
    }

    areas
        .iter()
        .filter(|area_src| area_src.id != area.id)
        .flat_map(|area_src| area_src.state.routers.iter())
        .filter(|(_, route)| route.flags.is_asbr())
        .filter(|(_, route)| route.metric < LSA_INFINITY)
        // The backbone accepts intra-area routes only.
        .filter(|(_, route)| {
            route.path_type == PathType::IntraArea || !area.is_backbone()
        })
        // Routes whose nexthops point back into the area are not
        // advertised into it.
        .filter(|(_, route)| !nexthops_area_check(&route.nexthops, area))
        .map(|(router_id, route)| {
            let summary = SummaryRtr {
                options: route.options,
                metric: route.metric,
            };
            (*router_id, summary)
        })
        .collect()
}

fn nexthops_area_check<V>(
    nexthops: &Nexthops<V::IpAddr>,
    area: &Area<V>,
) -> bool
where
    V: Version,
{
    nexthops.values().any(|nexthop| {
        area.interfaces
            .indexes()
            .any(|iface_idx| nexthop.iface_idx == iface_idx)
    })
}

fn flush_summary_lsas<V>(
    lsa_type: V::LsaType,
    lsa_ids: impl Iterator<Item = u32>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let lsdb_id = LsdbId::Area(area.id);
    let adv_rtr = instance.state.router_id;

    // Withdraw our summaries with no backing route.
    for lsa_id in lsa_ids {
        let lsa_key = LsaKey::new(lsa_type, adv_rtr, lsa_id.into());
        if let Some((_, entry)) = area.state.lsdb.get(lsa_entries, &lsa_key) {
            instance.tx.protocol_input.lsa_flush(
                lsdb_id,
                entry.id,
                LsaFlushReason::PrematureAging,
            );
        }
    }

    // Stale self-originated copies learned from the network go too.
    for (_, entry) in area
        .state
        .lsdb
        .iter_by_type_advrtr(lsa_entries, lsa_type, adv_rtr)
        .filter(|(_, entry)| entry.flags.contains(LsaEntryFlags::RECEIVED))
    {
        instance.tx.protocol_input.lsa_flush(
            lsdb_id,
            entry.id,
            LsaFlushReason::PrematureAging,
        );
    }
}
