//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, btree_map};
use std::net::Ipv4Addr;

use bitflags::bitflags;
use derive_new::new;
use rospf_utils::ip::{IpAddrKind, IpNetworkKind};

use crate::area::{Area, AreaType};
use crate::collections::{Areas, Arena, InterfaceIndex};
use crate::configuration::InstanceCfg;
use crate::debug::Debug;
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::lsdb::{LSA_INFINITY, LsaEntry};
use crate::packet::lsa::{LsaKey, LsaRouterFlagsVersion};
use crate::southbound;
use crate::spf::{SpfExternalNetwork, SpfPartialComputation, VertexLsaVersion};
use crate::version::Version;

// Network routing table entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteNet<V: Version> {
    pub prefix_options: V::PrefixOptions,
    pub area_id: Option<Ipv4Addr>,
    pub origin: Option<LsaKey<V::LsaType>>,
    pub path_type: PathType,
    pub metric: u32,
    pub type2_metric: Option<u32>,
    pub tag: Option<u32>,
    pub nexthops: Nexthops<V::IpAddr>,
    pub flags: RouteNetFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct RouteNetFlags: u8 {
        const CONNECTED = 0x01;
        const INSTALLED = 0x02;
        const SUMMARIZED = 0x04;
        const DISCARD = 0x08;
    }
}

// Router routing table entry.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct RouteRtr<V: Version> {
    pub area_id: Ipv4Addr,
    pub path_type: PathType,
    pub options: V::PacketOptions,
    pub flags: V::LsaRouterFlags,
    pub metric: u32,
    pub nexthops: Nexthops<V::IpAddr>,
}

// Locally originated inter-area "network" route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SummaryNet<V: Version> {
    pub prefix_options: V::PrefixOptions,
    pub metric: u32,
    pub flags: SummaryNetFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SummaryNetFlags: u8 {
        const CONNECTED = 0x01;
    }
}

// Locally originated inter-area "router" route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SummaryRtr<V: Version> {
    pub options: V::PacketOptions,
    pub metric: u32,
}

// OSPF path types in decreasing order of preference.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PathType {
    IntraArea,
    InterArea,
    Type1External,
    Type2External,
}

// Route nexthop key.
#[derive(Clone, Copy, Debug, Eq, new, Ord, PartialEq, PartialOrd)]
pub struct NexthopKey<I: IpAddrKind> {
    // Nexthop interface.
    pub iface_idx: InterfaceIndex,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<I>,
}

// Route nexthop.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
pub struct Nexthop<I: IpAddrKind> {
    // Nexthop interface.
    pub iface_idx: InterfaceIndex,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<I>,
    // Router-ID of the remote neighbor (`None` for connected routes).
    pub nbr_router_id: Option<Ipv4Addr>,
}

// Ordered list of nexthops.
pub type Nexthops<I: IpAddrKind> = BTreeMap<NexthopKey<I>, Nexthop<I>>;

// ===== impl RouteNet =====

impl<V> RouteNet<V>
where
    V: Version,
{
    pub(crate) fn distance(&self, config: &InstanceCfg) -> u8 {
        match self.path_type {
            PathType::IntraArea => config.preference.intra_area,
            PathType::InterArea => config.preference.inter_area,
            PathType::Type1External | PathType::Type2External => {
                config.preference.external
            }
        }
    }

    pub(crate) fn metric(&self) -> u32 {
        match self.path_type {
            PathType::IntraArea | PathType::InterArea => self.metric,
            PathType::Type1External => self.metric,
            PathType::Type2External => self.type2_metric.unwrap(),
        }
    }
}

// ===== global functions =====

// Updates the entire OSPF routing table.
pub(crate) fn update_rib_full<V>(
    instance: &mut InstanceUpView<'_, V>,
    areas: &mut Areas<V>,
    interfaces: &Arena<Interface<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let mut rib = BTreeMap::new();
    let old_rib = std::mem::take(&mut instance.state.rib);

    for area in areas.iter_mut() {
        update_rib_intra_area(&mut rib, None, area, instance, lsa_entries);
    }

    let active_areas = areas.active_count(interfaces);
    for area in areas.iter_mut() {
        // An ABR takes summaries from the backbone only, falling back
        // to transit areas when the backbone is reachable through one.
        if active_areas > 1
            && !area.is_backbone()
            && !area.state.transit_capability
        {
            continue;
        }

        update_rib_inter_area_networks(
            &mut rib,
            None,
            area,
            instance,
            lsa_entries,
        );
        update_rib_inter_area_routers(None, area, instance, lsa_entries);
    }

    update_rib_external(&mut rib, None, None, instance, areas, lsa_entries);

    update_global_rib(&mut rib, old_rib, instance, interfaces);

    instance.state.rib = rib;
}

// Updates the affected routes after a partial SPF run.
pub(crate) fn update_rib_partial<V>(
    partial: &mut SpfPartialComputation<V>,
    instance: &mut InstanceUpView<'_, V>,
    areas: &mut Areas<V>,
    interfaces: &Arena<Interface<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let mut partial_rib = BTreeMap::new();
    let mut rib = std::mem::take(&mut instance.state.rib);
    let mut old_rib = BTreeMap::new();

    // Check for intra-area changes.
    if !partial.intra.is_empty() {
        old_rib.extend(rib.extract_if(|prefix, route| {
            partial.intra.contains(prefix)
                && route.path_type == PathType::IntraArea
        }));

        // Every area gets reevaluated so equal-cost paths crossing
        // areas come out right.
        for area in areas.iter_mut() {
            update_rib_intra_area(
                &mut partial_rib,
                Some(&partial.intra),
                area,
                instance,
                lsa_entries,
            );
        }

        // For destinations that are now newly unreachable, look for
        // alternate inter-area or external paths.
        partial.inter_network.extend(old_rib.keys());
    }

    // Check for inter-area changes.
    if !partial.inter_network.is_empty() {
        old_rib.extend(rib.extract_if(|prefix, route| {
            partial.inter_network.contains(prefix)
                && route.path_type == PathType::InterArea
        }));

        let active_areas = areas.active_count(interfaces);
        for area in areas.iter_mut() {
            // ABRs take summaries from the backbone only.
            if active_areas > 1
                && !area.is_backbone()
                && !area.state.transit_capability
            {
                continue;
            }

            update_rib_inter_area_networks(
                &mut partial_rib,
                Some(&partial.inter_network),
                area,
                instance,
                lsa_entries,
            );
        }

        // For destinations that are now newly unreachable, look for
        // alternate external paths.
        partial.external.extend(old_rib.keys());
    }
    if !partial.inter_router.is_empty() {
        let active_areas = areas.active_count(interfaces);
        for area in areas.iter_mut() {
            // ABRs take summaries from the backbone only.
            if active_areas > 1
                && !area.is_backbone()
                && !area.state.transit_capability
            {
                continue;
            }

            let _ = area.state.routers.extract_if(|router_id, route| {
                partial.inter_router.contains(router_id)
                    && route.path_type == PathType::InterArea
            });

            update_rib_inter_area_routers(
                Some(&partial.inter_router),
                area,
                instance,
                lsa_entries,
            );
        }
    }

    // Check for external changes.
    if !partial.inter_router.is_empty() || !partial.external.is_empty() {
        // A changed ASBR summary can move any external route, so all
        // of them are redone.
        let reevaluate_all = !partial.inter_router.is_empty();

        old_rib.extend(rib.extract_if(|prefix, route| {
            (reevaluate_all || partial.external.contains(prefix))
                && matches!(
                    route.path_type,
                    PathType::Type1External | PathType::Type2External
                )
        }));

        let filter = if reevaluate_all {
            None
        } else {
            Some(&partial.external)
        };
        update_rib_external(
            &mut partial_rib,
            Some(&rib),
            filter,
            instance,
            areas,
            lsa_entries,
        );
    }

    update_global_rib(&mut partial_rib, old_rib, instance, interfaces);

    rib.extend(partial_rib);
    instance.state.rib = rib;
}

// Synchronizes the discard routes derived from active advertised area
// ranges.
pub(crate) fn update_discard_routes<V>(
    instance: &mut InstanceUpView<'_, V>,
    areas: &Areas<V>,
    interfaces: &Arena<Interface<V>>,
) where
    V: Version,
{
    // Collect the active advertised ranges.
    let mut active = BTreeMap::new();
    for area in areas.iter() {
        for (prefix, range) in &area.ranges {
            if range.cost != 0 && range.config.advertise {
                active.insert(
                    *prefix,
                    (area.area_id, range.config.cost.unwrap_or(range.cost)),
                );
            }
        }
    }

    // Remove discard routes whose range is gone.
    let stale = instance
        .state
        .rib
        .extract_if(|prefix, route| {
            route.flags.contains(RouteNetFlags::DISCARD)
                && !active.contains_key(prefix)
        })
        .collect::<Vec<_>>();
    for (prefix, route) in stale {
        if route.flags.contains(RouteNetFlags::INSTALLED) {
            southbound::route_uninstall(instance, &prefix, &route);
        }
    }

    // Install or update the active ones.
    for (prefix, (area_id, cost)) in active {
        let mut publish = false;
        match instance.state.rib.get_mut(&prefix) {
            Some(curr_route)
                if !curr_route.flags.contains(RouteNetFlags::DISCARD) =>
            {
                // An exact-match protocol route takes precedence over the
                // range's discard route.
                continue;
            }
            Some(curr_route) => {
                if curr_route.metric != cost {
                    curr_route.metric = cost;
                    curr_route.flags.insert(RouteNetFlags::INSTALLED);
                    publish = true;
                }
            }
            None => {
                let route = RouteNet {
                    prefix_options: Default::default(),
                    area_id: Some(area_id),
                    origin: None,
                    path_type: PathType::IntraArea,
                    metric: cost,
                    type2_metric: None,
                    tag: None,
                    nexthops: Default::default(),
                    flags: RouteNetFlags::DISCARD | RouteNetFlags::INSTALLED,
                };
                instance.state.rib.insert(prefix, route);
                publish = true;
            }
        }

        if publish {
            let route = instance.state.rib.get(&prefix).unwrap().clone();
            southbound::route_install(instance, interfaces, &prefix, &route);
        }
    }
}

// ===== helper functions =====

// Computes intra-area routes.
fn update_rib_intra_area<V>(
    rib: &mut BTreeMap<V::IpNetwork, RouteNet<V>>,
    filter: Option<&BTreeSet<V::IpNetwork>>,
    area: &mut Area<V>,
    instance: &mut InstanceUpView<'_, V>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    for stub in V::intra_area_networks(area, lsa_entries)
        // Partial runs only touch the affected prefixes.
        .filter(|stub| {
            if let Some(filter) = filter {
                filter.contains(&stub.prefix)
            } else {
                true
            }
        })
    {
        let metric = stub.vertex.distance.saturating_add(stub.metric) as u32;

        // A stub network seen over several vertices keeps only its
        // cheapest distance; costlier appearances are skipped.
        if let Some(best_route) = rib.get(&stub.prefix)
            && metric > best_route.metric
        {
            continue;
        }

        let origin = stub.vertex.lsa.origin();

        // Two vertices can map to the same network while a new DR is
        // settling in. The equally-short path whose origin LSA carries
        // the larger Link State ID takes the entry.
        if !stub.vertex.lsa.is_router()
            && let btree_map::Entry::Occupied(o) = rib.entry(stub.prefix)
        {
            let curr_route = o.get();
            if metric > curr_route.metric
                || origin.lsa_id < curr_route.origin.unwrap().lsa_id
            {
                continue;
            }
            o.remove();
        }

        let mut flags = RouteNetFlags::empty();
        if stub.vertex.hops == 0 {
            flags.insert(RouteNetFlags::CONNECTED);
        }
        let new_route = RouteNet {
            prefix_options: stub.prefix_options,
            area_id: Some(area.area_id),
            path_type: PathType::IntraArea,
            origin: Some(origin),
            metric,
            type2_metric: None,
            tag: None,
            nexthops: stub.vertex.nexthops.clone(),
            flags,
        };

        route_update(rib, stub.prefix, new_route, instance.config.max_paths);
    }
}

// Computes inter-area "network" routes.
fn update_rib_inter_area_networks<V>(
    rib: &mut BTreeMap<V::IpNetwork, RouteNet<V>>,
    filter: Option<&BTreeSet<V::IpNetwork>>,
    area: &mut Area<V>,
    instance: &mut InstanceUpView<'_, V>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let router_id = instance.state.router_id;
    for lsa in V::inter_area_networks(area, lsa_entries)
        // MaxAge and infinite-metric LSAs say nothing useful.
        .filter(|lsa| lsa.metric < LSA_INFINITY)
        .filter(|lsa| lsa.adv_rtr != router_id)
        // Partial runs only touch the affected prefixes.
        .filter(|lsa| {
            if let Some(filter) = filter {
                filter.contains(&lsa.prefix)
            } else {
                true
            }
        })
    {
        // The advertising border router has to be reachable through
        // the LSA's own area.
        let route_br = match area
            .state
            .routers
            .get(&lsa.adv_rtr)
            .filter(|route| route.flags.is_abr())
        {
            Some(route_br) => route_br,
            None => {
                // Unreachable border router, useless LSA.
                Debug::<V>::SpfNetworkUnreachableAbr(&lsa.prefix, lsa.adv_rtr)
                    .log();
                continue;
            }
        };

        // Path cost: distance to the border router plus the
        // advertised cost.
        let metric = route_br.metric + lsa.metric;

        let new_route = RouteNet {
            prefix_options: lsa.prefix_options,
            area_id: Some(area.area_id),
            path_type: PathType::InterArea,
            origin: None,
            metric,
            type2_metric: None,
            tag: None,
            nexthops: route_br.nexthops.clone(),
            flags: RouteNetFlags::empty(),
        };

        route_update(rib, lsa.prefix, new_route, instance.config.max_paths);
    }
}

// Computes inter-area "router" routes.
fn update_rib_inter_area_routers<V>(
    filter: Option<&BTreeSet<Ipv4Addr>>,
    area: &mut Area<V>,
    instance: &mut InstanceUpView<'_, V>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let router_id = instance.state.router_id;
    for lsa in V::inter_area_routers(&area.state.lsdb, lsa_entries)
        // MaxAge and infinite-metric LSAs say nothing useful.
        .filter(|lsa| lsa.metric < LSA_INFINITY)
        .filter(|lsa| lsa.adv_rtr != router_id)
        // Partial runs only touch the affected routers.
        .filter(|lsa| {
            if let Some(filter) = filter {
                filter.contains(&lsa.router_id)
            } else {
                true
            }
        })
    {
        // The advertising border router has to be reachable through
        // the LSA's own area.
        let route_br = match area
            .state
            .routers
            .get(&lsa.adv_rtr)
            .filter(|route| route.flags.is_abr())
        {
            Some(route_br) => route_br,
            None => {
                // Unreachable border router, useless LSA.
                Debug::<V>::SpfRouterUnreachableAbr(
                    &lsa.router_id,
                    lsa.adv_rtr,
                )
                .log();
                continue;
            }
        };

        // Path cost: distance to the border router plus the
        // advertised cost.
        let metric = route_br.metric + lsa.metric;

        let new_route = RouteRtr::<V> {
            area_id: area.area_id,
            path_type: PathType::InterArea,
            options: lsa.options,
            flags: lsa.flags,
            metric,
            nexthops: route_br.nexthops.clone(),
        };
        area.state.routers.insert(lsa.router_id, new_route);
    }
}

// Computes AS external routes, including the NSSA routes of each attached
// NSSA area.
fn update_rib_external<V>(
    rib: &mut BTreeMap<V::IpNetwork, RouteNet<V>>,
    rib_base: Option<&BTreeMap<V::IpNetwork, RouteNet<V>>>,
    filter: Option<&BTreeSet<V::IpNetwork>>,
    instance: &mut InstanceUpView<'_, V>,
    areas: &Areas<V>,
    lsa_entries: &Arena<LsaEntry<V>>,
) where
    V: Version,
{
    let router_id = instance.state.router_id;
    let external_lsas = V::external_networks(&instance.state.lsdb, lsa_entries)
        .map(|lsa| (None, lsa))
        .collect::<Vec<_>>();

    // Examine all NSSA LSAs from each attached NSSA area.
    let nssa_lsas = areas
        .iter()
        .filter(|area| area.config.area_type == AreaType::Nssa)
        .flat_map(|area| {
            V::nssa_networks(area, lsa_entries)
                .map(move |lsa| (Some(area.area_id), lsa))
        })
        .collect::<Vec<_>>();

    for (nssa_area_id, lsa) in external_lsas
        .into_iter()
        .chain(nssa_lsas)
        // MaxAge and infinite-metric LSAs say nothing useful.
        .filter(|(_, lsa)| lsa.metric < LSA_INFINITY)
        .filter(|(_, lsa)| lsa.adv_rtr != router_id)
        // Partial runs only touch the affected prefixes.
        .filter(|(_, lsa)| {
            if let Some(filter) = filter {
                filter.contains(&lsa.prefix)
            } else {
                true
            }
        })
    {
        let Some((metric, type2_metric, nexthops)) =
            external_path_calc(areas, rib, rib_base, nssa_area_id, &lsa)
        else {
            continue;
        };

        let path_type = if lsa.e_bit {
            PathType::Type2External
        } else {
            PathType::Type1External
        };

        let new_route = RouteNet {
            prefix_options: lsa.prefix_options,
            area_id: nssa_area_id,
            path_type,
            origin: None,
            metric,
            type2_metric,
            tag: lsa.tag,
            nexthops,
            flags: RouteNetFlags::empty(),
        };

        route_update(rib, lsa.prefix, new_route, instance.config.max_paths);
    }
}

// Resolves the path towards an external destination: either through the
// advertising ASBR or through the LSA's forwarding address.
fn external_path_calc<V>(
    areas: &Areas<V>,
    rib: &BTreeMap<V::IpNetwork, RouteNet<V>>,
    rib_base: Option<&BTreeMap<V::IpNetwork, RouteNet<V>>>,
    nssa_area_id: Option<Ipv4Addr>,
    lsa: &SpfExternalNetwork<V>,
) -> Option<(u32, Option<u32>, Nexthops<V::IpAddr>)>
where
    V: Version,
{
    let (fwd_cost, nexthops) = match lsa.fwd_addr {
        // A zero forwarding address means the packet is carried by the route
        // to the advertising ASBR.
        None => {
            let route_asbr =
                asbr_route_lookup(areas, nssa_area_id, lsa.adv_rtr)?;
            (route_asbr.metric, route_asbr.nexthops.clone())
        }
        // A non-zero forwarding address must be resolved through an intra-AS
        // route; the LSA is ignored if it's unreachable.
        Some(fwd_addr) => {
            let route_fa = rib
                .iter()
                .chain(rib_base.into_iter().flatten())
                .filter(|(prefix, _)| prefix.contains(fwd_addr))
                .filter(|(_, route)| {
                    matches!(
                        route.path_type,
                        PathType::IntraArea | PathType::InterArea
                    )
                })
                .map(|(_, route)| route)
                .next();
            match route_fa {
                Some(route_fa) => {
                    (route_fa.metric, route_fa.nexthops.clone())
                }
                None => {
                    Debug::<V>::SpfUnresolvableFwdAddr(
                        &lsa.prefix,
                        &fwd_addr,
                    )
                    .log();
                    return None;
                }
            }
        }
    };

    // Type-1: external cost added to the internal cost. Type-2: the LSA
    // cost stands alone, with the internal cost as a tiebreaker.
    if lsa.e_bit {
        Some((fwd_cost, Some(lsa.metric), nexthops))
    } else {
        Some((fwd_cost.saturating_add(lsa.metric), None, nexthops))
    }
}

// Looks up the best route to the advertising ASBR. NSSA LSAs are only
// resolved through their own area.
fn asbr_route_lookup<'a, V>(
    areas: &'a Areas<V>,
    nssa_area_id: Option<Ipv4Addr>,
    adv_rtr: Ipv4Addr,
) -> Option<&'a RouteRtr<V>>
where
    V: Version,
{
    let mut asbr_routes = areas
        .iter()
        .filter(|area| match nssa_area_id {
            Some(area_id) => area.area_id == area_id,
            None => true,
        })
        .filter_map(|area| {
            area.state
                .routers
                .get(&adv_rtr)
                .filter(|route| route.flags.is_asbr())
        })
        .collect::<Vec<_>>();

    // Intra-area paths using non-backbone areas are always the most
    // preferred.
    let asbr_routes_pruned = asbr_routes
        .iter()
        .copied()
        .filter(|route| {
            route.path_type == PathType::IntraArea
                && route.area_id != Ipv4Addr::UNSPECIFIED
        })
        .collect::<Vec<_>>();
    if !asbr_routes_pruned.is_empty() {
        asbr_routes = asbr_routes_pruned;
    }

    // Cheapest entry wins; among equals, the one whose area has the
    // numerically largest Area ID.
    asbr_routes.into_iter().reduce(|best, route| {
        match route.metric.cmp(&best.metric) {
            Ordering::Less => route,
            Ordering::Equal => {
                if route.area_id > best.area_id {
                    route
                } else {
                    best
                }
            }
            Ordering::Greater => best,
        }
    })
}

// Pushes the recomputed routes to the global RIB. Deferred to the end
// of the calculation so the forwarding plane never sees intermediate
// states.
fn update_global_rib<V>(
    rib: &mut BTreeMap<V::IpNetwork, RouteNet<V>>,
    mut old_rib: BTreeMap<V::IpNetwork, RouteNet<V>>,
    instance: &mut InstanceUpView<'_, V>,
    interfaces: &Arena<Interface<V>>,
) where
    V: Version,
{
    // Push adds and changes first.
    for (prefix, route) in rib {
        if let Some(old_route) = old_rib.remove(prefix) {
            // Identical routes don't need touching.
            if old_route.metric() == route.metric()
                && old_route.tag == route.tag
                && old_route.nexthops == route.nexthops
            {
                if old_route.flags.contains(RouteNetFlags::INSTALLED) {
                    route.flags.insert(RouteNetFlags::INSTALLED);
                }
                continue;
            }
        }

        // Nexthop computation errors can leave a route with no
        // nexthops; such a route must not stay installed.
        if !route.flags.contains(RouteNetFlags::CONNECTED)
            && (!route.nexthops.is_empty()
                || route.flags.contains(RouteNetFlags::DISCARD))
        {
            southbound::route_install(instance, interfaces, prefix, route);
            route.flags.insert(RouteNetFlags::INSTALLED);
        } else if route.flags.contains(RouteNetFlags::INSTALLED) {
            southbound::route_uninstall(instance, prefix, route);
            route.flags.remove(RouteNetFlags::INSTALLED);
        }
    }

    // Whatever remains of the old RIB is gone now.
    for (dest, route) in old_rib
        .into_iter()
        .filter(|(_, route)| route.flags.contains(RouteNetFlags::INSTALLED))
    {
        southbound::route_uninstall(instance, &dest, &route);
    }
}

fn route_update<V>(
    rib: &mut BTreeMap<V::IpNetwork, RouteNet<V>>,
    prefix: V::IpNetwork,
    route: RouteNet<V>,
    max_paths: u16,
) where
    V: Version,
{
    let route = match rib.entry(prefix) {
        btree_map::Entry::Occupied(o) => {
            let curr_route = o.into_mut();

            match route_compare(&route, curr_route) {
                Ordering::Less => {
                    // The better path replaces the entry; the
                    // installed flag carries over.
                    let installed =
                        curr_route.flags.contains(RouteNetFlags::INSTALLED);
                    *curr_route = route;
                    if installed {
                        curr_route.flags.insert(RouteNetFlags::INSTALLED);
                    }
                }
                Ordering::Equal => {
                    curr_route.nexthops.extend(route.nexthops);
                }
                Ordering::Greater => {
                }
            }

            curr_route
        }
        btree_map::Entry::Vacant(v) => v.insert(route),
    };

    // Cap the nexthop set at the configured ECMP width.
    if route.nexthops.len() > max_paths as usize {
        route.nexthops = route
            .nexthops
            .iter()
            .map(|(k, v)| (*k, *v))
            .take(max_paths as usize)
            .collect();
    }
}

// Candidate path preference: path type first, then cost. Type-2 externals
// compare the type-2 cost before the internal cost. Ties between areas are
// broken by the larger area ID.
fn route_compare<V>(a: &RouteNet<V>, b: &RouteNet<V>) -> Ordering
where
    V: Version,
{
    let cmp = a.path_type.cmp(&b.path_type);
    if cmp != Ordering::Equal {
        return cmp;
    }

    match a.path_type {
        PathType::IntraArea | PathType::InterArea | PathType::Type1External => {
            let cmp = a.metric.cmp(&b.metric);
            if cmp != Ordering::Equal {
                return cmp;
            }

            b.area_id.cmp(&a.area_id)
        }
        PathType::Type2External => {
            let cmp = a.type2_metric.cmp(&b.type2_metric);
            if cmp != Ordering::Equal {
                return cmp;
            }

            let cmp = a.metric.cmp(&b.metric);
            if cmp != Ordering::Equal {
                return cmp;
            }

            b.area_id.cmp(&a.area_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ospfv2::packet::lsa::PrefixOptions;
    use crate::version::Ospfv2;

    fn ext_route(
        path_type: PathType,
        metric: u32,
        type2_metric: Option<u32>,
    ) -> RouteNet<Ospfv2> {
        RouteNet {
            prefix_options: PrefixOptions {},
            area_id: None,
            origin: None,
            path_type,
            metric,
            type2_metric,
            tag: None,
            nexthops: Default::default(),
            flags: RouteNetFlags::empty(),
        }
    }

    #[test]
    fn path_type_precedence() {
        let intra = ext_route(PathType::IntraArea, 100, None);
        let inter = ext_route(PathType::InterArea, 1, None);
        let ext1 = ext_route(PathType::Type1External, 1, None);
        assert_eq!(route_compare(&intra, &inter), Ordering::Less);
        assert_eq!(route_compare(&inter, &ext1), Ordering::Less);
    }

    #[test]
    fn type2_tiebreak_uses_internal_cost() {
        // Same type-2 cost: the path with the smaller internal (type-1)
        // cost wins.
        let a = ext_route(PathType::Type2External, 5, Some(20));
        let b = ext_route(PathType::Type2External, 15, Some(20));
        assert_eq!(route_compare(&a, &b), Ordering::Less);

        // Different type-2 costs dominate regardless of internal cost.
        let c = ext_route(PathType::Type2External, 100, Some(10));
        assert_eq!(route_compare(&c, &a), Ordering::Less);
    }
}
