//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use rospf_utils::ip::{IpNetworkKind, Ipv4NetworkExt};
use rospf_utils::southbound::RedistMetricType;

use crate::area::{Area, AreaType, AreaVersion, OptionsLocation};
use crate::collections::{
    Arena, AreaIndex, InterfaceIndex, LsaEntryId, LsdbId, LsdbIndex, lsdb_get,
};
use crate::debug::LsaFlushReason;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb::{
    ExternalRoute, LsaOriginateEvent, LsdbVersion, MAX_LINK_METRIC,
};
use crate::neighbor::nsm;
use crate::ospfv2::packet::Options;
use crate::ospfv2::packet::lsa::{
    LsaAsExternal, LsaAsExternalFlags, LsaBody, LsaNetwork, LsaRouter,
    LsaRouterFlags, LsaRouterLink, LsaRouterLinkType, LsaType, LsaTypeCode,
};
use crate::ospfv2::packet::lsa_opaque::{
    LsaGrace, LsaOpaque, LsaOpaqueType, OpaqueLsaId,
};
use crate::packet::lsa::{
    GrReason, Lsa, LsaHdrVersion, LsaScope, LsaTypeVersion,
};
use crate::route::{SummaryNet, SummaryRtr};
use crate::version::Ospfv2;

// ===== impl Ospfv2 =====

impl LsdbVersion<Self> for Ospfv2 {
    fn lsa_type_is_valid(
        area_type: Option<AreaType>,
        nbr_options: Option<Options>,
        lsa_type: LsaType,
    ) -> bool {
        // Unknown types never pass.
        if lsa_type.type_code().is_none() {
            return false;
        }

        // Opaque LSAs are only flooded to opaque-capable neighbors.
        if let Some(nbr_options) = nbr_options
            && lsa_type.is_opaque()
            && !nbr_options.contains(Options::O)
        {
            return false;
        }

        if let Some(area_type) = area_type {
            // Reject AS-external and type-4 summary LSAs (as per errata 3746
            // of RFC 2328) on stub/NSSA areas.
            if area_type != AreaType::Normal
                && matches!(
                    lsa_type.type_code(),
                    Some(
                        LsaTypeCode::SummaryRouter
                            | LsaTypeCode::AsExternal
                            | LsaTypeCode::OpaqueAs
                    )
                )
            {
                return false;
            }

            // NSSA LSAs are confined to NSSA areas.
            if area_type != AreaType::Nssa
                && lsa_type.type_code() == Some(LsaTypeCode::Type7)
            {
                return false;
            }
        }

        true
    }

    fn lsa_is_self_originated(
        lsa: &Lsa<Self>,
        router_id: Ipv4Addr,
        interfaces: &Arena<Interface<Self>>,
    ) -> bool {
        // Either the Advertising Router is our own Router ID...
        if lsa.hdr.adv_rtr == router_id {
            return true;
        }

        // ...or it's a network LSA whose Link State ID is one of our
        // interface addresses.
        if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
            && interfaces
                .iter()
                .filter_map(|(_, iface)| iface.system.primary_addr)
                .any(|iface_primary_addr| {
                    lsa.hdr.lsa_id == iface_primary_addr.ip()
                })
        {
            return true;
        }

        false
    }

    fn lsa_orig_event(
        instance: &InstanceUpView<'_, Self>,
        arenas: &InstanceArenas<Self>,
        event: LsaOriginateEvent,
    ) -> Result<(), Error<Self>> {
        match event {
            LsaOriginateEvent::AreaStart { area_id } => {
                let (_, area) = arenas.areas.get_by_id(area_id)?;

                // First router LSA for the area.
                lsa_orig_router(area, instance, arenas);
            }
            LsaOriginateEvent::InterfaceStateChange { .. } => {
                // The ABR status may have flipped, which shows in the
                // router LSA of every area.
                for area in arenas.areas.iter() {
                    lsa_orig_router(area, instance, arenas);
                }
            }
            LsaOriginateEvent::InterfaceDrChange { area_id, iface_id }
            | LsaOriginateEvent::GrHelperExit { area_id, iface_id } => {
                            let (_, area) = arenas.areas.get_by_id(area_id)?;
                lsa_orig_router(area, instance, arenas);

                let (_, iface) =
                    area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
                if iface.state.ism_state == ism::State::Dr
                    && iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full)
                {
                    lsa_orig_network(iface, area, instance, arenas);
                } else {
                    lsa_flush_network(iface, area, instance, arenas);
                }
            }
            LsaOriginateEvent::InterfaceAddrAddDel { area_id, .. }
            | LsaOriginateEvent::InterfaceCostChange { area_id } => {
                            let (_, area) = arenas.areas.get_by_id(area_id)?;
                lsa_orig_router(area, instance, arenas);
            }
            LsaOriginateEvent::NeighborToFromFull { area_id, iface_id } => {
                            let (_, area) = arenas.areas.get_by_id(area_id)?;
                lsa_orig_router(area, instance, arenas);

                            let (_, iface) =
                    area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
                if iface.state.ism_state == ism::State::Dr
                    && iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full)
                {
                    lsa_orig_network(iface, area, instance, arenas);
                } else {
                    lsa_flush_network(iface, area, instance, arenas);
                }
            }
            LsaOriginateEvent::NeighborInterfaceIdChange { .. }
            | LsaOriginateEvent::LinkLsaRcvd { .. } => {
                // OSPFv3-only event.
            }
            LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, entry_id } => {
                // A self-originated LSA arriving from the network is
                // either refreshed under our control or withdrawn.
                process_self_originated_lsa(instance, arenas, lsdb_id, entry_id)?;
            }
            LsaOriginateEvent::StubRouterChange => {
                for area in arenas.areas.iter() {
                    lsa_orig_router(area, instance, arenas);
                }
            }
        };

        Ok(())
    }

    fn lsa_orig_inter_area_network(
        area: &mut Area<Self>,
        instance: &InstanceUpView<'_, Self>,
        prefix: Ipv4Network,
        _lsa_id: Option<u32>,
        summary: &SummaryNet<Self>,
    ) -> u32 {
        let lsdb_id = LsdbId::Area(area.id);

            let options = Self::area_options(area, OptionsLocation::Lsa);

        // Assign the Link State ID per the appendix E algorithm.
        let lsa_id = summary_lsa_id(area, prefix);

            let lsa_body =
            LsaBody::SummaryNetwork(crate::ospfv2::packet::lsa::LsaSummary {
                mask: prefix.mask(),
                metric: summary.metric,
            });
        instance.tx.protocol_input.lsa_orig_check(
            lsdb_id,
            Some(options),
            lsa_id,
            lsa_body,
        );

        lsa_id.into()
    }

    fn lsa_orig_inter_area_router(
        area: &mut Area<Self>,
        instance: &InstanceUpView<'_, Self>,
        router_id: Ipv4Addr,
        _lsa_id: Option<u32>,
        summary: &SummaryRtr<Self>,
    ) -> u32 {
        let lsdb_id = LsdbId::Area(area.id);

            let lsa_id = router_id;

            let lsa_body =
            LsaBody::SummaryRouter(crate::ospfv2::packet::lsa::LsaSummary {
                mask: Ipv4Addr::BROADCAST,
                metric: summary.metric,
            });
        instance.tx.protocol_input.lsa_orig_check(
            lsdb_id,
            Some(summary.options),
            lsa_id,
            lsa_body,
        );

        lsa_id.into()
    }

    fn lsa_orig_external(
        instance: &InstanceUpView<'_, Self>,
        arenas: &InstanceArenas<Self>,
        prefix: Ipv4Network,
        route: Option<&ExternalRoute<Self>>,
    ) {
        let adv_rtr = instance.state.router_id;

        match route {
            Some(route) => {
                let mut flags = LsaAsExternalFlags::empty();
                if route.metric_type == RedistMetricType::Type2 {
                    flags.insert(LsaAsExternalFlags::E);
                }
                let body = LsaAsExternal {
                    mask: prefix.mask(),
                    flags,
                    metric: route.metric,
                    fwd_addr: route.fwd_addr,
                    tag: route.tag,
                };

                let lsa_id = external_lsa_id(instance, arenas, prefix);
                instance.tx.protocol_input.lsa_orig_check(
                    LsdbId::As,
                    Some(Options::E),
                    lsa_id,
                    LsaBody::AsExternal(body.clone()),
                );

                // Originate an equivalent NSSA LSA into each attached NSSA
                // area, with the P-bit allowing border translation.
                for area in arenas
                    .areas
                    .iter()
                    .filter(|area| area.config.area_type == AreaType::Nssa)
                {
                    let options = Options::NP;
                    instance.tx.protocol_input.lsa_orig_check(
                        LsdbId::Area(area.id),
                        Some(options),
                        lsa_id,
                        LsaBody::Type7(body.clone()),
                    );
                }
            }
            None => {
                // Flush the AS-external-LSA and any NSSA LSAs previously
                // originated for this prefix. The LSA-ID may carry the
                // disambiguated (host-bits-set) form, so match on the
                // advertised prefix instead.
                for (_, entry) in instance
                    .state
                    .lsdb
                    .iter_by_type_advrtr(
                        &arenas.lsa_entries,
                        LsaTypeCode::AsExternal.into(),
                        adv_rtr,
                    )
                    .filter(|(_, entry)| external_matches(&entry.data, prefix))
                {
                    instance.tx.protocol_input.lsa_flush(
                        LsdbId::As,
                        entry.id,
                        LsaFlushReason::PrematureAging,
                    );
                }
                for area in arenas
                    .areas
                    .iter()
                    .filter(|area| area.config.area_type == AreaType::Nssa)
                {
                    for (_, entry) in area
                        .state
                        .lsdb
                        .iter_by_type_advrtr(
                            &arenas.lsa_entries,
                            LsaTypeCode::Type7.into(),
                            adv_rtr,
                        )
                        .filter(|(_, entry)| external_matches(&entry.data, prefix))
                    {
                        instance.tx.protocol_input.lsa_flush(
                            LsdbId::Area(area.id),
                            entry.id,
                            LsaFlushReason::PrematureAging,
                        );
                    }
                }
            }
        }
    }

    fn lsa_translate_type7(
        _instance: &InstanceUpView<'_, Self>,
        lsa: &Lsa<Self>,
    ) -> Option<(Ipv4Network, Ipv4Addr, Option<Options>, LsaBody)> {
        // The P-bit of the NSSA LSA must be set.
        if !lsa.hdr.options.contains(Options::NP) {
            return None;
        }

        let LsaBody::Type7(body) = &lsa.body else {
            return None;
        };

        // A translated LSA needs a non-zero forwarding address (RFC 3101).
        body.fwd_addr?;

        let prefix = Ipv4NetworkExt::apply_mask(
            &Ipv4Network::with_netmask(lsa.hdr.lsa_id, body.mask).ok()?,
        );

        Some((
            prefix,
            lsa.hdr.lsa_id,
            Some(Options::E),
            LsaBody::AsExternal(body.clone()),
        ))
    }

    fn lsa_is_nondefault_external(lsa: &Lsa<Self>) -> bool {
        lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::AsExternal)
            && lsa.hdr.lsa_id != Ipv4Addr::UNSPECIFIED
    }

    fn grace_lsa_body(
        iface: &Interface<Self>,
        grace_period: u32,
        reason: GrReason,
    ) -> (Ipv4Addr, Option<Options>, LsaBody) {
        let lsa_id =
            OpaqueLsaId::new(LsaOpaqueType::Grace as u8, 0).into();
        let grace = LsaGrace {
            grace_period: Some(grace_period),
            gr_reason: Some(reason as u8),
            addr: iface.system.primary_addr.map(|addr| addr.ip()),
            unknown_tlvs: vec![],
        };
        (
            lsa_id,
            Some(Options::O),
            LsaBody::OpaqueLink(LsaOpaque::Grace(grace)),
        )
    }

    fn lsdb_get_by_lsa_type(
        iface_idx: InterfaceIndex,
        area_idx: AreaIndex,
        lsa_type: LsaType,
    ) -> LsdbIndex {
        match lsa_type.scope() {
            LsaScope::Link => LsdbIndex::Link(area_idx, iface_idx),
            LsaScope::Area => LsdbIndex::Area(area_idx),
            LsaScope::As => LsdbIndex::As,
            LsaScope::Unknown => {
                unreachable!();
            }
        }
    }

    fn lsdb_install(
        instance: &mut InstanceUpView<'_, Self>,
        arenas: &mut InstanceArenas<Self>,
        lsdb_idx: LsdbIndex,
        _lsdb_id: LsdbId,
        lsa: &Lsa<Self>,
    ) {
        // The interface remembers the network LSAs it originated, so
        // they can still be flushed after an address change.
        if lsa.hdr.lsa_type.type_code() == Some(LsaTypeCode::Network)
            && lsa.hdr.adv_rtr == instance.state.router_id
        {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &mut arenas.areas[area_idx];
            if let Some((_, iface)) = area
                .interfaces
                .get_mut_by_addr(&mut arenas.interfaces, lsa.hdr.lsa_id)
            {
                if lsa.hdr.is_maxage() {
                    iface.state.network_lsa_self = None;
                } else {
                    iface.state.network_lsa_self = Some(lsa.hdr.key());
                }
            }
        }
    }
}

// ===== helper functions =====

fn lsa_orig_router(
    area: &Area<Ospfv2>,
    instance: &InstanceUpView<'_, Ospfv2>,
    arenas: &InstanceArenas<Ospfv2>,
) {
    let lsdb_id = LsdbId::Area(area.id);

    let options = Ospfv2::area_options(area, OptionsLocation::Lsa);

    let mut flags = LsaRouterFlags::empty();
    if arenas.areas.is_abr(&arenas.interfaces) {
        flags.insert(LsaRouterFlags::B);
    }
    if !instance.system.redistributed.is_empty()
        && area.config.area_type == AreaType::Normal
    {
        flags.insert(LsaRouterFlags::E);
    }

    let mut links = vec![];
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        // Down interfaces contribute nothing.
        .filter(|iface| !iface.is_down())
    {
        // A full virtual adjacency appears as a virtual link.
        if iface.is_virtual_link() {
            if let Some(vlink) = &iface.state.vlink
                && let Some(nbr) = iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .find(|nbr| nbr.state == nsm::State::Full)
            {
                let link = LsaRouterLink::new(
                    LsaRouterLinkType::VirtualLink,
                    nbr.router_id,
                    vlink.src,
                    vlink.cost,
                );
                links.push(link);
                flags.insert(LsaRouterFlags::V);
            }
            continue;
        }

        let primary_addr = iface.system.primary_addr.unwrap();

        // Loopback interfaces appear as host stubs.
        if iface.state.ism_state == ism::State::Loopback {
            links.extend(iface.system.addr_list.iter().map(|addr| {
                LsaRouterLink::new(
                    LsaRouterLinkType::StubNetwork,
                    addr.ip(),
                    Ipv4Addr::BROADCAST,
                    0,
                )
            }));
            continue;
        }

        // Stub-router mode (RFC 6987) maxes out every non-stub link
        // cost.
        let non_stub_cost = if instance.config.stub_router {
            MAX_LINK_METRIC
        } else {
            iface.config.cost
        };

        let mut add_stub_links = false;
        match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                // Each full adjacency yields a point-to-point link.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.state == nsm::State::Full)
                {
                    let link_data = if iface.system.unnumbered {
                        Ipv4Addr::from(iface.system.ifindex.unwrap())
                    } else {
                        primary_addr.ip()
                    };
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::PointToPoint,
                        nbr.router_id,
                        link_data,
                        non_stub_cost,
                    );
                    links.push(link);
                }

                // Numbered interfaces also advertise their subnets as
                // stubs.
                if !iface.system.unnumbered {
                    add_stub_links = true;
                }
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                if iface.state.ism_state == ism::State::Waiting {
                    add_stub_links = true;
                } else if (iface.state.ism_state == ism::State::Dr
                    && iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full))
                    || iface
                        .state
                        .dr
                        .and_then(|net_id| {
                            iface
                                .state
                                .neighbors
                                .get_by_net_id(&arenas.neighbors, net_id)
                                .filter(|(_, nbr)| {
                                    nbr.state == nsm::State::Full
                                })
                        })
                        .is_some()
                {
                    // A segment with a DR is a transit link.
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::TransitNetwork,
                        iface.state.dr.unwrap().get(),
                        primary_addr.ip(),
                        non_stub_cost,
                    );
                    links.push(link);
                } else {
                    add_stub_links = true;
                }
            }
            InterfaceType::VirtualLink => unreachable!(),
        }

        if add_stub_links {
            links.extend(
                iface
                    .system
                    .addr_list
                    .iter()
                    .map(|addr| Ipv4NetworkExt::apply_mask(addr))
                    .map(|addr| {
                        LsaRouterLink::new(
                            LsaRouterLinkType::StubNetwork,
                            addr.ip(),
                            addr.mask(),
                            iface.config.cost,
                        )
                    }),
            );
        }
    }

    let lsa_body = LsaBody::Router(LsaRouter { flags, links });
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        Some(options),
        instance.state.router_id,
        lsa_body,
    );
}

fn lsa_orig_network(
    iface: &Interface<Ospfv2>,
    area: &Area<Ospfv2>,
    instance: &InstanceUpView<'_, Ospfv2>,
    arenas: &InstanceArenas<Ospfv2>,
) {
    let lsdb_id = LsdbId::Area(area.id);

    let options = Ospfv2::area_options(area, OptionsLocation::Lsa);

    // A network LSA is identified by the DR's interface address.
    let lsa_id = iface.system.primary_addr.unwrap().ip();

    let mask = iface.system.primary_addr.unwrap().mask();

    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.state == nsm::State::Full)
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    let lsa_body = LsaBody::Network(LsaNetwork {
        mask,
        attached_rtrs,
    });
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        Some(options),
        lsa_id,
        lsa_body,
    );
}

fn lsa_flush_network(
    iface: &Interface<Ospfv2>,
    area: &Area<Ospfv2>,
    instance: &InstanceUpView<'_, Ospfv2>,
    arenas: &InstanceArenas<Ospfv2>,
) {
    if let Some(lsa_key) = &iface.state.network_lsa_self
        && let Some((_, entry)) =
            area.state.lsdb.get(&arenas.lsa_entries, lsa_key)
    {
        instance.tx.protocol_input.lsa_flush(
            LsdbId::Area(area.id),
            entry.id,
            LsaFlushReason::PrematureAging,
        );
    }
}

// Checks whether an external LSA advertises the given prefix, accepting
// both forms of the Link State ID.
fn external_matches(lsa: &Lsa<Ospfv2>, prefix: Ipv4Network) -> bool {
    let Some(body) = lsa.body.as_external() else {
        return false;
    };
    body.mask == prefix.mask()
        && (lsa.hdr.lsa_id == prefix.ip()
            || lsa.hdr.lsa_id == prefix.broadcast())
}

// Implements the appendix E algorithm for assigning the Link State ID of
// Summary-LSAs: when two prefixes with the same address but different
// lengths would collide, the longer prefix uses the network's broadcast
// address.
fn summary_lsa_id(area: &Area<Ospfv2>, prefix: Ipv4Network) -> Ipv4Addr {
    let collision = area
        .state
        .net_summaries
        .keys()
        .any(|other| {
            other.ip() == prefix.ip() && other.prefix() < prefix.prefix()
        });
    if collision {
        prefix.broadcast()
    } else {
        prefix.ip()
    }
}

// Same disambiguation for AS-external LSA-IDs, checked against the
// self-originated externals already present in the AS-scope LSDB.
fn external_lsa_id(
    instance: &InstanceUpView<'_, Ospfv2>,
    arenas: &InstanceArenas<Ospfv2>,
    prefix: Ipv4Network,
) -> Ipv4Addr {
    let adv_rtr = instance.state.router_id;
    let collision = instance
        .state
        .lsdb
        .iter_by_type_advrtr(
            &arenas.lsa_entries,
            LsaTypeCode::AsExternal.into(),
            adv_rtr,
        )
        .filter_map(|(_, entry)| entry.data.body.as_external())
        .any(|body| {
            let Ok(other) =
                Ipv4Network::with_netmask(prefix.ip(), body.mask)
            else {
                return false;
            };
            other.prefix() < prefix.prefix()
        });
    if collision {
        prefix.broadcast()
    } else {
        prefix.ip()
    }
}

fn process_self_originated_lsa(
    instance: &InstanceUpView<'_, Ospfv2>,
    arenas: &InstanceArenas<Ospfv2>,
    lsdb_id: LsdbId,
    entry_id: LsaEntryId,
) -> Result<(), Error<Ospfv2>> {
    let mut flush = false;

    // Resolve the entry the event refers to.
    let (lsdb_idx, lsdb) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_id.into(),
    )?;
    let (_, entry) = lsdb.get_by_id(&arenas.lsa_entries, entry_id)?;
    let lsa = &entry.data;

    match lsa.hdr.lsa_type.type_code() {
        Some(LsaTypeCode::Router) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Take over the received sequence number and reissue.
            lsa_orig_router(area, instance, arenas);
        }
        Some(LsaTypeCode::Network) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Only the current DR keeps a network LSA alive.
            if let Some(iface) = area
                .interfaces
                .iter(&arenas.interfaces)
                .find(|iface| {
                    iface
                        .system
                        .primary_addr
                        .map(|addr| addr.ip() == lsa.hdr.lsa_id)
                        .unwrap_or(false)
                })
                .filter(|iface| iface.state.ism_state == ism::State::Dr)
                .filter(|_| {
                    // Still originated under the same Router ID?
                    lsa.hdr.adv_rtr == instance.state.router_id
                })
            {
                // Reoriginate Network-LSA.
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                // Flush Network-LSA.
                flush = true;
            }
        }
        Some(LsaTypeCode::SummaryNetwork | LsaTypeCode::SummaryRouter) => {
            // Do nothing. These LSAs will be either reoriginated or flushed
            // once SPF runs and the routing table is computed.
        }
        Some(LsaTypeCode::AsExternal | LsaTypeCode::Type7) => {
            // Reoriginate if the route is still redistributed, flush
            // otherwise.
            let prefix = lsa
                .body
                .as_external()
                .and_then(|body| {
                    Ipv4Network::with_netmask(lsa.hdr.lsa_id, body.mask).ok()
                })
                .map(|prefix| Ipv4NetworkExt::apply_mask(&prefix));
            match prefix
                .and_then(|prefix| {
                    instance
                        .system
                        .redistributed
                        .get_key_value(&prefix)
                        .map(|(prefix, route)| (*prefix, route.clone()))
                })
            {
                Some((prefix, route)) => {
                    <Ospfv2 as LsdbVersion<Ospfv2>>::lsa_orig_external(
                        instance,
                        arenas,
                        prefix,
                        Some(&route),
                    );
                }
                None => flush = true,
            }
        }
        Some(
            LsaTypeCode::OpaqueLink
            | LsaTypeCode::OpaqueArea
            | LsaTypeCode::OpaqueAs,
        ) => {
            // Flush Opaque-LSA.
            flush = true;
        }
        None => {
            // Receiving self-originated LSAs of unknown type shouldn't
            // happen in practice. If it does, the LSA will be rejected early
            // on before it reaches this point.
            flush = true;
        }
    }

    if flush {
        // Nothing local corresponds to it anymore; flush it.
        instance.tx.protocol_input.lsa_flush(
            lsdb_id,
            entry_id,
            LsaFlushReason::PrematureAging,
        );
    }

    Ok(())
}
