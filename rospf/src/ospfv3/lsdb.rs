//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::IpNetwork;
use rospf_utils::ip::{IpAddrKind, IpNetworkKind};
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
use crate::ospfv3::packet::Options;
use crate::ospfv3::packet::lsa::{
    LsaAsExternal, LsaAsExternalFlags, LsaBody, LsaFunctionCode, LsaGrace,
    LsaInterAreaPrefix, LsaIntraAreaPrefix, LsaIntraAreaPrefixEntry, LsaLink,
    LsaLinkPrefix, LsaNetwork, LsaRouter, LsaRouterFlags, LsaRouterLink,
    LsaRouterLinkType, LsaType, PrefixOptions,
};
use crate::packet::lsa::{GrReason, Lsa, LsaHdrVersion, LsaScope};
use crate::route::{SummaryNet, SummaryRtr};
use crate::version::Ospfv3;

// ===== impl Ospfv3 =====

impl LsdbVersion<Self> for Ospfv3 {
    fn lsa_type_is_valid(
        area_type: Option<AreaType>,
        _nbr_options: Option<Options>,
        lsa_type: LsaType,
    ) -> bool {
        // Reject LSAs of unknown (reserved) scope.
        if lsa_type.scope() == LsaScope::Unknown {
            return false;
        }

        if let Some(area_type) = area_type {
            // Reject AS-scoped and inter-area-router LSAs (as per errata
            // 3746 of RFC 2328) on stub/NSSA areas.
            if area_type != AreaType::Normal
                && (lsa_type.scope() == LsaScope::As
                    || lsa_type.function_code()
                        == Some(LsaFunctionCode::InterAreaRouter))
            {
                return false;
            }

            // NSSA LSAs are confined to NSSA areas.
            if area_type != AreaType::Nssa
                && lsa_type.function_code() == Some(LsaFunctionCode::Nssa)
            {
                return false;
            }
        }

        true
    }

    fn lsa_is_self_originated(
        lsa: &Lsa<Self>,
        router_id: Ipv4Addr,
        _interfaces: &Arena<Interface<Self>>,
    ) -> bool {
        // With OSPFv3 the Advertising Router alone decides
        // self-origination.
        lsa.hdr.adv_rtr == router_id
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
            LsaOriginateEvent::InterfaceStateChange { area_id, iface_id } => {
                // The ABR status may have flipped, which shows in the
                // router LSA of every area.
                for area in arenas.areas.iter() {
                    lsa_orig_router(area, instance, arenas);
                }

                let (_, area) = arenas.areas.get_by_id(area_id)?;
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

                if iface.state.ism_state >= ism::State::Waiting {
                    lsa_orig_link(iface, area, instance);
                } else {
                    lsa_flush_link(iface, area, instance, arenas);
                }

                lsa_orig_intra_area_prefix(area, instance, arenas);
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

                lsa_orig_intra_area_prefix(area, instance, arenas);
            }
            LsaOriginateEvent::InterfaceAddrAddDel { area_id, iface_id } => {
                let (_, area) = arenas.areas.get_by_id(area_id)?;
                let (_, iface) =
                    area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;

                if iface.state.ism_state >= ism::State::Waiting {
                    lsa_orig_link(iface, area, instance);
                } else {
                    lsa_flush_link(iface, area, instance, arenas);
                }

                lsa_orig_intra_area_prefix(area, instance, arenas);
            }
            LsaOriginateEvent::InterfaceCostChange { area_id } => {
                let (_, area) = arenas.areas.get_by_id(area_id)?;

                lsa_orig_router(area, instance, arenas);

                lsa_orig_intra_area_prefix(area, instance, arenas);
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

                lsa_orig_intra_area_prefix(area, instance, arenas);
            }
            LsaOriginateEvent::NeighborInterfaceIdChange { area_id, .. } => {
                let (_, area) = arenas.areas.get_by_id(area_id)?;
                lsa_orig_router(area, instance, arenas);
            }
            LsaOriginateEvent::LinkLsaRcvd { area_id, iface_id } => {
                let (_, area) = arenas.areas.get_by_id(area_id)?;
                let (_, iface) =
                    area.interfaces.get_by_id(&arenas.interfaces, iface_id)?;
                if iface.state.ism_state == ism::State::Dr {
                                    if iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full)
                    {
                        lsa_orig_network(iface, area, instance, arenas);
                    }

                    // The area-scope prefix origination subscribes to
                    // link-scope LSDB changes: Link-LSA contents seed the
                    // Intra-area-prefix-LSA of the attached network.
                    lsa_orig_intra_area_prefix(area, instance, arenas);
                }
            }
            LsaOriginateEvent::SelfOriginatedLsaRcvd { lsdb_id, entry_id } => {
                // A self-originated LSA arriving from the network is
                // either refreshed under our control or withdrawn.
                process_self_originated_lsa(instance, arenas, lsdb_id, entry_id)?;
            }
            LsaOriginateEvent::StubRouterChange => {
                // (Re)originate Router-LSA(s) in all areas.
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
        prefix: IpNetwork,
        lsa_id: Option<u32>,
        summary: &SummaryNet<Self>,
    ) -> u32 {
        let lsdb_id = LsdbId::Area(area.id);

        let lsa_id = match lsa_id {
            Some(lsa_id) => lsa_id,
            None => {
                area.state.version.next_type3_lsa_id += 1;
                area.state.version.next_type3_lsa_id
            }
        };

        let lsa_body = LsaBody::InterAreaPrefix(LsaInterAreaPrefix::new(
            summary.metric,
            summary.prefix_options,
            prefix,
        ));
        instance.tx.protocol_input.lsa_orig_check(
            lsdb_id,
            None,
            lsa_id.into(),
            lsa_body,
        );

        lsa_id
    }

    fn lsa_orig_inter_area_router(
        area: &mut Area<Self>,
        instance: &InstanceUpView<'_, Self>,
        router_id: Ipv4Addr,
        lsa_id: Option<u32>,
        summary: &SummaryRtr<Self>,
    ) -> u32 {
        let lsdb_id = LsdbId::Area(area.id);

        let lsa_id = match lsa_id {
            Some(lsa_id) => lsa_id,
            None => {
                area.state.version.next_type4_lsa_id += 1;
                area.state.version.next_type4_lsa_id
            }
        };

        let lsa_body =
            LsaBody::InterAreaRouter(crate::ospfv3::packet::lsa::LsaInterAreaRouter::new(
                summary.options,
                summary.metric,
                router_id,
            ));
        instance.tx.protocol_input.lsa_orig_check(
            lsdb_id,
            None,
            lsa_id.into(),
            lsa_body,
        );

        lsa_id
    }

    fn lsa_orig_external(
        instance: &InstanceUpView<'_, Self>,
        arenas: &InstanceArenas<Self>,
        prefix: IpNetwork,
        route: Option<&ExternalRoute<Self>>,
    ) {
        let adv_rtr = instance.state.router_id;

        // Look up the LSA-ID previously allocated to this prefix.
        let lsa_id = instance.system.ext_lsa_ids.get(&prefix).copied();

        match route {
            Some(route) => {
                // The LSA-ID is allocated when the redistributed route is
                // learned; the allocation map lives outside the instance
                // state, so IDs are stable across instance restarts.
                let Some(lsa_id) = lsa_id else {
                    return;
                };

                let mut flags = LsaAsExternalFlags::empty();
                if route.metric_type == RedistMetricType::Type2 {
                    flags.insert(LsaAsExternalFlags::E);
                }
                if route.fwd_addr.is_some() {
                    flags.insert(LsaAsExternalFlags::F);
                }
                if route.tag != 0 {
                    flags.insert(LsaAsExternalFlags::T);
                }
                let body = LsaAsExternal::new(
                    flags,
                    route.metric,
                    PrefixOptions::empty(),
                    prefix,
                    route.fwd_addr,
                    (route.tag != 0).then_some(route.tag),
                    None,
                    None,
                );

                instance.tx.protocol_input.lsa_orig_check(
                    LsdbId::As,
                    None,
                    lsa_id.into(),
                    LsaBody::AsExternal(body.clone()),
                );

                // Originate an equivalent NSSA LSA into each attached NSSA
                // area, with the P-bit allowing border translation.
                for area in arenas
                    .areas
                    .iter()
                    .filter(|area| area.config.area_type == AreaType::Nssa)
                {
                    let mut nssa = body.clone();
                    nssa.prefix_options.insert(PrefixOptions::P);
                    instance.tx.protocol_input.lsa_orig_check(
                        LsdbId::Area(area.id),
                        None,
                        lsa_id.into(),
                        LsaBody::Nssa(nssa),
                    );
                }
            }
            None => {
                let Some(lsa_id) = lsa_id else {
                    return;
                };
                let lsa_id: Ipv4Addr = lsa_id.into();

                // Flush the AS-external-LSA and any NSSA LSAs previously
                // originated for this prefix.
                for (_, entry) in instance
                    .state
                    .lsdb
                    .iter_by_type_advrtr(
                        &arenas.lsa_entries,
                        LsaFunctionCode::AsExternal.lsa_type(),
                        adv_rtr,
                    )
                    .filter(|(_, entry)| entry.data.hdr.lsa_id == lsa_id)
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
                            LsaFunctionCode::Nssa.lsa_type(),
                            adv_rtr,
                        )
                        .filter(|(_, entry)| entry.data.hdr.lsa_id == lsa_id)
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
    ) -> Option<(IpNetwork, Ipv4Addr, Option<Options>, LsaBody)> {
        let LsaBody::Nssa(body) = &lsa.body else {
            return None;
        };

        // The P-bit of the NSSA LSA must be set.
        if !body.prefix_options.contains(PrefixOptions::P) {
            return None;
        }

        // A translated LSA needs a non-zero forwarding address (RFC 3101).
        body.fwd_addr?;

        Some((
            body.prefix,
            lsa.hdr.lsa_id,
            None,
            LsaBody::AsExternal(body.clone()),
        ))
    }

    fn lsa_is_nondefault_external(lsa: &Lsa<Self>) -> bool {
        let Some(body) = lsa.body.as_external() else {
            return false;
        };
        lsa.hdr.lsa_type.function_code() == Some(LsaFunctionCode::AsExternal)
            && body.prefix.prefix() != 0
    }

    fn grace_lsa_body(
        _iface: &Interface<Self>,
        grace_period: u32,
        reason: GrReason,
    ) -> (Ipv4Addr, Option<Options>, LsaBody) {
        let grace = LsaGrace {
            grace_period: Some(grace_period),
            gr_reason: Some(reason as u8),
        };
        (Ipv4Addr::UNSPECIFIED, None, LsaBody::Grace(grace))
    }

    fn lsdb_get_by_lsa_type(
        iface_idx: InterfaceIndex,
        area_idx: AreaIndex,
        lsa_type: LsaType,
    ) -> LsdbIndex {
        match lsa_type.scope() {
            LsaScope::Link => LsdbIndex::Link(area_idx, iface_idx),
            LsaScope::Area => {
                if lsa_type.function_code().is_none() && !lsa_type.u_bit() {
                    LsdbIndex::Link(area_idx, iface_idx)
                } else {
                    LsdbIndex::Area(area_idx)
                }
            }
            LsaScope::As => {
                if lsa_type.function_code().is_none() && !lsa_type.u_bit() {
                    LsdbIndex::Link(area_idx, iface_idx)
                } else {
                    LsdbIndex::As
                }
            }
            LsaScope::Unknown => {
                unreachable!();
            }
        }
    }

    fn lsdb_install(
        instance: &mut InstanceUpView<'_, Self>,
        _arenas: &mut InstanceArenas<Self>,
        _lsdb_idx: LsdbIndex,
        lsdb_id: LsdbId,
        lsa: &Lsa<Self>,
    ) {
        // (Re)originate LSAs that might have been affected.
        if let LsdbId::Link(area_id, iface_id) = lsdb_id
            && lsa.hdr.lsa_type.function_code() == Some(LsaFunctionCode::Link)
        {
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::LinkLsaRcvd { area_id, iface_id },
            );
        }
    }
}

// ===== helper functions =====

fn lsa_orig_router(
    area: &Area<Ospfv3>,
    instance: &InstanceUpView<'_, Ospfv3>,
    arenas: &InstanceArenas<Ospfv3>,
) {
    let lsdb_id = LsdbId::Area(area.id);

    let options = Ospfv3::area_options(area, OptionsLocation::Lsa);

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
        // Down and loopback interfaces contribute nothing.
        .filter(|iface| {
            !matches!(
                iface.state.ism_state,
                ism::State::Down | ism::State::Loopback,
            )
        })
        // An interface with no full adjacency advertises no links.
        .filter(|iface| {
            iface
                .state
                .neighbors
                .iter(&arenas.neighbors)
                .any(|nbr| nbr.state == nsm::State::Full)
        })
    {
        let ifindex = iface.ifindex_resolved();

        // Stub-router mode (RFC 6987) maxes out every link cost.
        let cost = if instance.config.stub_router {
            MAX_LINK_METRIC
        } else {
            iface.config.cost
        };

        match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::PointToMultipoint => {
                // Each full adjacency yields a point-to-point link.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.state == nsm::State::Full)
                {
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::PointToPoint,
                        cost,
                        ifindex,
                        nbr.iface_id.unwrap_or(0),
                        nbr.router_id,
                    );
                    links.push(link);
                }
            }
            InterfaceType::VirtualLink => {
                // A full virtual adjacency appears as a virtual link.
                for nbr in iface
                    .state
                    .neighbors
                    .iter(&arenas.neighbors)
                    .filter(|nbr| nbr.state == nsm::State::Full)
                {
                    let vlink_cost = iface
                        .state
                        .vlink
                        .as_ref()
                        .map(|vlink| vlink.cost)
                        .unwrap_or(cost);
                    let link = LsaRouterLink::new(
                        LsaRouterLinkType::VirtualLink,
                        vlink_cost,
                        ifindex,
                        nbr.iface_id.unwrap_or(0),
                        nbr.router_id,
                    );
                    links.push(link);
                    flags.insert(LsaRouterFlags::V);
                }
            }
            InterfaceType::Broadcast | InterfaceType::NonBroadcast => {
                let (dr_router_id, dr_iface_id) = if iface.state.ism_state
                    == ism::State::Dr
                {
                    // We are the DR ourselves.
                    (instance.state.router_id, ifindex)
                } else {
                    match iface.state.dr.and_then(|net_id| {
                        iface
                            .state
                            .neighbors
                            .get_by_net_id(&arenas.neighbors, net_id)
                            .filter(|(_, nbr)| nbr.state == nsm::State::Full)
                    }) {
                        Some((_, nbr)) => {
                            // Full adjacency to the DR counts too.
                            (nbr.router_id, nbr.iface_id.unwrap_or(0))
                        }
                        None => continue,
                    }
                };

                // A segment with a DR is a transit link.
                let link = LsaRouterLink::new(
                    LsaRouterLinkType::TransitNetwork,
                    cost,
                    ifindex,
                    dr_iface_id,
                    dr_router_id,
                );
                links.push(link);
            }
        }
    }

    // (Re)originate Router-LSA. A single LSA with Link State ID zero
    // describes all of the router's links.
    let lsa_body = LsaBody::Router(LsaRouter::new(flags, options, links));
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        None,
        Ipv4Addr::UNSPECIFIED,
        lsa_body,
    );
}

fn lsa_orig_network(
    iface: &Interface<Ospfv3>,
    area: &Area<Ospfv3>,
    instance: &InstanceUpView<'_, Ospfv3>,
    arenas: &InstanceArenas<Ospfv3>,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let options = Ospfv3::area_options(area, OptionsLocation::Lsa);

    // A network LSA is identified by the DR's Interface ID.
    let lsa_id: Ipv4Addr = iface.ifindex_resolved().into();

    let myself = instance.state.router_id;
    let nbrs = iface
        .state
        .neighbors
        .iter(&arenas.neighbors)
        .filter(|nbr| nbr.state == nsm::State::Full)
        .map(|nbr| nbr.router_id);
    let attached_rtrs = std::iter::once(myself).chain(nbrs).collect();

    let lsa_body = LsaBody::Network(LsaNetwork::new(options, attached_rtrs));
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        None,
        lsa_id,
        lsa_body,
    );
}

fn lsa_flush_network(
    iface: &Interface<Ospfv3>,
    area: &Area<Ospfv3>,
    instance: &InstanceUpView<'_, Ospfv3>,
    arenas: &InstanceArenas<Ospfv3>,
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

// Originates the interface's Link-LSA, carrying the link-local address and
// the list of prefixes assigned to the link.
fn lsa_orig_link(
    iface: &Interface<Ospfv3>,
    area: &Area<Ospfv3>,
    instance: &InstanceUpView<'_, Ospfv3>,
) {
    let lsdb_id = LsdbId::Link(area.id, iface.id);
    let options = Ospfv3::area_options(area, OptionsLocation::Lsa);

    let Some(linklocal) = iface.system.linklocal_addr else {
        return;
    };

    let prefixes = iface
        .system
        .addr_list
        .iter()
        .map(|addr| addr.apply_mask())
        .map(|addr| LsaLinkPrefix::new(PrefixOptions::empty(), addr))
        .collect();

    let lsa_body = LsaBody::Link(LsaLink::new(
        iface.config.priority,
        options,
        linklocal.ip().into(),
        prefixes,
    ));
    let lsa_id: Ipv4Addr = iface.ifindex_resolved().into();
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        None,
        lsa_id,
        lsa_body,
    );
}

fn lsa_flush_link(
    iface: &Interface<Ospfv3>,
    area: &Area<Ospfv3>,
    instance: &InstanceUpView<'_, Ospfv3>,
    arenas: &InstanceArenas<Ospfv3>,
) {
    let adv_rtr = instance.state.router_id;
    for (_, entry) in iface.state.lsdb.iter_by_type_advrtr(
        &arenas.lsa_entries,
        LsaFunctionCode::Link.lsa_type(),
        adv_rtr,
    ) {
        instance.tx.protocol_input.lsa_flush(
            LsdbId::Link(area.id, iface.id),
            entry.id,
            LsaFlushReason::PrematureAging,
        );
    }
}

// Originates the area's Intra-area-prefix-LSAs: one referencing the
// Router-LSA with the prefixes of all non-transit interfaces, plus one per
// transit network this router is DR for, seeded from the link's Link-LSAs.
fn lsa_orig_intra_area_prefix(
    area: &Area<Ospfv3>,
    instance: &InstanceUpView<'_, Ospfv3>,
    arenas: &InstanceArenas<Ospfv3>,
) {
    let lsdb_id = LsdbId::Area(area.id);
    let adv_rtr = instance.state.router_id;

    // Prefixes attached to the Router-LSA.
    let mut rtr_prefixes = vec![];
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        .filter(|iface| !iface.is_down())
        .filter(|iface| !iface.is_virtual_link())
    {
        // Transit networks are covered by the Network-LSA reference below.
        let transit = iface.is_broadcast_or_nbma()
            && iface.state.ism_state >= ism::State::DrOther
            && iface
                .state
                .neighbors
                .iter(&arenas.neighbors)
                .any(|nbr| nbr.state == nsm::State::Full);
        if transit {
            continue;
        }

        let metric = if iface.state.ism_state == ism::State::Loopback {
            0
        } else {
            iface.config.cost
        };
        for addr in iface.system.addr_list.iter() {
            let mut options = PrefixOptions::empty();
            let mut value = addr.apply_mask();
            if iface.state.ism_state == ism::State::Loopback {
                // Loopback addresses are advertised as host prefixes with
                // the LA-bit set.
                options.insert(PrefixOptions::LA);
                value = host_prefix(addr);
            }
            rtr_prefixes.push(LsaIntraAreaPrefixEntry::new(
                options, value, metric,
            ));
        }
    }

    let lsa_body = LsaBody::IntraAreaPrefix(LsaIntraAreaPrefix::new(
        LsaFunctionCode::Router.lsa_type(),
        Ipv4Addr::UNSPECIFIED,
        adv_rtr,
        rtr_prefixes,
    ));
    instance.tx.protocol_input.lsa_orig_check(
        lsdb_id,
        None,
        Ipv4Addr::UNSPECIFIED,
        lsa_body,
    );

    // One Intra-area-prefix-LSA per transit network this router is DR for,
    // referencing the Network-LSA. The prefixes are collected from all of
    // the link's Link-LSAs.
    for iface in area
        .interfaces
        .iter(&arenas.interfaces)
        .filter(|iface| iface.state.ism_state == ism::State::Dr)
        .filter(|iface| {
            iface
                .state
                .neighbors
                .iter(&arenas.neighbors)
                .any(|nbr| nbr.state == nsm::State::Full)
        })
    {
        let mut net_prefixes = vec![];
        for (_, entry) in iface.state.lsdb.iter_by_type(
            &arenas.lsa_entries,
            LsaFunctionCode::Link.lsa_type(),
        ) {
            if entry.data.hdr.is_maxage() {
                continue;
            }
            let LsaBody::Link(link) = &entry.data.body else {
                continue;
            };
            for prefix in &link.prefixes {
                let entry = LsaIntraAreaPrefixEntry::new(
                    prefix.options,
                    prefix.value.apply_mask(),
                    0,
                );
                if !net_prefixes.contains(&entry) {
                    net_prefixes.push(entry);
                }
            }
        }

        let lsa_id: Ipv4Addr = iface.ifindex_resolved().into();
        let lsa_body = LsaBody::IntraAreaPrefix(LsaIntraAreaPrefix::new(
            LsaFunctionCode::Network.lsa_type(),
            lsa_id,
            adv_rtr,
            net_prefixes,
        ));
        instance.tx.protocol_input.lsa_orig_check(
            lsdb_id,
            None,
            lsa_id,
            lsa_body,
        );
    }
}

fn host_prefix(addr: &IpNetwork) -> IpNetwork {
    let plen = match addr {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    IpNetwork::new(addr.ip(), plen).unwrap()
}

fn process_self_originated_lsa(
    instance: &InstanceUpView<'_, Ospfv3>,
    arenas: &InstanceArenas<Ospfv3>,
    lsdb_id: LsdbId,
    entry_id: LsaEntryId,
) -> Result<(), Error<Ospfv3>> {
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

    match lsa.hdr.lsa_type.function_code() {
        Some(LsaFunctionCode::Router) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Take over the received sequence number and reissue.
            lsa_orig_router(area, instance, arenas);
        }
        Some(LsaFunctionCode::Network) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];

            // Only the current DR keeps a network LSA alive.
            let lsa_iface_id: u32 = lsa.hdr.lsa_id.into();
            if let Some(iface) = area
                .interfaces
                .iter(&arenas.interfaces)
                .find(|iface| {
                    !iface.is_down()
                        && iface.ifindex_resolved() == lsa_iface_id
                })
                .filter(|iface| iface.state.ism_state == ism::State::Dr)
            {
                // Reoriginate Network-LSA.
                lsa_orig_network(iface, area, instance, arenas);
            } else {
                // Flush Network-LSA.
                flush = true;
            }
        }
        Some(
            LsaFunctionCode::InterAreaPrefix
            | LsaFunctionCode::InterAreaRouter,
        ) => {
            // Do nothing. These LSAs will be either reoriginated or flushed
            // once SPF runs and the routing table is computed.
        }
        Some(LsaFunctionCode::AsExternal | LsaFunctionCode::Nssa) => {
            // Reoriginate if the route is still redistributed, flush
            // otherwise.
            let prefix = lsa
                .body
                .as_external()
                .map(|body| body.prefix.apply_mask());
            match prefix.and_then(|prefix| {
                instance
                    .system
                    .redistributed
                    .get_key_value(&prefix)
                    .map(|(prefix, route)| (*prefix, route.clone()))
            }) {
                Some((prefix, route)) => {
                    <Ospfv3 as LsdbVersion<Ospfv3>>::lsa_orig_external(
                        instance,
                        arenas,
                        prefix,
                        Some(&route),
                    );
                }
                None => flush = true,
            }
        }
        Some(LsaFunctionCode::Link) => {
            let LsdbIndex::Link(area_idx, iface_idx) = lsdb_idx else {
                unreachable!();
            };
            let area = &arenas.areas[area_idx];
            let iface = &arenas.interfaces[iface_idx];
            if iface.state.ism_state >= ism::State::Waiting {
                lsa_orig_link(iface, area, instance);
            } else {
                flush = true;
            }
        }
        Some(LsaFunctionCode::IntraAreaPrefix) => {
            let area_idx = lsdb_idx.into_area().unwrap();
            let area = &arenas.areas[area_idx];
            lsa_orig_intra_area_prefix(area, instance, arenas);
        }
        Some(LsaFunctionCode::Grace) | None => {
            // Flush: either an opaque leftover from a previous restart or
            // an LSA of unknown type.
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
