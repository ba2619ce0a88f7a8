//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use rospf_utils::ip::{AddressFamily, IpNetworkKind};

use crate::area::Area;
use crate::collections::{Arena, Lsdb};
use crate::error::Error;
use crate::interface::Interface;
use crate::lsdb::LsaEntry;
use crate::neighbor::Neighbor;
use crate::ospfv3::packet::lsa::{
    LsaBody, LsaFunctionCode, LsaRouterFlags, LsaRouterLink,
    LsaRouterLinkType, LsaType, PrefixOptions,
};
use crate::packet::lsa::{Lsa, LsaHdrVersion, LsaKey};
use crate::route::{Nexthop, NexthopKey, Nexthops};
use crate::spf::{
    SpfComputation, SpfExternalNetwork, SpfInterAreaNetwork,
    SpfInterAreaRouter, SpfIntraAreaNetwork, SpfLink, SpfPartialComputation,
    SpfTriggerLsa, SpfVersion, Vertex, VertexIdVersion, VertexLsaVersion,
};
use crate::version::Ospfv3;

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum VertexId {
    Network { router_id: Ipv4Addr, iface_id: u32 },
    Router { router_id: Ipv4Addr },
}

#[derive(Debug, Eq, PartialEq, EnumAsInner)]
pub enum VertexLsa {
    Network(Arc<Lsa<Ospfv3>>),
    Router(Vec<Arc<Lsa<Ospfv3>>>),
}

// ===== impl VertexId =====

impl VertexIdVersion for VertexId {
    fn new_root(router_id: Ipv4Addr) -> Self {
        VertexId::Router { router_id }
    }
}

// ===== impl VertexLsa =====

impl VertexLsaVersion<Ospfv3> for VertexLsa {
    fn is_router(&self) -> bool {
        matches!(self, VertexLsa::Router(_))
    }

    fn router_v_bit(&self) -> bool {
        let lsa = self.as_router().unwrap().first().unwrap();
        let lsa_body = lsa.body.as_router().unwrap();
        lsa_body.flags.contains(LsaRouterFlags::V)
    }

    fn router_id(&self) -> Ipv4Addr {
        let lsa = self.as_router().unwrap().first().unwrap();
        lsa.hdr.adv_rtr
    }

    fn router_options(&self) -> crate::ospfv3::packet::Options {
        let lsa = self.as_router().unwrap().first().unwrap();
        let lsa_body = lsa.body.as_router().unwrap();
        lsa_body.options
    }

    fn router_flags(&self) -> LsaRouterFlags {
        let lsa = self.as_router().unwrap().first().unwrap();
        let lsa_body = lsa.body.as_router().unwrap();
        lsa_body.flags
    }

    fn origin(&self) -> LsaKey<LsaType> {
        let lsa = match self {
            VertexLsa::Network(lsa) => lsa,
            VertexLsa::Router(lsas) => lsas.first().unwrap(),
        };
        lsa.hdr.key()
    }
}

// ===== impl Ospfv3 =====

impl SpfVersion<Self> for Ospfv3 {
    type VertexId = VertexId;
    type VertexLsa = VertexLsa;

    fn spf_computation_type(
        trigger_lsas: &[SpfTriggerLsa<Self>],
    ) -> SpfComputation<Self> {
        // A changed router, network or link LSA moves the topology
        // itself; nothing short of a full run is safe.
        if trigger_lsas.iter().map(|tlsa| &tlsa.new).any(|lsa| {
            matches!(
                lsa.hdr.lsa_type.function_code(),
                Some(
                    LsaFunctionCode::Router
                        | LsaFunctionCode::Network
                        | LsaFunctionCode::Link
                )
            )
        }) {
            return SpfComputation::Full;
        }

        // Intra-area prefix changes update intra-area routes.
        //
        // For that to work, for each changed Intra-Area-Prefix LSA, we merge
        // the prefixes from the old and new version of the LSA.
        let intra = trigger_lsas
            .iter()
            .flat_map(|tlsa| std::iter::once(&tlsa.new).chain(tlsa.old.iter()))
            .filter_map(|lsa| lsa.body.as_intra_area_prefix())
            .flat_map(|lsa_body| {
                lsa_body.prefixes.iter().map(move |prefix| prefix.value)
            })
            .collect();

        // Summary prefix changes update inter-area routes.
        let inter_network = trigger_lsas
            .iter()
            .map(|tlsa| &tlsa.new)
            .filter_map(|lsa| lsa.body.as_inter_area_prefix())
            .map(|lsa_body| lsa_body.prefix)
            .collect();

        // ASBR summary changes update inter-area router routes.
        let inter_router = trigger_lsas
            .iter()
            .map(|tlsa| &tlsa.new)
            .filter_map(|lsa| lsa.body.as_inter_area_router())
            .map(|lsa_body| lsa_body.router_id)
            .collect::<BTreeSet<_>>();

        // External and NSSA changes update external routes.
        let external = trigger_lsas
            .iter()
            .map(|tlsa| &tlsa.new)
            .filter_map(|lsa| lsa.body.as_external())
            .map(|lsa_body| lsa_body.prefix)
            .collect();

        SpfComputation::Partial(SpfPartialComputation {
            intra,
            inter_network,
            inter_router,
            external,
        })
    }

    fn calc_nexthops(
        area: &Area<Self>,
        parent: &Vertex<Self>,
        parent_link: Option<(usize, &LsaRouterLink)>,
        dest_id: VertexId,
        dest_lsa: &VertexLsa,
        interfaces: &Arena<Interface<Self>>,
        _neighbors: &Arena<Neighbor<Self>>,
        lsa_entries: &Arena<LsaEntry<Self>>,
    ) -> Result<Nexthops<IpAddr>, Error<Self>> {
        let mut nexthops = Nexthops::new();

        match &parent.lsa {
            // Rooted directly at this router: the destination sits at
            // the other end of one of our own links.
            VertexLsa::Router(_parent_lsa) => {
                let (_, parent_link) = parent_link.unwrap();

                // The link's Interface ID names our interface.
                let (iface_idx, iface) = area
                    .interfaces
                    .get_by_ifindex(interfaces, parent_link.iface_id)
                    .ok_or(Error::SpfNexthopCalcError(dest_id))?;

                match dest_lsa {
                    VertexLsa::Router(dest_lsa) => {
                        let nexthop_addr = calc_nexthop_lladdr(
                            iface,
                            parent_link.nbr_router_id,
                            parent_link.nbr_iface_id,
                            lsa_entries,
                        )
                        .ok_or(Error::SpfNexthopCalcError(dest_id))?;
                        let nbr_router_id =
                            dest_lsa.first().unwrap().hdr.adv_rtr;

                        nexthops.insert(
                            NexthopKey::new(iface_idx, Some(nexthop_addr)),
                            Nexthop::new(
                                iface_idx,
                                Some(nexthop_addr),
                                Some(nbr_router_id),
                            ),
                        );
                    }
                    VertexLsa::Network(_lsa) => {
                        nexthops.insert(
                            NexthopKey::new(iface_idx, None),
                            Nexthop::new(iface_idx, None, None),
                        );
                    }
                }
            }
            // One transit network away from the root.
            VertexLsa::Network(parent_lsa) => {
                // Whichever of the destination's links points back into
                // the parent network identifies it; its Link-LSA then
                // supplies the link-local nexthop address.
                let dest_lsa = dest_lsa.as_router().unwrap();
                let dest_link = dest_lsa
                    .iter()
                    .map(|dest_lsa| dest_lsa.body.as_router().unwrap())
                    .flat_map(|dest_lsa_body| dest_lsa_body.links.iter())
                    .find(|dest_link| {
                        dest_link.nbr_router_id == parent_lsa.hdr.adv_rtr
                            && Ipv4Addr::from(dest_link.nbr_iface_id)
                                == parent_lsa.hdr.lsa_id
                    })
                    .ok_or(Error::SpfNexthopCalcError(dest_id))?;

                // The outgoing interface is the one that reached the
                // network.
                let iface_idx = parent
                    .nexthops
                    .values()
                    .next()
                    .ok_or(Error::SpfNexthopCalcError(dest_id))?
                    .iface_idx;
                let iface = &interfaces[iface_idx];


                let nbr_router_id = dest_lsa.first().unwrap().hdr.adv_rtr;
                let nexthop_addr = calc_nexthop_lladdr(
                    iface,
                    nbr_router_id,
                    dest_link.iface_id,
                    lsa_entries,
                )
                .ok_or(Error::SpfNexthopCalcError(dest_id))?;

                nexthops.insert(
                    NexthopKey::new(iface_idx, Some(nexthop_addr)),
                    Nexthop::new(
                        iface_idx,
                        Some(nexthop_addr),
                        Some(nbr_router_id),
                    ),
                );
            }
        }

        Ok(nexthops)
    }

    fn vertex_lsa_find(
        _af: AddressFamily,
        id: VertexId,
        area: &Area<Self>,
        lsa_entries: &Arena<LsaEntry<Self>>,
    ) -> Option<VertexLsa> {
        match id {
            VertexId::Network {
                router_id,
                iface_id,
            } => {
                // Network-LSAs are always standalone.
                let lsa_key = LsaKey::new(
                    LsaFunctionCode::Network.lsa_type(),
                    router_id,
                    Ipv4Addr::from(iface_id),
                );
                area.state
                    .lsdb
                    .get(lsa_entries, &lsa_key)
                    .filter(|(_, entry)| !entry.data.hdr.is_maxage())
                    .map(|(_, entry)| VertexLsa::Network(entry.data.clone()))
            }
            VertexId::Router { router_id } => {
                // A router's links may be spread across several Router-LSAs
                // with different Link State IDs.
                let lsas = area
                    .state
                    .lsdb
                    .iter_by_type_advrtr(
                        lsa_entries,
                        LsaFunctionCode::Router.lsa_type(),
                        router_id,
                    )
                    .map(|(_, entry)| &entry.data)
                    .filter(|lsa| !lsa.hdr.is_maxage())
                    .cloned()
                    .collect::<Vec<_>>();
                (!lsas.is_empty()).then_some(VertexLsa::Router(lsas))
            }
        }
    }

    fn vertex_lsa_links<'a>(
        vertex_lsa: &'a VertexLsa,
        af: AddressFamily,
        area: &'a Area<Ospfv3>,
        lsa_entries: &'a Arena<LsaEntry<Ospfv3>>,
    ) -> Box<dyn Iterator<Item = SpfLink<'a, Ospfv3>> + 'a> {
        match vertex_lsa {
            VertexLsa::Network(lsa) => {
                let lsa_body = lsa.body.as_network().unwrap();
                let iter = lsa_body.attached_rtrs.iter().filter_map(
                    move |router_id| {
                        let link_vid = VertexId::Router {
                            router_id: *router_id,
                        };
                        Ospfv3::vertex_lsa_find(af, link_vid, area, lsa_entries)
                            .map(|link_vlsa| {
                                SpfLink::new(None, link_vid, link_vlsa, 0)
                            })
                    },
                );
                Box::new(iter)
            }
            VertexLsa::Router(lsas) => {
                let iter = lsas
                    .iter()
                    .flat_map(|lsa| {
                        let lsa_body = lsa.body.as_router().unwrap();
                        lsa_body.links.iter().enumerate()
                    })
                    .filter_map(|(link_pos, link)| match link.link_type {
                        LsaRouterLinkType::PointToPoint
                        | LsaRouterLinkType::VirtualLink => {
                            let link_vid = VertexId::Router {
                                router_id: link.nbr_router_id,
                            };
                            Some((link_pos, link, link_vid, link.metric))
                        }
                        LsaRouterLinkType::TransitNetwork => {
                            let link_vid = VertexId::Network {
                                router_id: link.nbr_router_id,
                                iface_id: link.nbr_iface_id,
                            };
                            Some((link_pos, link, link_vid, link.metric))
                        }
                    })
                    .filter_map(move |(link_pos, link, link_vid, cost)| {
                        Ospfv3::vertex_lsa_find(af, link_vid, area, lsa_entries)
                            .map(|link_vlsa| {
                                SpfLink::new(
                                    Some((link_pos, link)),
                                    link_vid,
                                    link_vlsa,
                                    cost,
                                )
                            })
                    });
                Box::new(iter)
            }
        }
    }

    fn intra_area_networks<'a>(
        area: &'a Area<Self>,
        lsa_entries: &'a Arena<LsaEntry<Self>>,
    ) -> Box<dyn Iterator<Item = SpfIntraAreaNetwork<'a, Self>> + 'a> {
        let iter = area
            .state
            .lsdb
            .iter_by_type(
                lsa_entries,
                LsaFunctionCode::IntraAreaPrefix.lsa_type(),
            )
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .filter_map(move |lsa| {
                let lsa_body = lsa.body.as_intra_area_prefix().unwrap();

                // Resolve the referenced vertex in the shortest-path tree.
                let vertex_id = match lsa_body.ref_lsa_type.function_code() {
                    Some(LsaFunctionCode::Router) => VertexId::Router {
                        router_id: lsa_body.ref_adv_rtr,
                    },
                    Some(LsaFunctionCode::Network) => VertexId::Network {
                        router_id: lsa_body.ref_adv_rtr,
                        iface_id: lsa_body.ref_lsa_id.into(),
                    },
                    _ => return None,
                };
                let vertex = area.state.spt.get(&vertex_id)?;

                Some((vertex, lsa_body))
            })
            .flat_map(|(vertex, lsa_body)| {
                lsa_body
                    .prefixes
                    .iter()
                    // Prefixes with the NU-bit are not routable.
                    .filter(|prefix| {
                        !prefix.options.contains(PrefixOptions::NU)
                    })
                    .map(move |prefix| SpfIntraAreaNetwork {
                        vertex,
                        prefix: prefix.value.apply_mask(),
                        prefix_options: prefix.options,
                        metric: prefix.metric,
                    })
            });

        Box::new(iter)
    }

    fn inter_area_networks<'a>(
        area: &'a Area<Self>,
        lsa_entries: &'a Arena<LsaEntry<Self>>,
    ) -> Box<dyn Iterator<Item = SpfInterAreaNetwork<Self>> + 'a> {
        let iter = area
            .state
            .lsdb
            .iter_by_type(
                lsa_entries,
                LsaFunctionCode::InterAreaPrefix.lsa_type(),
            )
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .map(|lsa| {
                let lsa_body = lsa.body.as_inter_area_prefix().unwrap();
                SpfInterAreaNetwork {
                    adv_rtr: lsa.hdr.adv_rtr,
                    prefix: lsa_body.prefix,
                    prefix_options: lsa_body.prefix_options,
                    metric: lsa_body.metric,
                }
            });
        Box::new(iter)
    }

    fn inter_area_routers<'a>(
        lsdb: &'a Lsdb<Self>,
        lsa_entries: &'a Arena<LsaEntry<Self>>,
    ) -> Box<dyn Iterator<Item = SpfInterAreaRouter<Self>> + 'a> {
        let iter = lsdb
            .iter_by_type(
                lsa_entries,
                LsaFunctionCode::InterAreaRouter.lsa_type(),
            )
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .map(|lsa| {
                let lsa_body = lsa.body.as_inter_area_router().unwrap();
                SpfInterAreaRouter {
                    adv_rtr: lsa.hdr.adv_rtr,
                    router_id: lsa_body.router_id,
                    options: lsa_body.options,
                    flags: LsaRouterFlags::E,
                    metric: lsa_body.metric,
                }
            });
        Box::new(iter)
    }

    fn external_networks<'a>(
        lsdb: &'a Lsdb<Self>,
        lsa_entries: &'a Arena<LsaEntry<Self>>,
    ) -> Box<dyn Iterator<Item = SpfExternalNetwork<Self>> + 'a> {
        let iter = lsdb
            .iter_by_type(lsa_entries, LsaFunctionCode::AsExternal.lsa_type())
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .map(external_network);
        Box::new(iter)
    }

    fn nssa_networks<'a>(
        area: &'a Area<Self>,
        lsa_entries: &'a Arena<LsaEntry<Self>>,
    ) -> Box<dyn Iterator<Item = SpfExternalNetwork<Self>> + 'a> {
        let iter = area
            .state
            .lsdb
            .iter_by_type(lsa_entries, LsaFunctionCode::Nssa.lsa_type())
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .map(external_network);
        Box::new(iter)
    }

    fn virtual_link_endpoint(
        area: &Area<Self>,
        nbr_router_id: Ipv4Addr,
        lsa_entries: &Arena<LsaEntry<Self>>,
    ) -> Option<std::net::Ipv6Addr> {
        // The endpoint must be reached through a global address: look for a
        // host prefix with the LA-bit in the endpoint's
        // Intra-area-prefix-LSAs.
        area.state
            .lsdb
            .iter_by_type_advrtr(
                lsa_entries,
                LsaFunctionCode::IntraAreaPrefix.lsa_type(),
                nbr_router_id,
            )
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .filter_map(|lsa| lsa.body.as_intra_area_prefix())
            .flat_map(|lsa_body| lsa_body.prefixes.iter())
            .filter(|prefix| prefix.options.contains(PrefixOptions::LA))
            .find_map(|prefix| match prefix.value.ip() {
                IpAddr::V6(addr) => Some(addr),
                IpAddr::V4(_) => None,
            })
    }
}

// ===== helper functions =====

// Finds the link-local address of the given neighbor by looking up its
// Link-LSA in the interface's link-scope LSDB.
fn calc_nexthop_lladdr(
    iface: &Interface<Ospfv3>,
    nbr_router_id: Ipv4Addr,
    nbr_iface_id: u32,
    lsa_entries: &Arena<LsaEntry<Ospfv3>>,
) -> Option<std::net::Ipv6Addr> {
    let lsa_key = LsaKey::new(
        LsaFunctionCode::Link.lsa_type(),
        nbr_router_id,
        Ipv4Addr::from(nbr_iface_id),
    );
    let (_, entry) = iface
        .state
        .lsdb
        .get(lsa_entries, &lsa_key)
        .filter(|(_, entry)| !entry.data.hdr.is_maxage())?;
    let LsaBody::Link(link) = &entry.data.body else {
        return None;
    };
    match link.linklocal {
        IpAddr::V6(addr) => Some(addr),
        IpAddr::V4(_) => None,
    }
}

fn external_network(lsa: &Arc<Lsa<Ospfv3>>) -> SpfExternalNetwork<Ospfv3> {
    let lsa_body = lsa.body.as_external().unwrap();

    SpfExternalNetwork {
        adv_rtr: lsa.hdr.adv_rtr,
        e_bit: lsa_body
            .flags
            .contains(crate::ospfv3::packet::lsa::LsaAsExternalFlags::E),
        prefix: lsa_body.prefix,
        prefix_options: lsa_body.prefix_options,
        metric: lsa_body.metric,
        fwd_addr: lsa_body.fwd_addr,
        tag: lsa_body.tag,
    }
}
