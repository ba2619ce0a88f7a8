//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use ipnetwork::Ipv4Network;
use rospf_utils::ip::{AddressFamily, Ipv4NetworkExt};

use crate::area::Area;
use crate::collections::{Arena, Lsdb};
use crate::error::Error;
use crate::interface::Interface;
use crate::lsdb::LsaEntry;
use crate::neighbor::Neighbor;
use crate::ospfv2::packet::lsa::{
    LsaAsExternalFlags, LsaBody, LsaRouterFlags, LsaRouterLink,
    LsaRouterLinkType, LsaType, LsaTypeCode,
};
use crate::packet::lsa::{Lsa, LsaHdrVersion, LsaKey};
use crate::route::{Nexthop, NexthopKey, Nexthops};
use crate::spf::{
    SpfComputation, SpfExternalNetwork, SpfInterAreaNetwork,
    SpfInterAreaRouter, SpfIntraAreaNetwork, SpfLink, SpfPartialComputation,
    SpfTriggerLsa, SpfVersion, Vertex, VertexIdVersion, VertexLsaVersion,
};
use crate::version::Ospfv2;

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum VertexId {
    Network { dr_addr: Ipv4Addr },
    Router { router_id: Ipv4Addr },
}

#[derive(Debug, Eq, PartialEq, EnumAsInner)]
pub enum VertexLsa {
    Network(Arc<Lsa<Ospfv2>>),
    Router(Arc<Lsa<Ospfv2>>),
}

// ===== impl VertexId =====

impl VertexIdVersion for VertexId {
    fn new_root(router_id: Ipv4Addr) -> Self {
        VertexId::Router { router_id }
    }
}

// ===== impl VertexLsa =====

impl VertexLsaVersion<Ospfv2> for VertexLsa {
    fn is_router(&self) -> bool {
        matches!(self, VertexLsa::Router(_))
    }

    fn router_v_bit(&self) -> bool {
        let lsa = self.as_router().unwrap();
        let lsa_body = lsa.body.as_router().unwrap();
        lsa_body.flags.contains(LsaRouterFlags::V)
    }

    fn router_id(&self) -> Ipv4Addr {
        let lsa = self.as_router().unwrap();
        lsa.hdr.adv_rtr
    }

    fn router_options(&self) -> crate::ospfv2::packet::Options {
        let lsa = self.as_router().unwrap();
        lsa.hdr.options
    }

    fn router_flags(&self) -> LsaRouterFlags {
        let lsa = self.as_router().unwrap();
        let lsa_body = lsa.body.as_router().unwrap();
        lsa_body.flags
    }

    fn origin(&self) -> LsaKey<LsaType> {
        let lsa = match self {
            VertexLsa::Network(lsa) => lsa,
            VertexLsa::Router(lsa) => lsa,
        };
        lsa.hdr.key()
    }
}

// ===== impl Ospfv2 =====

impl SpfVersion<Self> for Ospfv2 {
    type VertexId = VertexId;
    type VertexLsa = VertexLsa;

    fn spf_computation_type(
        trigger_lsas: &[SpfTriggerLsa<Self>],
    ) -> SpfComputation<Self> {
        // A changed router or network LSA moves the topology itself;
        // nothing short of a full run is safe.
        if trigger_lsas.iter().map(|tlsa| &tlsa.new).any(|lsa| {
            matches!(lsa.body, LsaBody::Router(_) | LsaBody::Network(_))
        }) {
            return SpfComputation::Full;
        }

        // OSPFv2 has no standalone intra-area prefix LSAs; intra-area
        // information lives in the LSAs handled above.
        let intra = Default::default();

        // Type-3 summaries name the inter-area networks to redo.
        let inter_network = trigger_lsas
            .iter()
            .map(|tlsa| &tlsa.new)
            .filter_map(|lsa| {
                lsa.body
                    .as_summary_network()
                    .map(move |lsa_body| (lsa.hdr, lsa_body))
            })
            .map(|(lsa_hdr, lsa_body)| {
                Ipv4Network::with_netmask(lsa_hdr.lsa_id, lsa_body.mask)
                    .unwrap()
            })
            .collect();

        // Type-4 summaries name the ASBRs to redo.
        let inter_router = trigger_lsas
            .iter()
            .map(|tlsa| &tlsa.new)
            .filter_map(|lsa| lsa.body.as_summary_router().map(|_| lsa.hdr))
            .map(|lsa_hdr| lsa_hdr.lsa_id)
            .collect::<BTreeSet<_>>();

        // External and Type-7 LSAs name the external prefixes to redo.
        let external = trigger_lsas
            .iter()
            .map(|tlsa| &tlsa.new)
            .filter_map(|lsa| {
                lsa.body
                    .as_external()
                    .map(move |lsa_body| (lsa.hdr, lsa_body))
            })
            .map(|(lsa_hdr, lsa_body)| {
                Ipv4Network::with_netmask(lsa_hdr.lsa_id, lsa_body.mask)
                    .unwrap()
            })
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
        _lsa_entries: &Arena<LsaEntry<Self>>,
    ) -> Result<Nexthops<Ipv4Addr>, Error<Self>> {
        let mut nexthops = Nexthops::new();

        match &parent.lsa {
            // Rooted directly at this router: the destination sits at
            // the other end of one of our own links.
            VertexLsa::Router(_) => {
                let (_, link) = parent_link.unwrap();

                // The link's Link Data field is our interface address.
                let (iface_idx, iface) = area
                    .interfaces
                    .get_by_addr(interfaces, link.link_data)
                    .ok_or(Error::SpfNexthopCalcError(dest_id))?;

                match dest_lsa {
                    VertexLsa::Router(dest_lsa) => {
                        // The neighbor's own links pointing back over this
                        // interface carry its addresses; each one is a
                        // nexthop.
                        let dest_body = dest_lsa.body.as_router().unwrap();
                        for link in dest_body.links.iter().filter(|link| {
                            iface.system.contains_addr(&link.link_data)
                        }) {
                            let addr = link.link_data;
                            nexthops.insert(
                                NexthopKey::new(iface_idx, Some(addr)),
                                Nexthop::new(
                                    iface_idx,
                                    Some(addr),
                                    Some(dest_lsa.hdr.adv_rtr),
                                ),
                            );
                        }
                        if nexthops.is_empty() {
                            return Err(Error::SpfNexthopCalcError(dest_id));
                        }
                    }
                    VertexLsa::Network(_) => {
                        // A directly attached network is a connected route.
                        nexthops.insert(
                            NexthopKey::new(iface_idx, None),
                            Nexthop::new(iface_idx, None, None),
                        );
                    }
                }
            }
            // One transit network away: the destination router's address
            // on that network comes from whichever of its links points
            // back into it.
            VertexLsa::Network(parent_lsa) => {
                let lsa_body = parent_lsa.body.as_network().unwrap();
                let parent_network = Ipv4Network::with_netmask(
                    parent_lsa.hdr.lsa_id,
                    lsa_body.mask,
                )
                .unwrap();
                let dest_lsa = dest_lsa.as_router().unwrap();
                let dest_link = dest_lsa
                    .body
                    .as_router()
                    .unwrap()
                    .links
                    .iter()
                    .find(|link| parent_network.contains(link.link_data))
                    .ok_or(Error::SpfNexthopCalcError(dest_id))?;

                // The outgoing interface is the one that reached the
                // network.
                let iface_idx = parent
                    .nexthops
                    .values()
                    .next()
                    .ok_or(Error::SpfNexthopCalcError(dest_id))?
                    .iface_idx;

                let addr = dest_link.link_data;
                nexthops.insert(
                    NexthopKey::new(iface_idx, Some(addr)),
                    Nexthop::new(
                        iface_idx,
                        Some(addr),
                        Some(dest_lsa.hdr.adv_rtr),
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
            VertexId::Network { dr_addr } => {
                // Only the Link State ID (the DR address) is known here,
                // not the advertising router, so this is a scan.
                area.state
                    .lsdb
                    .iter_by_type(lsa_entries, LsaTypeCode::Network.into())
                    .map(|(_, entry)| &entry.data)
                    .find(|lsa| lsa.hdr.lsa_id == dr_addr)
                    .filter(|lsa| !lsa.hdr.is_maxage())
                    .map(|lsa| VertexLsa::Network(lsa.clone()))
            }
            VertexId::Router { router_id } => {
                let lsa_key = LsaKey::new(
                    LsaTypeCode::Router.into(),
                    router_id,
                    router_id,
                );
                area.state
                    .lsdb
                    .get(lsa_entries, &lsa_key)
                    .filter(|(_, entry)| !entry.data.hdr.is_maxage())
                    .map(|(_, entry)| VertexLsa::Router(entry.data.clone()))
            }
        }
    }

    fn vertex_lsa_links<'a>(
        vertex_lsa: &'a VertexLsa,
        af: AddressFamily,
        area: &'a Area<Ospfv2>,
        lsa_entries: &'a Arena<LsaEntry<Ospfv2>>,
    ) -> Box<dyn Iterator<Item = SpfLink<'a, Ospfv2>> + 'a> {
        match vertex_lsa {
            VertexLsa::Network(lsa) => {
                let lsa_body = lsa.body.as_network().unwrap();
                let iter = lsa_body.attached_rtrs.iter().filter_map(
                    move |router_id| {
                        let id = VertexId::Router {
                            router_id: *router_id,
                        };
                        Ospfv2::vertex_lsa_find(af, id, area, lsa_entries)
                            .map(|vlsa| {
                                SpfLink::new(None, id, vlsa, 0)
                            })
                    },
                );
                Box::new(iter)
            }
            VertexLsa::Router(lsa) => {
                let lsa_body = lsa.body.as_router().unwrap();
                let iter = lsa_body
                    .links
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, link)| match link.link_type {
                        LsaRouterLinkType::PointToPoint
                        | LsaRouterLinkType::VirtualLink => {
                            let id = VertexId::Router {
                                router_id: link.link_id,
                            };
                            Some((idx, link, id, link.metric))
                        }
                        LsaRouterLinkType::TransitNetwork => {
                            let id = VertexId::Network {
                                dr_addr: link.link_id,
                            };
                            Some((idx, link, id, link.metric))
                        }
                        // Stub links are processed in a second pass, after
                        // the SPT is built.
                        LsaRouterLinkType::StubNetwork => None,
                    })
                    .filter_map(move |(idx, link, id, cost)| {
                        Ospfv2::vertex_lsa_find(af, id, area, lsa_entries)
                            .map(|vlsa| {
                                SpfLink::new(
                                    Some((idx, link)),
                                    id,
                                    vlsa,
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
        _lsa_entries: &'a Arena<LsaEntry<Self>>,
    ) -> Box<dyn Iterator<Item = SpfIntraAreaNetwork<'a, Self>> + 'a> {
        let mut stubs = vec![];

        for vertex in area.state.spt.values() {
            match &vertex.lsa {
                VertexLsa::Network(lsa) => {
                    let lsa_body = lsa.body.as_network().unwrap();
                    let prefix = Ipv4Network::with_netmask(
                        lsa.hdr.lsa_id,
                        lsa_body.mask,
                    )
                    .unwrap();
                    let prefix = prefix.apply_mask();

                    stubs.push(SpfIntraAreaNetwork {
                        vertex,
                        prefix,
                        prefix_options: Default::default(),
                        metric: 0,
                    });
                }
                VertexLsa::Router(lsa) => {
                    let lsa_body = lsa.body.as_router().unwrap();
                    stubs.extend(
                        lsa_body
                            .links
                            .iter()
                            .filter(|link| {
                                link.link_type
                                    == LsaRouterLinkType::StubNetwork
                            })
                            .filter_map(|link| {
                                let prefix = Ipv4Network::with_netmask(
                                    link.link_id,
                                    link.link_data,
                                )
                                .ok()?;
                                let prefix = prefix.apply_mask();
                                let metric = link.metric;

                                Some(SpfIntraAreaNetwork {
                                    vertex,
                                    prefix,
                                    prefix_options: Default::default(),
                                    metric,
                                })
                            }),
                    )
                }
            }
        }

        Box::new(stubs.into_iter())
    }

    fn inter_area_networks<'a>(
        area: &'a Area<Self>,
        lsa_entries: &'a Arena<LsaEntry<Self>>,
    ) -> Box<dyn Iterator<Item = SpfInterAreaNetwork<Self>> + 'a> {
        let iter = area
            .state
            .lsdb
            .iter_by_type(lsa_entries, LsaTypeCode::SummaryNetwork.into())
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .map(|lsa| {
                let lsa_body = lsa.body.as_summary_network().unwrap();
                let prefix =
                    Ipv4Network::with_netmask(lsa.hdr.lsa_id, lsa_body.mask)
                        .unwrap();

                SpfInterAreaNetwork {
                    adv_rtr: lsa.hdr.adv_rtr,
                    prefix,
                    prefix_options: Default::default(),
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
            .iter_by_type(lsa_entries, LsaTypeCode::SummaryRouter.into())
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .map(|lsa| {
                let lsa_body = lsa.body.as_summary_router().unwrap();
                SpfInterAreaRouter {
                    adv_rtr: lsa.hdr.adv_rtr,
                    router_id: lsa.hdr.lsa_id,
                    options: lsa.hdr.options,
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
            .iter_by_type(lsa_entries, LsaTypeCode::AsExternal.into())
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
            .iter_by_type(lsa_entries, LsaTypeCode::Type7.into())
            .map(|(_, entry)| &entry.data)
            .filter(|lsa| !lsa.hdr.is_maxage())
            .map(external_network);
        Box::new(iter)
    }

    fn virtual_link_endpoint(
        area: &Area<Self>,
        nbr_router_id: Ipv4Addr,
        lsa_entries: &Arena<LsaEntry<Self>>,
    ) -> Option<Ipv4Addr> {
        // The endpoint address is taken from the endpoint's Router-LSA in
        // the transit area: the Link Data of any of its transit or
        // point-to-point links is one of its interface addresses.
        let lsa_key = LsaKey::new(
            LsaTypeCode::Router.into(),
            nbr_router_id,
            nbr_router_id,
        );
        let (_, entry) = area
            .state
            .lsdb
            .get(lsa_entries, &lsa_key)
            .filter(|(_, entry)| !entry.data.hdr.is_maxage())?;
        let lsa_body = entry.data.body.as_router().unwrap();
        lsa_body.links.iter().find_map(|link| match link.link_type {
            LsaRouterLinkType::PointToPoint
            | LsaRouterLinkType::TransitNetwork => Some(link.link_data),
            _ => None,
        })
    }
}

// ===== helper functions =====

fn external_network(lsa: &Arc<Lsa<Ospfv2>>) -> SpfExternalNetwork<Ospfv2> {
    let lsa_body = lsa.body.as_external().unwrap();
    let prefix =
        Ipv4Network::with_netmask(lsa.hdr.lsa_id, lsa_body.mask).unwrap();

    SpfExternalNetwork {
        adv_rtr: lsa.hdr.adv_rtr,
        e_bit: lsa_body.flags.contains(LsaAsExternalFlags::E),
        prefix,
        prefix_options: Default::default(),
        metric: lsa_body.metric,
        fwd_addr: lsa_body.fwd_addr,
        tag: Some(lsa_body.tag),
    }
}
