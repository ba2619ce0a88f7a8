//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;

use rospf_utils::ibus::IbusMsg;
use rospf_utils::southbound::{Nexthop, RouteKeyMsg, RouteMsg};

use crate::collections::Arena;
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::route::{RouteNet, RouteNetFlags};
use crate::version::Version;

// ===== global functions =====

// Publishes a route to the RIB collaborator. Failures are logged by the
// receiving side; the route stays in the OSPF RIB and is reconciled on the
// next SPF pass.
pub(crate) fn route_install<V>(
    instance: &InstanceUpView<'_, V>,
    interfaces: &Arena<Interface<V>>,
    destination: &V::IpNetwork,
    route: &RouteNet<V>,
) where
    V: Version,
{
    let distance = route.distance(instance.config);

    // Fill-in nexthops.
    let nexthops = route
        .nexthops
        .values()
        .filter_map(|nexthop| {
            let iface = &interfaces[nexthop.iface_idx];
            let ifindex = iface.system.ifindex?;
            let nexthop = match nexthop.addr {
                Some(addr) => Nexthop::Address {
                    ifindex,
                    addr: <V::IpAddr as Into<IpAddr>>::into(addr),
                },
                None => Nexthop::Interface { ifindex },
            };
            Some(nexthop)
        })
        .collect::<BTreeSet<_>>();

    // Install route.
    let msg = RouteMsg {
        protocol: V::PROTOCOL,
        prefix: (*destination).into(),
        distance: distance.into(),
        metric: route.metric(),
        tag: route.tag,
        discard: route.flags.contains(RouteNetFlags::DISCARD),
        nexthops,
    };
    let _ = instance.tx.ibus.send(IbusMsg::RouteIpAdd(msg));
}

// Withdraws a route from the RIB collaborator.
pub(crate) fn route_uninstall<V>(
    instance: &InstanceUpView<'_, V>,
    destination: &V::IpNetwork,
    _route: &RouteNet<V>,
) where
    V: Version,
{
    let msg = RouteKeyMsg {
        protocol: V::PROTOCOL,
        prefix: (*destination).into(),
    };
    let _ = instance.tx.ibus.send(IbusMsg::RouteIpDel(msg));
}
