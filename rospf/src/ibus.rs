//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use rospf_utils::ibus::IbusMsg;
use rospf_utils::ip::IpAddrKind;
use rospf_utils::ip::IpNetworkKind;
use rospf_utils::southbound::{
    AddressMsg, InterfaceUpdateMsg, RouteKeyMsg, RouteRedistributeMsg,
};

use crate::error::Error;
use crate::instance::Instance;
use crate::interface::InterfaceVersion;
use crate::lsdb::{ExternalRoute, LsaOriginateEvent};
use crate::version::Version;

// ===== global functions =====

pub(crate) fn process_ibus_msg<V>(
    instance: &mut Instance<V>,
    msg: IbusMsg,
) -> Result<(), Error<V>>
where
    V: Version,
{
    match msg {
        IbusMsg::InterfaceUpd(msg) => {
            process_iface_update(instance, msg);
        }
        IbusMsg::InterfaceAddressAdd(msg) => {
            process_addr_add(instance, msg);
        }
        IbusMsg::InterfaceAddressDel(msg) => {
            process_addr_del(instance, msg);
        }
        IbusMsg::RouterIdUpdate(router_id) => {
            process_router_id_update(instance, router_id);
        }
        IbusMsg::KeychainUpd(keychain) => {
            instance
                .shared
                .keychains
                .insert(keychain.name.clone(), keychain.clone());

            // Interfaces bound to the key-chain pick up the change.
            process_keychain_update(instance, &keychain.name);
        }
        IbusMsg::KeychainDel(keychain_name) => {
            instance.shared.keychains.remove(&keychain_name);

            // Interfaces bound to the key-chain pick up the change.
            process_keychain_update(instance, &keychain_name);
        }
        IbusMsg::RouteRedistributeAdd(msg) => {
            process_route_redistribute_add(instance, msg);
        }
        IbusMsg::RouteRedistributeDel(msg) => {
            process_route_redistribute_del(instance, msg);
        }
        _ => {}
    }

    Ok(())
}

// Re-evaluates every redistributed route after a policy change. Routes
// whose source protocol is no longer redistributed get their external LSAs
// flushed.
pub(crate) fn resync_redistributed_routes<V>(instance: &mut Instance<V>)
where
    V: Version,
{
    let inputs = std::mem::take(&mut instance.system.redistribute_input);
    let old = std::mem::take(&mut instance.system.redistributed);
    for msg in inputs.into_values() {
        process_route_redistribute_add(instance, msg);
    }
    for prefix in old.keys() {
        if !instance.system.redistributed.contains_key(prefix)
            && let Some((mut instance_up, arenas)) = instance.as_up()
        {
            crate::lsdb::orig_external_route(&mut instance_up, arenas, *prefix);
        }
    }
}

// ===== helper functions =====

fn process_iface_update<V>(instance: &mut Instance<V>, msg: InterfaceUpdateMsg)
where
    V: Version,
{
    let Some((instance_up, arenas)) = instance.as_up() else {
        return;
    };

    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        let Some((iface_idx, iface)) = area
            .interfaces
            .get_mut_by_name(&mut arenas.interfaces, &msg.ifname)
        else {
            continue;
        };

        iface.system.flags = msg.flags;
        iface.system.mtu = Some(msg.mtu as u16);
        let area = &mut arenas.areas[area_idx];
        area.interfaces.update_ifindex(
            iface_idx,
            &mut arenas.interfaces[iface_idx],
            Some(msg.ifindex),
        );

        // Check if OSPF needs to be activated or deactivated on this
        // interface.
        let area = &arenas.areas[area_idx];
        let iface = &mut arenas.interfaces[iface_idx];
        iface.update(
            area,
            &instance_up,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
        );
    }
}

fn process_addr_add<V>(instance: &mut Instance<V>, msg: AddressMsg)
where
    V: Version,
{
    let Some((instance_up, arenas)) = instance.as_up() else {
        return;
    };

    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        let Some((iface_idx, iface)) = area
            .interfaces
            .get_mut_by_name(&mut arenas.interfaces, &msg.ifname)
        else {
            continue;
        };

        if !V::addr_add(iface, msg.addr) {
            continue;
        }

        // (Re)originate LSAs that might have been affected.
        instance_up.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::InterfaceAddrAddDel {
                area_id: area.id,
                iface_id: iface.id,
            },
        );

        // Check if OSPF needs to be activated on this interface.
        let iface = &mut arenas.interfaces[iface_idx];
        iface.update(
            area,
            &instance_up,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
        );
    }
}

fn process_addr_del<V>(instance: &mut Instance<V>, msg: AddressMsg)
where
    V: Version,
{
    let Some((instance_up, arenas)) = instance.as_up() else {
        return;
    };

    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        let Some((iface_idx, iface)) = area
            .interfaces
            .get_mut_by_name(&mut arenas.interfaces, &msg.ifname)
        else {
            continue;
        };

        if !V::addr_del(iface, msg.addr) {
            continue;
        }

        // (Re)originate LSAs that might have been affected.
        instance_up.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::InterfaceAddrAddDel {
                area_id: area.id,
                iface_id: iface.id,
            },
        );

        // Check if OSPF needs to be deactivated on this interface.
        let iface = &mut arenas.interfaces[iface_idx];
        iface.update(
            area,
            &instance_up,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
        );
    }
}

fn process_router_id_update<V>(
    instance: &mut Instance<V>,
    router_id: Option<Ipv4Addr>,
) where
    V: Version,
{
    instance.system.router_id = router_id;
    instance.update();
}

fn process_keychain_update<V>(instance: &mut Instance<V>, keychain_name: &str)
where
    V: Version,
{
    let Some((instance_up, arenas)) = instance.as_up() else {
        return;
    };

    for area in arenas.areas.iter_mut() {
        for iface_idx in area.interfaces.indexes() {
            let iface = &mut arenas.interfaces[iface_idx];
            if iface.config.auth_keychain.as_deref() != Some(keychain_name) {
                continue;
            }

            // Update interface authentication keys.
            iface.auth_update(area, &instance_up);
        }
    }
}

fn process_route_redistribute_add<V>(
    instance: &mut Instance<V>,
    msg: RouteRedistributeMsg,
) where
    V: Version,
{
    // Only routes of the configured address family are considered.
    let Some(prefix) = V::IpNetwork::get(msg.prefix) else {
        return;
    };

    // Apply the redistribution policy of the source protocol.
    let Some(policy) = instance.config.redistribute.get(&msg.protocol) else {
        return;
    };
    let route = ExternalRoute::new(
        policy.metric.unwrap_or(msg.metric),
        policy.metric_type,
        policy.tag.unwrap_or(msg.tag),
        msg.nexthop.and_then(V::IpAddr::get),
    );

    // Remember the raw input for policy resyncs.
    instance
        .system
        .redistribute_input
        .insert(msg.prefix, msg.clone());
    instance.system.redistributed.insert(prefix, route);

    // Allocate a stable LSA-ID for this prefix on first sight (OSPFv3's
    // Link State IDs carry no addressing semantics).
    if !instance.system.ext_lsa_ids.contains_key(&prefix) {
        instance.system.next_ext_lsa_id += 1;
        let lsa_id = instance.system.next_ext_lsa_id;
        instance.system.ext_lsa_ids.insert(prefix, lsa_id);
    }

    // Originate (or update) the corresponding external LSAs.
    if let Some((mut instance_up, arenas)) = instance.as_up() {
        crate::lsdb::orig_external_route(&mut instance_up, arenas, prefix);
    }
}

fn process_route_redistribute_del<V>(
    instance: &mut Instance<V>,
    msg: RouteKeyMsg,
) where
    V: Version,
{
    let Some(prefix) = V::IpNetwork::get(msg.prefix) else {
        return;
    };

    instance.system.redistribute_input.remove(&msg.prefix);
    instance.system.redistributed.remove(&prefix);

    // Flush the corresponding external LSAs.
    if let Some((mut instance_up, arenas)) = instance.as_up() {
        crate::lsdb::orig_external_route(&mut instance_up, arenas, prefix);
    }
}
