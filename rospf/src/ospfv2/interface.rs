//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::IpNetwork;
use rospf_utils::ip::{AddressFamily, Ipv4AddrExt};

use crate::area::{Area, AreaVersion, OptionsLocation};
use crate::collections::{Arena, NeighborIndex};
use crate::debug::InterfaceInactiveReason;
use crate::error::{Error, InterfaceCfgError};
use crate::instance::InstanceUpView;
use crate::interface::{
    self, Interface, InterfaceSys, InterfaceType, InterfaceVersion,
};
use crate::neighbor::{Neighbor, NeighborVersion};
use crate::ospfv2;
use crate::ospfv2::packet::{Hello, PacketHdr};
use crate::packet::auth::AuthMethod;
use crate::packet::{Packet, PacketType};
use crate::version::Ospfv2;

// ===== impl Ospfv2 =====

impl InterfaceVersion<Self> for Ospfv2 {
    fn is_ready(
        _af: AddressFamily,
        iface: &Interface<Self>,
    ) -> Result<(), InterfaceInactiveReason> {
        interface::is_ready_common(iface)?;

        if !iface.is_virtual_link() && iface.system.primary_addr.is_none() {
            return Err(InterfaceInactiveReason::MissingIpv4Address);
        }

        Ok(())
    }

    fn src_addr(iface_sys: &InterfaceSys<Self>) -> Ipv4Addr {
        iface_sys.primary_addr.unwrap().ip()
    }

    fn generate_hello(
        iface: &Interface<Self>,
        area: &Area<Self>,
        instance: &InstanceUpView<'_, Self>,
    ) -> Packet<Self> {
        let hdr = PacketHdr {
            pkt_type: PacketType::Hello,
            router_id: instance.state.router_id,
            area_id: area.area_id,
            auth_seqno: None,
        };

        let network_mask = if iface.is_virtual_link() {
            Ipv4Addr::UNSPECIFIED
        } else {
            iface.system.primary_addr.unwrap().mask()
        };

        let mut options = Self::area_options(
            area,
            OptionsLocation::new_packet(
                PacketType::Hello,
                iface.state.auth.is_some(),
            ),
        );
        if iface.config.demand_circuit {
            options.insert(ospfv2::packet::Options::DC);
        }

        Packet::Hello(Hello {
            hdr,
            network_mask,
            hello_interval: iface.config.hello_interval,
            options,
            priority: iface.config.priority,
            dead_interval: iface.config.dead_interval as u32,
            dr: iface.state.dr,
            bdr: iface.state.bdr,
            neighbors: iface.state.neighbors.router_ids().collect(),
        })
    }

    fn validate_packet_dst(
        iface: &Interface<Self>,
        dst: Ipv4Addr,
    ) -> Result<(), Error<Self>> {
        // Accept only unicast packets on virtual links.
        if iface.is_virtual_link() {
            if dst.is_multicast() {
                return Err(Error::InvalidDstAddr(dst));
            } else {
                return Ok(());
            }
        }

        // Unicasts must target the interface's primary address.
        if dst == iface.system.primary_addr.unwrap().ip() {
            return Ok(());
        }

        interface::validate_packet_dst_common(iface, dst)
    }

    fn validate_packet_src(
        iface: &Interface<Self>,
        src: Ipv4Addr,
    ) -> Result<(), Error<Self>> {
        if !src.is_usable() {
            return Err(Error::InvalidSrcAddr(src));
        }

        // Senders must share a subnet with the receiving interface.
        if iface.config.if_type != InterfaceType::PointToPoint
            && iface.config.if_type != InterfaceType::VirtualLink
            && !iface.system.primary_addr.unwrap().contains(src)
        {
            return Err(Error::InvalidSrcAddr(src));
        }

        Ok(())
    }

    fn packet_instance_id_match(
        _iface: &Interface<Self>,
        _packet_hdr: &ospfv2::packet::PacketHdr,
    ) -> bool {
        // The Instance ID field is not present in OSPFv2's packet header.
        true
    }

    fn validate_hello(
        iface: &Interface<Self>,
        hello: &ospfv2::packet::Hello,
    ) -> Result<(), InterfaceCfgError> {
        match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::VirtualLink => {
                    }
            InterfaceType::PointToMultipoint
            | InterfaceType::Broadcast
            | InterfaceType::NonBroadcast => {
                // The advertised network mask must match ours.
                let iface_addrmask = iface.system.primary_addr.unwrap().mask();
                if hello.network_mask != iface_addrmask {
                    return Err(InterfaceCfgError::HelloMaskMismatch(
                        hello.network_mask,
                        iface_addrmask,
                    ));
                }
            }
        }

        Ok(())
    }

    fn max_packet_size(iface: &Interface<Self>) -> u16 {
        const VIRTUAL_LINK_MTU: u16 = 576;
        const IPV4_HDR_SIZE: u16 = 20;

        let mtu = if iface.is_virtual_link() {
            VIRTUAL_LINK_MTU
        } else {
            iface.system.mtu.unwrap()
        };

        let mut max = mtu - IPV4_HDR_SIZE;

        // Reserve space for the message digest when authentication is
        // enabled.
        if let Some(auth) = &iface.state.auth {
            match auth {
                AuthMethod::ManualKey(key) => {
                    max -= key.algo.digest_size() as u16
                }
                AuthMethod::Keychain(keychain) => {
                    max -= keychain.max_digest_size as u16
                }
            }
        }

        max
    }

    fn get_neighbor<'a>(
        iface: &mut Interface<Self>,
        src: &Ipv4Addr,
        router_id: Ipv4Addr,
        neighbors: &'a mut Arena<Neighbor<Self>>,
    ) -> Option<(NeighborIndex, &'a mut Neighbor<Self>)> {
        match iface.config.if_type {
            InterfaceType::PointToPoint | InterfaceType::VirtualLink => {
                // On point-to-point links and virtual links the header's
                // Router ID names the sender; elsewhere the IP source
                // address does.
                iface
                    .state
                    .neighbors
                    .get_mut_by_router_id(neighbors, router_id)
            }
            InterfaceType::Broadcast
            | InterfaceType::NonBroadcast
            | InterfaceType::PointToMultipoint => {
                // If the receiving interface connects to a broadcast network,
                // Point-to-MultiPoint network or NBMA network the sender is
                // identified by the IP source address found in the packet's
                // IP header.
                let net_id =
                    <Self as NeighborVersion<Self>>::network_id(src, router_id);
                if let Some((nbr_idx, nbr)) =
                    iface.state.neighbors.get_mut_by_net_id(neighbors, net_id)
                {
                    // Update the neighbor's Router ID before returning it.
                    iface
                        .state
                        .neighbors
                        .update_router_id(nbr_idx, nbr, router_id);
                    Some((nbr_idx, nbr))
                } else {
                    None
                }
            }
        }
    }

    fn addr_add(iface: &mut Interface<Self>, addr: IpNetwork) -> bool {
        let IpNetwork::V4(addr) = addr else {
            return false;
        };
        if !iface.system.addr_list.insert(addr) {
            return false;
        }

        // The primary address is the numerically lowest configured address.
        primary_addr_sync(&mut iface.system);
        true
    }

    fn addr_del(iface: &mut Interface<Self>, addr: IpNetwork) -> bool {
        let IpNetwork::V4(addr) = addr else {
            return false;
        };
        if !iface.system.addr_list.remove(&addr) {
            return false;
        }

        primary_addr_sync(&mut iface.system);
        true
    }
}

// ===== helper functions =====

fn primary_addr_sync(iface_sys: &mut InterfaceSys<Ospfv2>) {
    iface_sys.primary_addr = iface_sys.addr_list.iter().next().copied();
}
