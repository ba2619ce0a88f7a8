//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv6Network};
use rospf_utils::ip::{AddressFamily, Ipv6AddrExt};
use rospf_utils::southbound::InterfaceFlags;

use crate::area::{Area, AreaVersion, OptionsLocation};
use crate::collections::{Arena, NeighborIndex};
use crate::debug::InterfaceInactiveReason;
use crate::error::{Error, InterfaceCfgError};
use crate::instance::InstanceUpView;
use crate::interface::{self, Interface, InterfaceSys, InterfaceVersion};
use crate::neighbor::Neighbor;
use crate::ospfv3;
use crate::ospfv3::packet::{Hello, Options, PacketHdr};
use crate::packet::auth::AuthMethod;
use crate::packet::{Packet, PacketType};
use crate::version::Ospfv3;

// ===== impl Ospfv3 =====

impl InterfaceVersion<Self> for Ospfv3 {
    fn is_ready(
        af: AddressFamily,
        iface: &Interface<Self>,
    ) -> Result<(), InterfaceInactiveReason> {
        interface::is_ready_common(iface)?;

        if iface.is_virtual_link() {
            return Ok(());
        }

        if !iface.system.flags.contains(InterfaceFlags::LOOPBACK)
            && iface.system.linklocal_addr.is_none()
        {
            return Err(InterfaceInactiveReason::MissingLinkLocalAddress);
        }

        if af == AddressFamily::Ipv4
            && !iface.system.addr_list.iter().any(|addr| addr.is_ipv4())
        {
            return Err(InterfaceInactiveReason::MissingIpv4Address);
        }

        Ok(())
    }

    fn src_addr(iface_sys: &InterfaceSys<Self>) -> Ipv6Addr {
        iface_sys.linklocal_addr.unwrap().ip()
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
            instance_id: iface.config.instance_id,
            auth_seqno: None,
        };

        let mut options = Self::area_options(
            area,
            OptionsLocation::new_packet(
                PacketType::Hello,
                iface.state.auth.is_some(),
            ),
        );
        if iface.config.demand_circuit {
            options.insert(Options::DC);
        }

        Packet::Hello(Hello {
            hdr,
            iface_id: iface.ifindex_resolved(),
            priority: iface.config.priority,
            options,
            hello_interval: iface.config.hello_interval,
            dead_interval: iface.config.dead_interval,
            dr: iface.state.dr,
            bdr: iface.state.bdr,
            neighbors: iface.state.neighbors.router_ids().collect(),
        })
    }

    fn validate_packet_dst(
        iface: &Interface<Self>,
        dst: Ipv6Addr,
    ) -> Result<(), Error<Self>> {
        // Accept only unicast packets on virtual links.
        if iface.is_virtual_link() {
            if dst.is_multicast() {
                return Err(Error::InvalidDstAddr(dst));
            } else {
                return Ok(());
            }
        }

        // Unicasts must target one of the interface's addresses.
        if iface
            .system
            .linklocal_addr
            .map(|addr| addr.ip() == dst)
            .unwrap_or(false)
        {
            return Ok(());
        }

        interface::validate_packet_dst_common(iface, dst)
    }

    fn validate_packet_src(
        _iface: &Interface<Self>,
        src: Ipv6Addr,
    ) -> Result<(), Error<Self>> {
        if !src.is_usable() {
            return Err(Error::InvalidSrcAddr(src));
        }

        Ok(())
    }

    fn packet_instance_id_match(
        iface: &Interface<Self>,
        packet_hdr: &ospfv3::packet::PacketHdr,
    ) -> bool {
        packet_hdr.instance_id == iface.config.instance_id
    }

    fn validate_hello(
        _iface: &Interface<Self>,
        hello: &ospfv3::packet::Hello,
    ) -> Result<(), InterfaceCfgError> {
        // Validate the setting of the AF-bit.
        if hello.hdr.instance_id >= 32 && !hello.options.contains(Options::AF)
        {
            return Err(InterfaceCfgError::AfBitClear);
        }

        Ok(())
    }

    fn max_packet_size(iface: &Interface<Self>) -> u16 {
        const VIRTUAL_LINK_MTU: u16 = 1280;
        const IPV6_HDR_SIZE: u16 = 40;

        let mtu = if iface.is_virtual_link() {
            VIRTUAL_LINK_MTU
        } else {
            iface.system.mtu.unwrap()
        };

        let mut max = mtu - IPV6_HDR_SIZE;

        // Reserve space for the authentication trailer when authentication
        // is enabled.
        if let Some(auth) = &iface.state.auth {
            max -= ospfv3::packet::AUTH_TRAILER_HDR_SIZE;
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
        _src: &Ipv6Addr,
        router_id: Ipv4Addr,
        neighbors: &'a mut Arena<Neighbor<Self>>,
    ) -> Option<(NeighborIndex, &'a mut Neighbor<Self>)> {
        // OSPFv3 identifies neighbors on a link by Router ID alone.
        iface
            .state
            .neighbors
            .get_mut_by_router_id(neighbors, router_id)
    }

    fn addr_add(iface: &mut Interface<Self>, addr: IpNetwork) -> bool {
        // Link-local addresses are tracked separately: they are the source
        // of every OSPFv3 packet sent on the link.
        if let IpNetwork::V6(addr) = addr
            && is_linklocal(&addr)
        {
            iface.system.linklocal_addr = Some(addr);
            return true;
        }

        iface.system.addr_list.insert(addr)
    }

    fn addr_del(iface: &mut Interface<Self>, addr: IpNetwork) -> bool {
        if let IpNetwork::V6(addr) = addr
            && iface.system.linklocal_addr == Some(addr)
        {
            iface.system.linklocal_addr = None;
            return true;
        }

        iface.system.addr_list.remove(&addr)
    }
}

// ===== helper functions =====

fn is_linklocal(addr: &Ipv6Network) -> bool {
    (addr.ip().segments()[0] & 0xffc0) == 0xfe80
}
