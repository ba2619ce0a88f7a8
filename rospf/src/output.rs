//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use smallvec::smallvec;

use crate::area::{Area, OptionsLocation};
use crate::collections::{Arena, NeighborIndex};
use crate::instance::InstanceUpView;
use crate::interface::{Interface, InterfaceType, ism};
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::network::{MulticastAddr, NetworkVersion, SendDestination};
use crate::packet::lsa::{Lsa, LsaHdrVersion};
use crate::packet::{
    DbDescFlags, DbDescVersion, LsAckVersion, LsRequestVersion,
    LsUpdateVersion, PacketHdrVersion, PacketType,
};
use crate::tasks::messages::output::NetTxPacketMsg;
use crate::version::Version;

// ===== Database Description Packets =====

pub(crate) fn send_dbdesc<V>(
    nbr: &mut Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) where
    V: Version,
{
    let src = iface.state.src_addr.unwrap();
    let dst = nbr_destination(nbr, iface);

    // Room left for LSA headers after the fixed parts.
    let budget = V::max_packet_size(iface)
        - V::PacketHdr::LENGTH
        - V::PacketDbDesc::BASE_LENGTH;

    // Describe as much of the summary list as fits into one packet,
    // stamping each header with its live age.
    let mut used = 0;
    let mut lsa_hdrs = vec![];
    while used + V::LsaHdr::LENGTH <= budget {
        let Some((_, lsa)) = nbr.lsa_lists.db_summary.pop_first() else {
            break;
        };
        let mut lsa_hdr = lsa.hdr;
        lsa_hdr.set_age(lsa.age());
        lsa_hdrs.push(lsa_hdr);
        used += V::LsaHdr::LENGTH;
    }

    // Once past the initial packet, an empty summary list means this was
    // the final description: drop the M-bit.
    if !nbr.dd_flags.contains(DbDescFlags::I)
        && nbr.lsa_lists.db_summary.is_empty()
    {
        nbr.dd_flags.remove(DbDescFlags::M);
    }

    // Virtual links advertise an Interface MTU of zero.
    let mtu = if iface.is_virtual_link() {
        0
    } else {
        iface.system.mtu.unwrap()
    };

    let options = V::area_options(
        area,
        OptionsLocation::new_packet(
            PacketType::DbDesc,
            iface.state.auth.is_some(),
        ),
    );
    let packet = V::PacketDbDesc::generate(
        packet_header(PacketType::DbDesc, iface, area, instance),
        options,
        mtu,
        nbr.dd_flags,
        nbr.dd_seq_no,
        lsa_hdrs,
    );

    // Remember the packet verbatim: duplicates from the master are
    // answered by resending it, and the rxmt timer replays it.
    let msg = NetTxPacketMsg { packet, src, dst };
    nbr.last_sent_dbdesc = Some(msg.clone());
    iface.send_packet(msg);

    // The master retransmits unacknowledged descriptions, and both sides
    // retransmit the initial packet of the negotiation.
    if nbr.dd_flags.intersects(DbDescFlags::MS | DbDescFlags::I) {
        nbr.rxmt_dbdesc_start(iface, area, instance);
    }
}

pub(crate) fn rxmt_dbdesc<V>(nbr: &Neighbor<V>, iface: &Interface<V>)
where
    V: Version,
{
    if let Some(msg) = &nbr.last_sent_dbdesc {
        iface.send_packet(msg.clone());
    }
}

// ===== LS Request Packets =====

pub(crate) fn send_lsreq<V>(
    nbr: &mut Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) where
    V: Version,
{
    let src = iface.state.src_addr.unwrap();
    let dst = nbr_destination(nbr, iface);

    // Move as many requests as fit into one packet onto the pending list;
    // the pending set is what gets (re)transmitted until answered.
    let budget = V::max_packet_size(iface) - V::PacketHdr::LENGTH;
    let mut used = 0;
    while used + V::PacketLsRequest::ENTRY_LENGTH < budget {
        let Some((lsa_key, lsa_hdr)) = nbr.lsa_lists.ls_request.pop_first()
        else {
            break;
        };
        nbr.lsa_lists.ls_request_pending.insert(lsa_key, lsa_hdr);
        used += V::PacketLsRequest::ENTRY_LENGTH;
    }

    let entries = nbr.lsa_lists.ls_request_pending.keys().copied().collect();
    let packet = V::PacketLsRequest::generate(
        packet_header(PacketType::LsRequest, iface, area, instance),
        entries,
    );
    iface.send_packet(NetTxPacketMsg { packet, src, dst });

    nbr.rxmt_lsreq_start(iface, area, instance);
}

pub(crate) fn rxmt_lsreq<V>(
    nbr: &Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) where
    V: Version,
{
    let src = iface.state.src_addr.unwrap();
    let dst = nbr_destination(nbr, iface);

    // Replay the outstanding (pending) requests as-is.
    let entries = nbr.lsa_lists.ls_request_pending.keys().copied().collect();
    let packet = V::PacketLsRequest::generate(
        packet_header(PacketType::LsRequest, iface, area, instance),
        entries,
    );
    iface.send_packet(NetTxPacketMsg { packet, src, dst });
}

// ===== LS Update Packets =====

pub(crate) fn send_lsupd<V>(
    nbr_idx: Option<NeighborIndex>,
    iface: &mut Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    neighbors: &mut Arena<Neighbor<V>>,
) where
    V: Version,
{
    let src = iface.state.src_addr.unwrap();
    let dst = iface_destination(iface, neighbors);

    let budget = V::max_packet_size(iface)
        - V::PacketHdr::LENGTH
        - V::PacketLsUpdate::BASE_LENGTH;

    // Drain either the neighbor's private queue (answers to requests) or
    // the interface-wide flooding queue.
    let queue = match nbr_idx {
        Some(nbr_idx) => &mut neighbors[nbr_idx].lsa_lists.ls_update,
        None => &mut iface.state.ls_update_list,
    };
    let mut queue = std::mem::take(queue);

    // Emit packets until the queue drains, packing greedily up to the
    // interface budget.
    while !queue.is_empty() {
        let mut used = 0;
        let mut lsas = vec![];
        while let Some(slot) = queue.first_entry() {
            let len = slot.get().hdr.length();
            // An LSA too large for the budget goes out alone; IP-level
            // fragmentation has to carry it.
            if used > 0 && used + len > budget {
                break;
            }
            used += len;
            lsas.push(tx_stamp(&slot.remove(), iface));
        }

        let packet = V::PacketLsUpdate::generate(
            packet_header(PacketType::LsUpdate, iface, area, instance),
            lsas,
        );
        iface.send_packet(NetTxPacketMsg {
            packet,
            src,
            dst: dst.clone(),
        });
    }
}

pub(crate) fn rxmt_lsupd<V>(
    nbr: &Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) where
    V: Version,
{
    let src = iface.state.src_addr.unwrap();
    let dst = nbr_destination(nbr, iface);

    let budget = V::max_packet_size(iface)
        - V::PacketHdr::LENGTH
        - V::PacketLsUpdate::BASE_LENGTH;

    // Resend due entries in list order, which intentionally doesn't match
    // the order they were first transmitted in.
    let mut used = 0;
    let mut lsas = vec![];
    for lsa in nbr.lsa_lists.ls_rxmt.values() {
        let len = lsa.hdr.length();
        if used > 0 && used + len > budget {
            break;
        }
        used += len;
        lsas.push(tx_stamp(lsa, iface));
    }

    let packet = V::PacketLsUpdate::generate(
        packet_header(PacketType::LsUpdate, iface, area, instance),
        lsas,
    );
    iface.send_packet(NetTxPacketMsg { packet, src, dst });
}

// ===== LS Ack Packets =====

pub(crate) fn send_lsack_direct<V>(
    nbr: &Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    lsa_hdr: &V::LsaHdr,
) where
    V: Version,
{
    let src = iface.state.src_addr.unwrap();
    let dst = nbr_destination(nbr, iface);

    // A direct ack carries the single header and goes straight to the
    // sender.
    let packet = V::PacketLsAck::generate(
        packet_header(PacketType::LsAck, iface, area, instance),
        vec![*lsa_hdr],
    );
    iface.send_packet(NetTxPacketMsg { packet, src, dst });
}

pub(crate) fn send_lsack_delayed<V>(
    iface: &mut Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    neighbors: &Arena<Neighbor<V>>,
) where
    V: Version,
{
    let src = iface.state.src_addr.unwrap();
    let dst = iface_destination(iface, neighbors);

    let budget = V::max_packet_size(iface) - V::PacketHdr::LENGTH;

    // Flush the accumulated acks, batching headers up to the budget.
    while !iface.state.ls_ack_list.is_empty() {
        let mut used = 0;
        let mut lsa_hdrs = vec![];
        while used + V::LsaHdr::LENGTH <= budget {
            let Some((_, lsa_hdr)) = iface.state.ls_ack_list.pop_first()
            else {
                break;
            };
            lsa_hdrs.push(lsa_hdr);
            used += V::LsaHdr::LENGTH;
        }

        let packet = V::PacketLsAck::generate(
            packet_header(PacketType::LsAck, iface, area, instance),
            lsa_hdrs,
        );
        iface.send_packet(NetTxPacketMsg {
            packet,
            src,
            dst: dst.clone(),
        });
    }
}

// ===== helper functions =====

// Builds the common packet header for this interface and area.
fn packet_header<V>(
    pkt_type: PacketType,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) -> V::PacketHdr
where
    V: Version,
{
    V::PacketHdr::generate(
        pkt_type,
        instance.state.router_id,
        area.area_id,
        iface.config.instance_id,
    )
}

// Copies an LSA for transmission, adding the interface transmit delay to
// its live age and clamping the result at MaxAge.
fn tx_stamp<V>(lsa: &Lsa<V>, iface: &Interface<V>) -> Lsa<V>
where
    V: Version,
{
    let mut lsa = lsa.clone();
    let age = std::cmp::min(
        lsa.age() + iface.config.transmit_delay,
        lsdb::LSA_MAX_AGE,
    );
    lsa.set_age(age);
    lsa
}

// Where to send a packet aimed at one specific neighbor. Point-to-point
// links still use the multicast group; everything else unicasts.
fn nbr_destination<V>(
    nbr: &Neighbor<V>,
    iface: &Interface<V>,
) -> SendDestination<V::NetIpAddr>
where
    V: Version,
{
    let addr = if iface.config.if_type == InterfaceType::PointToPoint {
        *V::multicast_addr(MulticastAddr::AllSpfRtrs)
    } else {
        nbr.src
    };
    SendDestination::new(iface.ifindex_resolved(), smallvec![addr])
}

// Where to send a packet aimed at every adjacency on the interface:
// AllSPFRouters or AllDRouters on broadcast segments depending on our
// role, per-neighbor unicasts on NBMA/P2MP, and the resolved endpoint on
// virtual links.
fn iface_destination<V>(
    iface: &Interface<V>,
    neighbors: &Arena<Neighbor<V>>,
) -> SendDestination<V::NetIpAddr>
where
    V: Version,
{
    let addrs = match iface.config.if_type {
        InterfaceType::PointToPoint => {
            smallvec![*V::multicast_addr(MulticastAddr::AllSpfRtrs)]
        }
        InterfaceType::Broadcast => {
            let group = if matches!(
                iface.state.ism_state,
                ism::State::Dr | ism::State::Backup
            ) {
                MulticastAddr::AllSpfRtrs
            } else {
                MulticastAddr::AllDrRtrs
            };
            smallvec![*V::multicast_addr(group)]
        }
        InterfaceType::NonBroadcast | InterfaceType::PointToMultipoint => {
            iface
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::Exchange)
                .map(|nbr| nbr.src)
                .collect()
        }
        InterfaceType::VirtualLink => match &iface.state.vlink {
            Some(vlink) => smallvec![vlink.dst],
            None => smallvec![],
        },
    };
    SendDestination::new(iface.ifindex_resolved(), addrs)
}
