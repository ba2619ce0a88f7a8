//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::btree_map;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::Utc;

use crate::area::{Area, AreaType};
use crate::collections::{
    AreaIndex, AreaKey, Arena, InterfaceIndex, InterfaceKey, LsaEntryKey,
    LsdbIndex, LsdbKey, NeighborIndex, NeighborKey, lsdb_get, lsdb_get_mut,
    lsdb_index, lsdb_index_mut,
};
use crate::debug::{Debug, LsaFlushReason, SeqNoMismatchReason};
use crate::error::{Error, InterfaceCfgError};
use crate::flood::flood;
use crate::gr::GrExitReason;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::lsdb::{
    self, LsaEntry, LsaEntryFlags, LsaOriginateEvent, lsa_compare,
};
use crate::neighbor::{LastDbDesc, Neighbor, RxmtPacketType, nsm};
use crate::packet::error::DecodeResult;
use crate::packet::lsa::{
    Lsa, LsaBodyVersion, LsaHdrVersion, LsaKey, LsaScope, LsaTypeVersion,
};
use crate::packet::{
    DbDescFlags, DbDescVersion, HelloVersion, LsAckVersion, LsRequestVersion,
    LsUpdateVersion, OptionsVersion, Packet, PacketBase, PacketHdrVersion,
    PacketType,
};
use crate::tasks::messages::ProtocolInputMsg;
use crate::version::Version;
use crate::{gr, output, spf, tasks};

// ===== Message dispatch =====

pub(crate) fn process_protocol_msg<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    msg: ProtocolInputMsg<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    match msg {
        ProtocolInputMsg::IsmEvent(msg) => process_ism_event(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.event,
        )?,
        ProtocolInputMsg::NsmEvent(msg) => process_nsm_event(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
            msg.event,
        )?,
        ProtocolInputMsg::NetRxPacket(msg) => {
            process_packet(
                instance,
                arenas,
                &msg.ifname,
                msg.src,
                msg.dst,
                msg.packet,
            )?;
        }
        ProtocolInputMsg::DbDescFree(msg) => process_dbdesc_free(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
        )?,
        ProtocolInputMsg::SendLsUpdate(msg) => process_send_lsupd(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
        )?,
        ProtocolInputMsg::RxmtInterval(msg) => process_packet_rxmt(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
            msg.packet_type,
        )?,
        ProtocolInputMsg::DelayedAck(msg) => process_delayed_ack_timeout(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
        )?,
        ProtocolInputMsg::LsaOrigEvent(msg) => {
            process_lsa_orig_event(instance, arenas, msg.event)?
        }
        ProtocolInputMsg::LsaOrigCheck(msg) => process_lsa_orig_check(
            instance,
            arenas,
            msg.lsdb_key,
            msg.options,
            msg.lsa_id,
            msg.lsa_body,
        )?,
        ProtocolInputMsg::LsaFlush(msg) => process_lsa_flush(
            instance,
            arenas,
            msg.lsdb_key,
            msg.entry_key,
            msg.reason,
        )?,
        ProtocolInputMsg::AgeTick(_) => process_age_tick(instance, arenas)?,
        ProtocolInputMsg::LsdbMaxAgeSweep(msg) => {
            process_lsdb_maxage_sweep_interval(instance, arenas, msg.lsdb_key)?
        }
        ProtocolInputMsg::OverflowExit(_) => {
            lsdb::overflow_exit_check(instance, arenas);
        }
        ProtocolInputMsg::SpfDelayEvent(msg) => {
            process_spf_delay_event(instance, arenas, msg.event)?
        }
        ProtocolInputMsg::GracePeriod(msg) => process_grace_period_timeout(
            instance,
            arenas,
            msg.area_key,
            msg.iface_key,
            msg.nbr_key,
        )?,
        ProtocolInputMsg::GrRestartExpiry(_) => {
            gr::restart_exit(instance, arenas, GrExitReason::TimedOut);
        }
    }

    Ok(())
}

// ===== Interface FSM event =====

pub(crate) fn process_ism_event<V>(
    instance: &InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    event: ism::Event,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Resolve the referenced objects.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_iface_idx, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    iface.fsm(
        area,
        instance,
        &mut arenas.neighbors,
        &arenas.lsa_entries,
        event,
    );

    Ok(())
}

// ===== Neighbor FSM event =====

pub(crate) fn process_nsm_event<V>(
    instance: &InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
    event: nsm::Event,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Resolve the referenced objects.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (nbr_idx, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    nbr.fsm(iface, area, instance, &arenas.lsa_entries, event);
    if nbr.state == nsm::State::Down {
        // The neighbor is gone for good; drop its state.
        iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);

        // The neighbor list changed; rebuild the Hello transmission.
        iface.sync_hello_tx(area, instance);
    }

    Ok(())
}

// ===== Network packet receipt =====

pub(crate) fn process_packet<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    ifname: &str,
    src: V::NetIpAddr,
    dst: V::NetIpAddr,
    packet: DecodeResult<Packet<V>>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // The I/O collaborator identifies the receiving interface by name.
    let Some((area_idx, iface_idx)) =
        arenas.areas.indexes().find_map(|area_idx| {
            let area = &arenas.areas[area_idx];
            area.interfaces
                .get_by_name(&arenas.interfaces, ifname)
                .map(|(iface_idx, _)| (area_idx, iface_idx))
        })
    else {
        return Ok(());
    };
    let area = &arenas.areas[area_idx];
    let iface = &mut arenas.interfaces[iface_idx];

    let packet = packet.map_err(Error::PacketDecodeError)?;

    // Ignore packets received on inoperational or passive interfaces.
    if iface.is_down() || iface.is_passive() {
        return Ok(());
    }

    V::validate_packet_dst(iface, dst)?;

    V::validate_packet_src(iface, src)?;

    // The packet must belong to this interface's area.
    let pkt_type = packet.hdr().pkt_type();
    if packet.hdr().area_id() != area.area_id {
        return Err(Error::InterfaceCfgError(
            iface.name.clone(),
            src,
            pkt_type,
            InterfaceCfgError::AreaIdMismatch(
                packet.hdr().area_id(),
                area.area_id,
            ),
        ));
    }

    // OSPFv3 demultiplexes multiple instances on a link by Instance ID.
    if !V::packet_instance_id_match(iface, packet.hdr()) {
        // A mismatch just means the link is shared; nothing is wrong.
        return Ok(());
    }

    // Replay protection.
    let router_id = packet.hdr().router_id();
    if let Some(auth_seqno) = packet.hdr().auth_seqno()
        && let Some((_, nbr)) =
            V::get_neighbor(iface, &src, router_id, &mut arenas.neighbors)
    {
        // Drop packets whose sequence number regressed relative to what
        // this neighbor last sent. Numbers are tracked per packet type
        // to accommodate the prioritization rules of RFC 4222.
        let nbr_auth_seqno = nbr.auth_seqno.entry(pkt_type).or_default();
        match auth_seqno.cmp(nbr_auth_seqno) {
            Ordering::Less => {
                return Err(Error::PacketAuthInvalidSeqno(src, auth_seqno));
            }
            Ordering::Equal if V::STRICT_AUTH_SEQNO_CHECK => {
                return Err(Error::PacketAuthInvalidSeqno(src, auth_seqno));
            }
            _ => {
            }
        }

        *nbr_auth_seqno = auth_seqno;
    }

    Debug::<V>::PacketRx(iface, &src, &dst, &packet).log();

    if let Packet::Hello(pkt) = packet {
        process_packet_hello(
            iface,
            area,
            instance,
            &mut arenas.neighbors,
            &arenas.lsa_entries,
            src,
            pkt,
        )
    } else {
        // Non-Hello packets not matching any active neighbor are discarded.
        let (nbr_idx, nbr) =
            V::get_neighbor(iface, &src, router_id, &mut arenas.neighbors)
                .ok_or(Error::UnknownNeighbor(src, router_id))?;

        match packet {
            Packet::Hello(_) => unreachable!(),
            Packet::DbDesc(pkt) => process_packet_dbdesc(
                nbr,
                iface,
                area,
                instance,
                &arenas.lsa_entries,
                src,
                pkt,
            ),
            Packet::LsRequest(pkt) => process_packet_lsreq(
                nbr,
                iface,
                area,
                instance,
                &arenas.lsa_entries,
                pkt,
            ),
            Packet::LsUpdate(pkt) => process_packet_lsupd(
                nbr_idx, iface_idx, area_idx, instance, arenas, src, pkt,
            ),
            Packet::LsAck(pkt) => process_packet_lsack(nbr, pkt),
        }
    }
}

fn process_packet_hello<V>(
    iface: &mut Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    neighbors: &mut Arena<Neighbor<V>>,
    lsa_entries: &Arena<LsaEntry<V>>,
    src: V::NetIpAddr,
    hello: V::PacketHello,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let protocol_input = &instance.tx.protocol_input;

    // Reject Hellos that disagree with the interface configuration.
    process_packet_hello_sanity_checks(iface, area, instance, &hello)
        .map_err(|error| {
            Error::InterfaceCfgError(
                iface.name.clone(),
                src,
                PacketType::Hello,
                error,
            )
        })?;

    // A Hello from an unknown router brings the neighbor into being.
    let (_, nbr) =
        match V::get_neighbor(iface, &src, hello.router_id(), neighbors) {
            Some(value) => value,
            None => {
                let (nbr_idx, nbr) = iface.state.neighbors.insert(
                    neighbors,
                    hello.router_id(),
                    src,
                );

                nbr.iface_id = hello.iface_id();
                nbr.priority = hello.priority();
                if iface.is_broadcast_or_nbma() {
                    nbr.dr = hello.dr();
                    nbr.bdr = hello.bdr();
                }

                // The neighbor list changed; rebuild the Hello transmission.
                iface.sync_hello_tx(area, instance);

                (nbr_idx, nbr)
            }
        };

    // Track source address changes. Under OSPFv2 only point-to-point
    // interfaces can see one; on other interface types a new address
    // would have produced a new neighbor.
    nbr.src = src;

    nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::HelloRcvd);

    // Whether we appear in the neighbor list decides 1-Way vs 2-Way.
    if hello
        .neighbors()
        .iter()
        .any(|id| *id == instance.state.router_id)
    {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::TwoWayRcvd);
    } else {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::OneWayRcvd);

        nbr.iface_id = hello.iface_id();
        if iface.is_broadcast_or_nbma() {
            nbr.priority = hello.priority();
            nbr.dr = hello.dr();
            nbr.bdr = hello.bdr();
        }

        return Ok(());
    }

    if hello.iface_id() != nbr.iface_id {
        nbr.iface_id = hello.iface_id();

        // (Re)originate LSAs that might have been affected.
        instance.tx.protocol_input.lsa_orig_event(
            LsaOriginateEvent::NeighborInterfaceIdChange {
                area_id: area.id,
                iface_id: iface.id,
            },
        );
    }

    // Priority and DR/BDR fields are not examined on
    // Point-to-MultiPoint interfaces (errata 4022 of RFC 2328).
    if iface.is_broadcast_or_nbma() {
        if hello.priority() != nbr.priority {
            nbr.priority = hello.priority();
            protocol_input.ism_event(area.id, iface.id, ism::Event::NbrChange);
        }

        let nbr_net_id = nbr.network_id();
        if iface.state.ism_state == ism::State::Waiting
            && ((hello.dr() == Some(nbr_net_id) && hello.bdr().is_none())
                || hello.bdr() == Some(nbr_net_id))
        {
            protocol_input.ism_event(
                area.id,
                iface.id,
                ism::Event::BackupSeen,
            );
        }
        if (hello.dr() == Some(nbr_net_id) && nbr.dr != Some(nbr_net_id))
            || (hello.dr() != Some(nbr_net_id) && nbr.dr == Some(nbr_net_id))
            || (hello.bdr() == Some(nbr_net_id)
                && nbr.bdr != Some(nbr_net_id))
            || (hello.bdr() != Some(nbr_net_id)
                && nbr.bdr == Some(nbr_net_id))
        {
            protocol_input.ism_event(area.id, iface.id, ism::Event::NbrChange);
        }

        nbr.dr = hello.dr();
        nbr.bdr = hello.bdr();
    }

    Ok(())
}

fn process_packet_hello_sanity_checks<V>(
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    hello: &V::PacketHello,
) -> Result<(), InterfaceCfgError>
where
    V: Version,
{
    V::validate_hello(iface, hello)?;

    if hello.hello_interval() != iface.config.hello_interval {
        return Err(InterfaceCfgError::HelloIntervalMismatch(
            hello.hello_interval(),
            iface.config.hello_interval,
        ));
    }

    if hello.dead_interval() != iface.config.dead_interval as u32 {
        return Err(InterfaceCfgError::DeadIntervalMismatch(
            hello.dead_interval(),
            iface.config.dead_interval as u32,
        ));
    }

    // Both ends must agree on the area's external capability.
    if hello.options().e_bit() && area.config.area_type != AreaType::Normal
        || !hello.options().e_bit()
            && area.config.area_type == AreaType::Normal
    {
        return Err(InterfaceCfgError::ExternalRoutingCapabilityMismatch(
            hello.options().e_bit(),
        ));
    }

    // Two routers claiming the same Router ID on one segment.
    if hello.router_id() == instance.state.router_id {
        return Err(InterfaceCfgError::DuplicateRouterId(hello.router_id()));
    }

    Ok(())
}

fn process_packet_dbdesc<V>(
    nbr: &mut Neighbor<V>,
    iface: &mut Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    lsa_entries: &Arena<LsaEntry<V>>,
    src: V::NetIpAddr,
    dbdesc: V::PacketDbDesc,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // MTU mismatch check (suppressed on virtual links, which advertise an
    // MTU of zero).
    if !iface.config.mtu_ignore
        && !iface.is_virtual_link()
        && dbdesc.mtu() > iface.system.mtu.unwrap()
    {
        return Err(Error::InterfaceCfgError(
            iface.name.clone(),
            src,
            PacketType::DbDesc,
            InterfaceCfgError::MtuMismatch(dbdesc.mtu()),
        ));
    }

    // What's acceptable next depends on where the adjacency stands.
    match nbr.state {
        nsm::State::Down | nsm::State::Attempt | nsm::State::TwoWay => {
            return Err(Error::DbDescReject(nbr.router_id, nbr.state));
        }
        nsm::State::Init | nsm::State::ExStart => {
            if nbr.state == nsm::State::Init {
                let event = nsm::Event::TwoWayRcvd;
                nbr.fsm(iface, area, instance, lsa_entries, event);
                if nbr.state != nsm::State::ExStart {
                    return Ok(());
                }
                // Fall through to the ExStart case.
            }

            if dbdesc
                .dd_flags()
                .contains(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS)
                && dbdesc.lsa_hdrs().is_empty()
                && dbdesc.router_id() > instance.state.router_id
            {
                // Concede mastership and adopt the master's sequence number.
                nbr.dd_flags.remove(DbDescFlags::MS);
                nbr.dd_seq_no = dbdesc.dd_seq_no();
            } else if !dbdesc
                .dd_flags()
                .contains(DbDescFlags::I | DbDescFlags::MS)
                && dbdesc.dd_seq_no() == nbr.dd_seq_no
                && dbdesc.router_id() < instance.state.router_id
            {
                // The higher Router ID stays master.
            } else {
                return Ok(());
            }

            nbr.options = Some(dbdesc.options());
            let event = nsm::Event::NegotiationDone;
            nbr.fsm(iface, area, instance, lsa_entries, event);
        }
        nsm::State::Exchange => {
            // Duplicate of the neighbor's last packet?
            if nbr.dbdesc_is_dup(&dbdesc) {
                // As slave, answer the duplicate by resending the previous
                // packet.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface);
                }

                return Ok(());
            }

            // Sanity checks.
            let last_rcvd_dbdesc = nbr.last_rcvd_dbdesc.as_ref().unwrap();
            if dbdesc.dd_flags().contains(DbDescFlags::I)
                || dbdesc.dd_flags().contains(DbDescFlags::MS)
                    != last_rcvd_dbdesc.dd_flags.contains(DbDescFlags::MS)
            {
                let reason = SeqNoMismatchReason::InconsistentFlags;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if dbdesc.options() != last_rcvd_dbdesc.options {
                let reason = SeqNoMismatchReason::InconsistentOptions;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
            if (nbr.dd_flags.contains(DbDescFlags::MS)
                && dbdesc.dd_seq_no() != nbr.dd_seq_no)
                || (!nbr.dd_flags.contains(DbDescFlags::MS)
                    && dbdesc.dd_seq_no() != nbr.dd_seq_no + 1)
            {
                let reason = SeqNoMismatchReason::InconsistentSeqNo;
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, lsa_entries, event);
                return Ok(());
            }
        }
        nsm::State::Loading | nsm::State::Full => {
            // Duplicate of the neighbor's last packet?
            if nbr.dbdesc_is_dup(&dbdesc) {
                // A duplicate from the master means our last packet was lost;
                // resend it.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface);
                }

                return Ok(());
            }

            let reason = SeqNoMismatchReason::UnexpectedDbDesc;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }
    }

    // The packet passed every check, so the pending retransmission
    // is obsolete.
    nbr.rxmt_dbdesc_stop();

    // Record what the neighbor advertised.
    for lsa_hdr in dbdesc.lsa_hdrs() {
        // An unacceptable LSA type aborts the exchange.
        if !V::lsa_type_is_valid(
            Some(area.config.area_type),
            nbr.options,
            lsa_hdr.lsa_type(),
        ) {
            let reason = SeqNoMismatchReason::InvalidLsaType;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, lsa_entries, event);
            return Ok(());
        }

        // Per RFC 5243, database summary entries that the received
        // header shows to be the same or older are dropped.
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) =
            nbr.lsa_lists.db_summary.entry(lsa_key)
        {
            let db_summ_lsa = o.get();
            if lsa_compare::<V>(&db_summ_lsa.hdr, lsa_hdr)
                != Ordering::Greater
            {
                o.remove();
            }
        }

        // Request the LSA when it's missing locally or the local copy
        // is older.
        let lsdb = match lsa_hdr.lsa_type().scope() {
            LsaScope::Link => &iface.state.lsdb,
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => unreachable!(),
        };
        if let Some((_, entry)) = lsdb.get(lsa_entries, &lsa_key)
            && lsa_compare::<V>(&entry.data.hdr, lsa_hdr) != Ordering::Less
        {
            continue;
        }
        nbr.lsa_lists.ls_request.insert(lsa_key, *lsa_hdr);
    }

    // Begin requesting the missing LSAs.
    if !nbr.lsa_lists.ls_request.is_empty()
        && nbr.lsa_lists.ls_request_pending.is_empty()
    {
        output::send_lsreq(nbr, iface, area, instance);
    }

    // Master and slave advance the exchange differently.
    let mut exchange_done = false;
    if nbr.dd_flags.contains(DbDescFlags::MS) {
        nbr.dd_seq_no += 1;

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags().contains(DbDescFlags::M)
        {
            exchange_done = true;
        } else {
            output::send_dbdesc(nbr, iface, area, instance);
        }
    } else {
        nbr.dd_seq_no = dbdesc.dd_seq_no();

        output::send_dbdesc(nbr, iface, area, instance);

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags().contains(DbDescFlags::M)
        {
            exchange_done = true;
        }
    }
    if exchange_done {
        nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::ExchangeDone);

        // The slave keeps its last packet for RouterDeadInterval; a
        // packet from the master arriving later than that raises a
        // SeqNumberMismatch event.
        if !nbr.dd_flags.contains(DbDescFlags::MS) {
            let dbdesc_free_timer =
                tasks::dbdesc_free_timer(nbr, iface, area, instance);
            nbr.tasks.dbdesc_free_timer = Some(dbdesc_free_timer);
        }
    }

    // Remember the packet for duplicate detection.
    nbr.last_rcvd_dbdesc = Some(LastDbDesc {
        options: dbdesc.options(),
        dd_flags: dbdesc.dd_flags(),
        dd_seq_no: dbdesc.dd_seq_no(),
    });

    Ok(())
}

fn process_packet_lsreq<V>(
    nbr: &mut Neighbor<V>,
    iface: &mut Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    lsa_entries: &Arena<LsaEntry<V>>,
    ls_req: V::PacketLsRequest,
) -> Result<(), Error<V>>
where
    V: Version,
{
    if nbr.state < nsm::State::Exchange {
        Debug::<V>::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Answer each requested LSA out of the database.
    for lsa_key in ls_req.entries() {
        let lsdb = match lsa_key.lsa_type.scope() {
            LsaScope::Link => &iface.state.lsdb,
            LsaScope::Area => &area.state.lsdb,
            LsaScope::As => &instance.state.lsdb,
            LsaScope::Unknown => {
                // OSPFv3: ignore requests for LSAs of unknown scope.
                continue;
            }
        };

        if let Some((_, entry)) = lsdb.get(lsa_entries, lsa_key) {
            let lsa = entry.data.clone();
            nbr.lsa_lists.ls_update.insert(*lsa_key, lsa);
        } else {
            // Requests for LSAs we don't have mean the exchange derailed.
            nbr.fsm(iface, area, instance, lsa_entries, nsm::Event::BadLsReq);
            return Ok(());
        }
    }

    // Queue the replies.
    if !nbr.lsa_lists.ls_update.is_empty() {
        instance
            .tx
            .protocol_input
            .send_lsupd(area.id, iface.id, Some(nbr.id));
    }

    Ok(())
}

fn process_packet_lsupd<V>(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    src: V::NetIpAddr,
    ls_upd: V::PacketLsUpdate,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let nbr = &arenas.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::<V>::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Work through the LSAs; acknowledgments accumulate in
    // installation order.
    for lsa in ls_upd.into_lsas() {
        let stop = process_packet_lsupd_lsa(
            nbr_idx, iface_idx, area_idx, instance, arenas, src, lsa,
        );
        if stop {
            break;
        }
    }

    Ok(())
}

fn process_packet_lsupd_lsa<V>(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    src: V::NetIpAddr,
    #[allow(unused_mut)] mut lsa: Lsa<V>,
) -> bool
where
    V: Version,
{
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];

    // Generate raw data that might be missing for LSAs received in testing
    // mode.
    #[cfg(feature = "testing")]
    if lsa.raw.is_empty() {
        lsa.encode();
    }

    // Step 1: full validation, stricter than the checksum-only check
    // the RFC asks for.
    if let Err(error) = lsa.validate() {
        Debug::<V>::LsaDiscard(nbr.router_id, &lsa.hdr, &error).log();

        return false;
    }

    // A DoNotAge LSA is only accepted from neighbors that negotiated the
    // demand circuit extensions.
    if lsa.hdr.is_dna()
        && !nbr.options.map(|options| options.dc_bit()).unwrap_or(false)
    {
        let error =
            crate::packet::error::LsaValidationError::DoNotAgeUnsupported;
        Debug::<V>::LsaDiscard(nbr.router_id, &lsa.hdr, &error).log();
        return false;
    }

    // Steps 2-3: types this area or neighbor can't accept.
    if !V::lsa_type_is_valid(
        Some(area.config.area_type),
        nbr.options,
        lsa.hdr.lsa_type(),
    ) {
        return false;
    }

    // Step 5: look for the database copy.
    let lsdb_idx =
        V::lsdb_get_by_lsa_type(iface_idx, area_idx, lsa.hdr.lsa_type());
    let lsdb = match lsdb_idx {
        LsdbIndex::Link(_, _) => &iface.state.lsdb,
        LsdbIndex::Area(_) => &area.state.lsdb,
        LsdbIndex::As => &instance.state.lsdb,
    };
    let lsa_key = lsa.hdr.key();
    let entry = lsdb.get(&arenas.lsa_entries, &lsa_key).map(|(_, entry)| entry);

    // Step 4: a MaxAge LSA nobody has installed, with no exchange
    // in progress, is acked and forgotten.
    if lsa.hdr.is_maxage()
        && entry.is_none()
        && !arenas.neighbors.iter().any(|(_, nbr)| {
            matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
        })
    {
        let nbr = &arenas.neighbors[nbr_idx];
        output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);

        return false;
    }

    // Step 5 continued: the received copy wins.
    let lsa_cmp = entry.map(|entry| lsa_compare::<V>(&entry.data.hdr, &lsa.hdr));
    if matches!(lsa_cmp, None | Some(Ordering::Less)) {
        // (5.a) MinLSArrival check.
        if let Some(entry) = entry
            && lsdb::lsa_min_arrival_check(entry)
        {
            Debug::<V>::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();

            return false;
        }

        let lsa = Arc::new(lsa);

        // Step 5.b: flood it on right away.
        let src_idxs = Some((iface_idx, nbr_idx));
        let echoed = flood(
            instance,
            &arenas.areas,
            &mut arenas.interfaces,
            &mut arenas.neighbors,
            lsdb_idx,
            &lsa,
            src_idxs,
        );

        // Step 5.c is subsumed by installation, which purges the old
        // copy from every retransmission list.

        // Step 5.d: install, replacing the old copy.
        let entry_idx = lsdb::install(instance, arenas, lsdb_idx, lsa);
        let entry = &mut arenas.lsa_entries[entry_idx];
        entry.flags.insert(LsaEntryFlags::RECEIVED);

        instance.state.rx_lsa_count += 1;
        instance.state.discontinuity_time = Utc::now();

        // Step 5.e: decide whether an acknowledgment is owed.
        let lse_hdr = entry.data.hdr;
        let lse_data = entry.data.clone();
        let nbr = &mut arenas.neighbors[nbr_idx];
        let iface = &mut arenas.interfaces[iface_idx];
        let area = &arenas.areas[area_idx];
        let nbr_net_id = nbr.network_id();
        let nbr_router_id = nbr.router_id;
        if !echoed
            && (iface.state.ism_state != ism::State::Backup
                || iface.state.dr == Some(nbr_net_id))
        {
            iface.enqueue_delayed_ack(area, instance, &lse_hdr);
        }

        // Grace-LSA processing.
        if let Some((grace_period, reason, addr)) = lse_data.body.as_grace() {
            // On multi-access OSPFv2 segments the restarter is identified
            // by the interface address carried in the Grace-LSA body.
            let nbr = match addr {
                Some(addr) => V::get_neighbor(
                    iface,
                    &addr,
                    nbr_router_id,
                    &mut arenas.neighbors,
                )
                .map(|(_, nbr)| nbr),
                None => Some(nbr),
            };

            if let Some(nbr) = nbr {
                gr::helper_process_grace_lsa(
                    nbr,
                    iface,
                    area,
                    &lse_hdr,
                    grace_period,
                    reason,
                    instance,
                );
            }
        }

        // Step 5.f: one of our own LSAs came back from the network.
        let entry = &arenas.lsa_entries[entry_idx];
        if entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED) {
            Debug::<V>::LsaSelfOriginated(nbr_router_id, &entry.data.hdr).log();

            let (lsdb_id, _) = lsdb_index(
                &instance.state.lsdb,
                &arenas.areas,
                &arenas.interfaces,
                lsdb_idx,
            );
            instance.tx.protocol_input.lsa_orig_event(
                LsaOriginateEvent::SelfOriginatedLsaRcvd {
                    lsdb_id,
                    entry_id: entry.id,
                },
            );
        }

        return false;
    }

    // Step 6 (errata 3974): same instance as the database copy.
    let nbr = &mut arenas.neighbors[nbr_idx];
    let entry = entry.unwrap();
    if lsa_cmp == Some(Ordering::Equal) {
        // Finding it on the retransmission list makes it an implied ack.
        if let btree_map::Entry::Occupied(o) = nbr.lsa_lists.ls_rxmt.entry(lsa_key)
        {
            o.remove();
            nbr.rxmt_lsupd_stop_check();

            let nbr_net_id = nbr.network_id();
            if iface.state.ism_state == ism::State::Backup
                && iface.state.dr == Some(nbr_net_id)
            {
                iface.enqueue_delayed_ack(area, instance, &lsa.hdr);
            }
        } else {
            output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);
        }

        return false;
    }

    // Step 7 (errata 3974): still on the neighbor's request list,
    // so the exchange went wrong somewhere.
    if nbr.lsa_lists.ls_request.contains_key(&lsa_key)
        || nbr.lsa_lists.ls_request_pending.contains_key(&lsa_key)
    {
        nbr.fsm(
            iface,
            area,
            instance,
            &arenas.lsa_entries,
            nsm::Event::BadLsReq,
        );

        // The rest of the packet is abandoned.
        return true;
    }

    // Step 8: ours is more recent. A MaxAge/MaxSeqNo copy in the
    // middle of a wraparound is a special case: drop without
    // acking.
    if entry.data.hdr.is_maxage()
        && entry.data.hdr.seq_no() == lsdb::LSA_MAX_SEQ_NO
    {
        return false;
    }
    if !lsdb::lsa_min_arrival_check(entry) {
        // Otherwise answer with the newer copy.
        nbr.lsa_lists.ls_update.insert(lsa_key, entry.data.clone());
        instance
            .tx
            .protocol_input
            .send_lsupd(area.id, iface.id, Some(nbr.id));
    } else {
        Debug::<V>::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
    }

    false
}

fn process_packet_lsack<V>(
    nbr: &mut Neighbor<V>,
    ls_ack: V::PacketLsAck,
) -> Result<(), Error<V>>
where
    V: Version,
{
    if nbr.state < nsm::State::Exchange {
        Debug::<V>::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Each acknowledged header may clear a retransmission entry.
    for lsa_hdr in ls_ack.lsa_hdrs() {
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) = nbr.lsa_lists.ls_rxmt.entry(lsa_key)
        {
            let lsa = o.get();
            if lsa_compare::<V>(&lsa.hdr, lsa_hdr) == Ordering::Equal {
                o.remove();
                nbr.rxmt_lsupd_stop_check();
            } else {
                Debug::<V>::QuestionableAck(nbr.router_id, lsa_hdr).log();
            }
        }
    }

    Ok(())
}

// ===== Free last sent/received Database Description packets =====

pub(crate) fn process_dbdesc_free<V>(
    _instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Resolve the referenced objects.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_iface_idx, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    nbr.tasks.dbdesc_free_timer = None;
    nbr.last_rcvd_dbdesc = None;
    nbr.last_sent_dbdesc = None;

    Ok(())
}

// ===== Request to send LS Update =====

pub(crate) fn process_send_lsupd<V>(
    instance: &InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: Option<NeighborKey>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Resolve the interface, and the neighbor for unicast updates.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_iface_idx, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let nbr_idx = match &nbr_key {
        Some(nbr_key) => {
            let (nbr_idx, _) = iface
                .state
                .neighbors
                .get_mut_by_key(&mut arenas.neighbors, nbr_key)?;
            Some(nbr_idx)
        }
        None => None,
    };

    iface.state.tasks.ls_update_timer = None;
    output::send_lsupd(nbr_idx, iface, area, instance, &mut arenas.neighbors);

    Ok(())
}

// ===== Packet retransmission =====

pub(crate) fn process_packet_rxmt<V>(
    instance: &InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
    packet_type: RxmtPacketType,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Resolve the referenced objects.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_iface_idx, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    // A neighbor that keeps ignoring retransmissions is assumed dead.
    if nbr.rxmt_watchdog_tick(instance.config.max_rxmt_window) {
        instance.tx.protocol_input.nsm_event(
            area.id,
            iface.id,
            nbr.id,
            nsm::Event::InactivityTimer,
        );
        return Ok(());
    }

    match packet_type {
        RxmtPacketType::DbDesc => {
            output::rxmt_dbdesc(nbr, iface);
        }
        RxmtPacketType::LsRequest => {
            output::rxmt_lsreq(nbr, iface, area, instance);
        }
        RxmtPacketType::LsUpdate => {
            output::rxmt_lsupd(nbr, iface, area, instance);
        }
    }

    Ok(())
}

// ===== Delayed Ack timeout =====

pub(crate) fn process_delayed_ack_timeout<V>(
    instance: &InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    area_key: AreaKey,
    iface_key: InterfaceKey,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Resolve the referenced objects.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_iface_idx, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;

    iface.state.tasks.ls_delayed_ack = None;
    output::send_lsack_delayed(iface, area, instance, &arenas.neighbors);

    Ok(())
}

// ===== LSA origination event =====

pub(crate) fn process_lsa_orig_event<V>(
    instance: &InstanceUpView<'_, V>,
    arenas: &InstanceArenas<V>,
    event: LsaOriginateEvent,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Check which LSAs need to be reoriginated or flushed.
    V::lsa_orig_event(instance, arenas, event)
}

// ===== LSA origination check =====

pub(crate) fn process_lsa_orig_check<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    lsdb_key: LsdbKey,
    options: Option<V::PacketOptions>,
    lsa_id: Ipv4Addr,
    lsa_body: V::LsaBody,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let (lsdb_idx, _) = lsdb_get(
        &instance.state.lsdb,
        &arenas.areas,
        &arenas.interfaces,
        &lsdb_key,
    )?;

    lsdb::originate_check(
        instance, arenas, lsdb_idx, options, lsa_id, lsa_body,
    );

    Ok(())
}

// ===== LSA flush event =====

pub(crate) fn process_lsa_flush<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    lsdb_key: LsdbKey,
    entry_key: LsaEntryKey<V::LsaType>,
    reason: LsaFlushReason,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_key,
    )?;
    let (entry_idx, _) = lsdb.get_mut_by_key(&mut arenas.lsa_entries, &entry_key)?;

    lsdb::flush(instance, arenas, lsdb_idx, entry_idx, reason);

    Ok(())
}

// ===== LSDB aging wheel tick =====

// Advances every LSDB's aging wheel by one second, flushing the entries
// that reached MaxAge, refreshing the self-originated entries that reached
// LSRefreshTime, and releasing originations deferred by MinLSInterval.
pub(crate) fn process_age_tick<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Enumerate every LSDB scope.
    let mut lsdb_idxs = vec![LsdbIndex::As];
    for area_idx in arenas.areas.indexes() {
        lsdb_idxs.push(LsdbIndex::Area(area_idx));
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes() {
            lsdb_idxs.push(LsdbIndex::Link(area_idx, iface_idx));
        }
    }

    for lsdb_idx in lsdb_idxs {
        // Advance the wheel.
        let (_, lsdb) = lsdb_index_mut(
            &mut instance.state.lsdb,
            &mut arenas.areas,
            &mut arenas.interfaces,
            lsdb_idx,
        );
        let actions = lsdb.tick(&arenas.lsa_entries);

        // Flush the entries that reached MaxAge.
        for entry_idx in actions.expired {
            lsdb::flush(
                instance,
                arenas,
                lsdb_idx,
                entry_idx,
                LsaFlushReason::Expiry,
            );
        }

        // Refresh the self-originated entries that reached LSRefreshTime.
        for entry_idx in actions.refresh {
            let entry = &arenas.lsa_entries[entry_idx];
            Debug::<V>::LsaRefresh(&entry.data.hdr).log();

            let lsa = Lsa::new(
                0,
                entry.data.hdr.options(),
                entry.data.hdr.lsa_id(),
                entry.data.hdr.adv_rtr(),
                entry.data.hdr.seq_no() + 1,
                entry.data.body.clone(),
            );
            lsdb::originate(instance, arenas, lsdb_idx, lsa);
        }

        // Release deferred originations whose MinLSInterval elapsed.
        for lsa_key in actions.orig_release {
            let (_, lsdb) = lsdb_index_mut(
                &mut instance.state.lsdb,
                &mut arenas.areas,
                &mut arenas.interfaces,
                lsdb_idx,
            );
            if let Some(delayed) = lsdb.delayed_orig.remove(&lsa_key) {
                lsdb::originate(instance, arenas, lsdb_idx, delayed.data);
            }
        }
    }

    // Refill the external origination budget and drain the backlog.
    lsdb::drain_external_backlog(instance, arenas);

    Ok(())
}

// ===== LSDB MaxAge sweep timer =====

pub(crate) fn process_lsdb_maxage_sweep_interval<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    lsdb_key: LsdbKey,
) -> Result<(), Error<V>>
where
    V: Version,
{
    let (lsdb_idx, lsdb) = lsdb_get_mut(
        &mut instance.state.lsdb,
        &mut arenas.areas,
        &mut arenas.interfaces,
        &lsdb_key,
    )?;

    // MaxAge LSAs stay put while any neighbor is mid-exchange.
    if arenas.neighbors.iter().any(|(_, nbr)| {
        matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
    }) {
        return Ok(());
    }

    // Collect the MaxAge LSAs every adjacency has acknowledged.
    for entry_idx in lsdb
        .maxage_lsas
        .extract_if(|entry_idx| {
            let entry = &arenas.lsa_entries[*entry_idx];
            !arenas.neighbors.iter().any(|(_, nbr)| {
                nbr.lsa_lists
                    .ls_rxmt
                    .get(&entry.data.hdr.key())
                    .filter(|rxmt_lsa| Arc::ptr_eq(&entry.data, rxmt_lsa))
                    .is_some()
            })
        })
        .collect::<Vec<_>>()
    {
        let (_, lsdb) = lsdb_index_mut(
            &mut instance.state.lsdb,
            &mut arenas.areas,
            &mut arenas.interfaces,
            lsdb_idx,
        );
        let entry = &arenas.lsa_entries[entry_idx];

        // Delete the entry, or originate the instance that was waiting for
        // the flush to complete (sequence number wrap and deferred
        // reinstallations).
        if let Some(lsa) = lsdb.reissue.remove(&entry.data.hdr.key()) {
            let seq_no = if lsa.hdr.seq_no() == lsdb::LSA_MAX_SEQ_NO + 1 {
                lsdb::LSA_INIT_SEQ_NO
            } else {
                lsa.hdr.seq_no()
            };
            let lsa = Lsa::new(
                0,
                lsa.hdr.options(),
                lsa.hdr.lsa_id(),
                lsa.hdr.adv_rtr(),
                seq_no,
                lsa.body.clone(),
            );
            lsdb.delete(&mut arenas.lsa_entries, entry_idx);
            lsdb::originate(instance, arenas, lsdb_idx, lsa);
        } else {
            lsdb.delete(&mut arenas.lsa_entries, entry_idx);
        }
    }

    Ok(())
}

// ===== SPF run event =====

pub(crate) fn process_spf_delay_event<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    event: spf::fsm::Event,
) -> Result<(), Error<V>>
where
    V: Version,
{
    spf::fsm(event, instance, arenas)
}

// ===== Grace period timeout =====

pub(crate) fn process_grace_period_timeout<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    area_key: AreaKey,
    iface_key: InterfaceKey,
    nbr_key: NeighborKey,
) -> Result<(), Error<V>>
where
    V: Version,
{
    // Resolve the referenced objects.
    let (_, area) = arenas.areas.get_mut_by_key(&area_key)?;
    let (_iface_idx, iface) = area
        .interfaces
        .get_mut_by_key(&mut arenas.interfaces, &iface_key)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_key(&mut arenas.neighbors, &nbr_key)?;

    if nbr.gr.is_some() {
        // Leave helper mode.
        gr::helper_exit(nbr, iface, area, GrExitReason::TimedOut, instance);

        instance.tx.protocol_input.nsm_event(
            area.id,
            iface.id,
            nbr.id,
            nsm::Event::InactivityTimer,
        );
    }

    Ok(())
}
