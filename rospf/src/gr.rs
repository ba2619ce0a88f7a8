//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use crate::area::Area;
use crate::collections::LsdbId;
use crate::debug::{Debug, GrRejectReason, LsaFlushReason};
use crate::instance::{GrRestartState, InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::lsdb::{LsaEntryFlags, LsaOriginateEvent};
use crate::neighbor::{Neighbor, NeighborGrHelper, nsm};
use crate::packet::lsa::{GrReason, LsaHdrVersion, LsaTypeVersion};
use crate::tasks;
use crate::version::Version;

// OSPF Graceful Restart exit reason.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GrExitReason {
    Completed,
    TimedOut,
    TopologyChanged,
}

// ===== impl GrExitReason =====

impl std::fmt::Display for GrExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GrExitReason::Completed => {
                write!(f, "completed")
            }
            GrExitReason::TimedOut => {
                write!(f, "timed out")
            }
            GrExitReason::TopologyChanged => {
                write!(f, "topology changed")
            }
        }
    }
}

// ===== global functions =====

pub(crate) fn helper_process_grace_lsa<V>(
    nbr: &mut Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    lsa_hdr: &V::LsaHdr,
    grace_period: u32,
    reason: GrReason,
    instance: &mut InstanceUpView<'_, V>,
) where
    V: Version,
{
    if lsa_hdr.is_maxage() {
        // A cleared grace LSA ends the help early.
        if nbr.gr.is_some() {
            helper_exit(nbr, iface, area, GrExitReason::Completed, instance);
        }
    } else {
        let remn_grace_period =
            grace_period.saturating_sub(lsa_hdr.age() as u32);

        // A refreshed grace LSA extends an ongoing help.
        if let Some(gr) = &mut nbr.gr {
            gr.grace_period
                .reset(Some(Duration::from_secs(remn_grace_period.into())));
            return;
        }

        // Only fully adjacent neighbors can be helped.
        if nbr.state != nsm::State::Full {
            let reason = GrRejectReason::NeighborNotFull;
            Debug::<V>::GrHelperReject(nbr.router_id, reason).log();
            return;
        }

        // The database must not have changed since the restart began.
        if instance.config.gr.helper_strict_lsa_checking
            && nbr
                .lsa_lists
                .ls_rxmt
                .values()
                .any(|lsa| lsa.hdr.lsa_type().is_gr_topology_info())
        {
            let reason = GrRejectReason::TopologyChange;
            Debug::<V>::GrHelperReject(nbr.router_id, reason).log();
            return;
        }

        // A grace period already over is not worth entering.
        if lsa_hdr.age() as u32 >= grace_period {
            let reason = GrRejectReason::GracePeriodExpired;
            Debug::<V>::GrHelperReject(nbr.router_id, reason).log();
            return;
        }

        // Helper mode can be disabled outright.
        if !instance.config.gr.helper_enabled {
            let reason = GrRejectReason::HelperDisabled;
            Debug::<V>::GrHelperReject(nbr.router_id, reason).log();
            return;
        }

        // Eligible; start helping.
        helper_enter(nbr, iface, area, remn_grace_period, reason, instance);
    }
}

pub(crate) fn helper_process_topology_change<V>(
    lsa_type: Option<V::LsaType>,
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    for area in arenas.areas.iter() {
        let area_type = area.config.area_type;
        for iface in area.interfaces.iter(&arenas.interfaces) {
            for nbr_idx in iface.state.neighbors.indexes() {
                let nbr = &mut arenas.neighbors[nbr_idx];
                if nbr.gr.is_none() {
                    continue;
                }

                // Was this change flooded towards the restarter?
                if let Some(lsa_type) = lsa_type
                    && !V::lsa_type_is_valid(Some(area_type), None, lsa_type)
                {
                    continue;
                }

                helper_exit(
                    nbr,
                    iface,
                    area,
                    GrExitReason::TopologyChanged,
                    instance,
                );
            }
        }
    }
}

pub(crate) fn helper_exit<V>(
    nbr: &mut Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    reason: GrExitReason,
    instance: &mut InstanceUpView<'_, V>,
) where
    V: Version,
{
    Debug::<V>::GrHelperExit(nbr.router_id, reason).log();

    nbr.gr = None;

    // The restarter may have been DR; rerun the election.
    if iface.is_broadcast_or_nbma() {
        instance.tx.protocol_input.ism_event(
            area.id,
            iface.id,
            ism::Event::NbrChange,
        );
    }

    // Our own LSAs for the segment may describe the restarter;
    // refresh them.
    instance.tx.protocol_input.lsa_orig_event(
        LsaOriginateEvent::GrHelperExit {
            area_id: area.id,
            iface_id: iface.id,
        },
    );

    instance.state.gr_helper_count -= 1;
}

// ===== restarting side =====

// Initiates a graceful restart: Grace-LSAs are flooded on every active
// interface, announcing the requested grace period, and the instance enters
// the hitless restart state. The forwarding entries are kept by the RIB
// collaborator while the control plane reconverges.
pub(crate) fn restart_initiate<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    let grace_period = instance.config.gr.restart_grace_period;

    Debug::<V>::GrRestartEnter(grace_period).log();

    // Flood a Grace-LSA out of each operational interface. Reliable
    // delivery is provided by the regular retransmission machinery.
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &arenas.interfaces[iface_idx];
            if iface.is_down() || iface.is_passive() {
                continue;
            }

            let (lsa_id, options, lsa_body) = V::grace_lsa_body(
                iface,
                grace_period,
                GrReason::SoftwareRestart,
            );
            instance.tx.protocol_input.lsa_orig_check(
                LsdbId::Link(area.id, iface.id),
                options,
                lsa_id,
                lsa_body,
            );
        }
    }

    // Arm the grace period expiry and enter the restart state.
    let timer = tasks::gr_restart_timer(instance, grace_period);
    instance.state.gr_restart = Some(GrRestartState {
        grace_period,
        timer,
    });
}

// Terminates an ongoing graceful restart: the Grace-LSAs are flushed and
// normal operation resumes.
pub(crate) fn restart_exit<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
    reason: GrExitReason,
) where
    V: Version,
{
    if instance.state.gr_restart.take().is_none() {
        return;
    }

    Debug::<V>::GrRestartExit(reason).log();

    // Flush the self-originated Grace-LSAs.
    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &arenas.areas[area_idx];
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &arenas.interfaces[iface_idx];

            let grace_lses = iface
                .state
                .lsdb
                .iter(&arenas.lsa_entries)
                .filter(|(_, entry)| {
                    entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                })
                .filter(|(_, entry)| {
                    use crate::packet::lsa::LsaBodyVersion;
                    entry.data.body.as_grace().is_some()
                })
                .map(|(_, entry)| entry.id)
                .collect::<Vec<_>>();

            for entry_id in grace_lses {
                instance.tx.protocol_input.lsa_flush(
                    LsdbId::Link(area.id, iface.id),
                    entry_id,
                    LsaFlushReason::PrematureAging,
                );
            }
        }
    }

    // Reoriginate the LSAs that describe this router.
    for area in arenas.areas.iter() {
        instance
            .tx
            .protocol_input
            .lsa_orig_event(LsaOriginateEvent::AreaStart { area_id: area.id });
    }
}

// Checks whether the adjacency reformation has completed, ending the
// restart without a topology disruption.
pub(crate) fn restart_convergence_check<V>(
    instance: &mut InstanceUpView<'_, V>,
    arenas: &mut InstanceArenas<V>,
) where
    V: Version,
{
    if instance.state.gr_restart.is_none() {
        return;
    }

    // All adjacencies must have settled (no database exchange in progress)
    // and every active interface must have formed at least one full
    // adjacency.
    let exchanging = arenas.neighbors.iter().any(|(_, nbr)| {
        matches!(
            nbr.state,
            nsm::State::ExStart | nsm::State::Exchange | nsm::State::Loading
        )
    });
    if exchanging {
        return;
    }

    let pending_iface = arenas.areas.iter().any(|area| {
        area.interfaces
            .iter(&arenas.interfaces)
            .filter(|iface| !iface.is_down() && !iface.is_passive())
            .any(|iface| {
                iface.state.neighbors.count() > 0
                    && !iface
                        .state
                        .neighbors
                        .iter(&arenas.neighbors)
                        .any(|nbr| nbr.state == nsm::State::Full)
            })
    });
    if pending_iface {
        return;
    }

    restart_exit(instance, arenas, GrExitReason::Completed);
}

// ===== helper functions =====

fn helper_enter<V>(
    nbr: &mut Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    grace_period: u32,
    restart_reason: GrReason,
    instance: &mut InstanceUpView<'_, V>,
) where
    V: Version,
{
    Debug::<V>::GrHelperEnter(nbr.router_id, restart_reason, grace_period)
        .log();

    // Start the grace period timeout.
    let grace_period =
        tasks::grace_period_timer(nbr, iface, area, instance, grace_period);

    // Store information that this neighbor is undergoing a graceful restart.
    nbr.gr = Some(NeighborGrHelper {
        restart_reason,
        grace_period,
    });

    // Increment the count of neighbors performing a graceful restart.
    instance.state.gr_helper_count += 1;
}
