//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use rospf_utils::task::{IntervalTask, TimeoutTask};
use rospf_utils::{Sender, UnboundedSender};

use crate::area::Area;
use crate::collections::LsdbId;
use crate::instance::InstanceUpView;
use crate::interface::{Interface, ism};
use crate::neighbor::{Neighbor, nsm};
use crate::network::SendDestination;
use crate::spf;
use crate::version::Version;

//
// OSPF tasks diagram:
//                                    +--------------+
//                     net_rx (1x) -> |              | -> (1x) net_tx
//                                    |              |
//             ism_wait_timer (Nx) -> |              | -> (Nx) hello_interval
//                                    |              |
//       nsm_inactivity_timer (Nx) -> |              |
//       packet_rxmt_interval (Nx) -> |              |
//          dbdesc_free_timer (Nx) -> |              |
//            ls_update_timer (Nx) -> |   instance   |
//          delayed_ack_timer (Nx) -> |              |
//                                    |              |
//          age_tick_interval (1x) -> |              |
// lsdb_maxage_sweep_interval (Nx) -> |              |
//        overflow_exit_timer (1x) -> |              |
//                                    |              |
//            spf_delay_timer (Nx) -> |              |
//         grace_period_timer (Nx) -> |              |
//                                    +--------------+
//                             ibus_tx (1x) | ^ (1x) ibus_rx
//                                          | |
//                                          V |
//                                    +--------------+
//                                    |     ibus     |
//                                    +--------------+
//

// OSPF inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    use std::net::Ipv4Addr;

    use crate::collections::{
        AreaKey, InterfaceKey, LsaEntryKey, LsdbKey, NeighborKey,
    };
    use crate::debug::LsaFlushReason;
    use crate::interface::ism;
    use crate::lsdb::LsaOriginateEvent;
    use crate::neighbor::{RxmtPacketType, nsm};
    use crate::network::SendDestination;
    use crate::packet::Packet;
    use crate::packet::error::DecodeError;
    use crate::spf;
    use crate::version::Version;

    // Type aliases.
    pub type ProtocolInputMsg<V> = input::ProtocolMsg<V>;
    pub type ProtocolOutputMsg<V> = output::ProtocolMsg<V>;

    // Input messages (child task -> main task).
    pub mod input {
        use super::*;

        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub enum ProtocolMsg<V: Version> {
            IsmEvent(IsmEventMsg),
            NsmEvent(NsmEventMsg),
            NetRxPacket(NetRxPacketMsg<V>),
            DbDescFree(DbDescFreeMsg),
            SendLsUpdate(SendLsUpdateMsg),
            RxmtInterval(RxmtIntervalMsg),
            DelayedAck(DelayedAckMsg),
            LsaOrigEvent(LsaOrigEventMsg),
            LsaOrigCheck(LsaOrigCheckMsg<V>),
            LsaFlush(LsaFlushMsg<V>),
            AgeTick(AgeTickMsg),
            LsdbMaxAgeSweep(LsdbMaxAgeSweepMsg),
            OverflowExit(OverflowExitMsg),
            SpfDelayEvent(SpfDelayEventMsg),
            GracePeriod(GracePeriodMsg),
            GrRestartExpiry(GrRestartExpiryMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct IsmEventMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub event: ism::Event,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NsmEventMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub event: nsm::Event,
        }

        // Decoded packet handed over by the I/O collaborator. The receiving
        // interface is identified by name.
        #[derive(Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct NetRxPacketMsg<V: Version> {
            pub ifname: String,
            pub src: V::NetIpAddr,
            pub dst: V::NetIpAddr,
            pub packet: Result<Packet<V>, DecodeError>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DbDescFreeMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SendLsUpdateMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: Option<NeighborKey>,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct RxmtIntervalMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
            pub packet_type: RxmtPacketType,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct DelayedAckMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigEventMsg {
            pub event: LsaOriginateEvent,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct LsaOrigCheckMsg<V: Version> {
            pub lsdb_key: LsdbKey,
            pub options: Option<V::PacketOptions>,
            pub lsa_id: Ipv4Addr,
            pub lsa_body: V::LsaBody,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct LsaFlushMsg<V: Version> {
            pub lsdb_key: LsdbKey,
            pub entry_key: LsaEntryKey<V::LsaType>,
            pub reason: LsaFlushReason,
        }

        // One-second cadence driving every LSDB's aging wheel.
        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct AgeTickMsg {}

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct LsdbMaxAgeSweepMsg {
            pub lsdb_key: LsdbKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct OverflowExitMsg {}

        #[derive(Debug, Deserialize, Serialize)]
        pub struct SpfDelayEventMsg {
            pub event: spf::fsm::Event,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct GracePeriodMsg {
            pub area_key: AreaKey,
            pub iface_key: InterfaceKey,
            pub nbr_key: NeighborKey,
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct GrRestartExpiryMsg {}
    }

    // Output messages (main task -> I/O collaborator).
    pub mod output {
        use super::*;

        #[derive(Debug, Serialize)]
        #[serde(bound = "V: Version")]
        pub enum ProtocolMsg<V: Version> {
            NetTxPacket(NetTxPacketMsg<V>),
        }

        #[derive(Clone, Debug, Serialize)]
        #[serde(bound = "V: Version")]
        pub struct NetTxPacketMsg<V: Version> {
            pub packet: Packet<V>,
            pub src: V::NetIpAddr,
            pub dst: SendDestination<V::NetIpAddr>,
        }
    }
}

// ===== OSPF tasks =====

// Periodic Hello transmission for one interface.
pub(crate) fn hello_interval<V>(
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    dst: SendDestination<V::NetIpAddr>,
    interval: u16,
) -> IntervalTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let packet = V::generate_hello(iface, area, instance);
        let src = iface.state.src_addr.unwrap();

        let packet_tx = iface.state.net.as_ref().unwrap().tx.clone();
        IntervalTask::new(
            Duration::from_secs(interval.into()),
            true,
            true,
            move || {
                let packet = packet.clone();
                let dst = dst.clone();
                let packet_tx = packet_tx.clone();

                async move {
                    let msg = messages::output::NetTxPacketMsg {
                        packet,
                        src,
                        dst,
                    };
                    let _ = packet_tx.send(msg);
                }
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// The ISM wait timer that delays DR election on a fresh interface.
pub(crate) fn ism_wait_timer<V>(
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(iface.config.dead_interval.into());
        let area_id = area.id;
        let iface_id = iface.id;
        let ism_event_tx = instance.tx.protocol_input.ism_event.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::IsmEventMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
                event: ism::Event::WaitTimer,
            };
            let _ = ism_event_tx.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Declares the neighbor dead when its Hellos stop arriving.
pub(crate) fn nsm_inactivity_timer<V>(
    nbr: &Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(iface.config.dead_interval.into());
        let nbr_id = nbr.id;
        let area_id = area.id;
        let iface_id = iface.id;
        let nsm_event_tx = instance.tx.protocol_input.nsm_event.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::NsmEventMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
                nbr_key: nbr_id.into(),
                event: nsm::Event::InactivityTimer,
            };
            let _ = nsm_event_tx.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Replays unacknowledged DD, request or update packets.
pub(crate) fn packet_rxmt_interval<V>(
    iface: &Interface<V>,
    msg: messages::input::RxmtIntervalMsg,
    instance: &InstanceUpView<'_, V>,
) -> IntervalTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let rxmt_interval_tx = instance.tx.protocol_input.rxmt_interval.clone();

        IntervalTask::new(
            Duration::from_secs(iface.config.retransmit_interval.into()),
            false,
            true,
            move || {
                let rxmt_interval_tx = rxmt_interval_tx.clone();
                let msg = msg.clone();

                async move {
                    let _ = rxmt_interval_tx.send(msg).await;
                }
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// Releases the cached Database Description packets once duplicate
// detection no longer needs them.
pub(crate) fn dbdesc_free_timer<V>(
    nbr: &Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let area_id = area.id;
        let iface_id = iface.id;
        let nbr_id = nbr.id;
        let dbdesc_free_tx = instance.tx.protocol_input.dbdesc_free.clone();

        TimeoutTask::new(
            Duration::from_secs(iface.config.dead_interval.into()),
            move || async move {
                let _ = dbdesc_free_tx
                    .send(messages::input::DbDescFreeMsg {
                        area_key: area_id.into(),
                        iface_key: iface_id.into(),
                        nbr_key: nbr_id.into(),
                    })
                    .await;
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Short fuse that batches queued LSAs into one LS Update.
pub(crate) fn ls_update_timer<V>(
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) -> TimeoutTask
where
    V: Version,
{
    let area_id = area.id;
    let iface_id = iface.id;
    let send_lsupd_tx = instance.tx.protocol_input.send_lsupd.clone();

    #[cfg(not(feature = "testing"))]
    {
        TimeoutTask::new(Duration::from_millis(100), move || async move {
            let _ = send_lsupd_tx.send(messages::input::SendLsUpdateMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
                nbr_key: None,
            });
        })
    }
    #[cfg(feature = "testing")]
    {
        // No pacing in testing mode.
        let _ = send_lsupd_tx.send(messages::input::SendLsUpdateMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
            nbr_key: None,
        });

        TimeoutTask {}
    }
}

// Short fuse that batches pending delayed acknowledgments.
pub(crate) fn delayed_ack_timer<V>(
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
) -> TimeoutTask
where
    V: Version,
{
    let area_id = area.id;
    let iface_id = iface.id;
    let delayed_ack_timeout_tx =
        instance.tx.protocol_input.delayed_ack_timeout.clone();

    #[cfg(not(feature = "testing"))]
    {
        // Must stay well under RxmtInterval or the senders will
        // retransmit needlessly (RFC 2328, section 13.5).
        let timeout = Duration::from_secs(1);
        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::DelayedAckMsg {
                area_key: area_id.into(),
                iface_key: iface_id.into(),
            };
            let _ = delayed_ack_timeout_tx.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        // No pacing in testing mode.
        let msg = messages::input::DelayedAckMsg {
            area_key: area_id.into(),
            iface_key: iface_id.into(),
        };
        let _ = delayed_ack_timeout_tx.send(msg);

        TimeoutTask {}
    }
}

// One-second interval task driving the LSDB aging wheels. A single task
// per instance covers every LSDB scope.
pub(crate) fn age_tick_interval<V>(
    age_tick_tx: &UnboundedSender<messages::input::AgeTickMsg>,
) -> IntervalTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let age_tick_tx = age_tick_tx.clone();

        IntervalTask::new(Duration::from_secs(1), false, false, move || {
            let age_tick_tx = age_tick_tx.clone();
            async move {
                let _ = age_tick_tx.send(messages::input::AgeTickMsg {});
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// Periodically tries to discard fully acknowledged MaxAge LSAs.
pub(crate) fn lsdb_maxage_sweep_interval(
    lsdb_id: LsdbId,
    lsdb_maxage_sweep_interval_tx: &Sender<messages::input::LsdbMaxAgeSweepMsg>,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        let lsdb_maxage_sweep_interval_tx = lsdb_maxage_sweep_interval_tx.clone();

        let timeout = Duration::from_secs(5);
        IntervalTask::new(timeout, false, true, move || {
            let lsdb_maxage_sweep_interval_tx =
                lsdb_maxage_sweep_interval_tx.clone();
            async move {
                let msg = messages::input::LsdbMaxAgeSweepMsg {
                    lsdb_key: lsdb_id.into(),
                };
                let _ = lsdb_maxage_sweep_interval_tx.send(msg).await;
            }
        })
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}

// Schedules the attempt to leave the overflow state.
pub(crate) fn overflow_exit_timer<V>(
    instance: &InstanceUpView<'_, V>,
    timeout: u32,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_secs(timeout.into());
        let overflow_exit_tx = instance.tx.protocol_input.overflow_exit.clone();

        TimeoutTask::new(timeout, move || async move {
            let _ = overflow_exit_tx.send(messages::input::OverflowExitMsg {});
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// One-shot timer feeding the SPF scheduling state machine.
pub(crate) fn spf_delay_timer<V>(
    instance: &InstanceUpView<'_, V>,
    event: spf::fsm::Event,
    timeout: u32,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let timeout = Duration::from_millis(timeout.into());
        let spf_delay_event_tx =
            instance.tx.protocol_input.spf_delay_event.clone();

        TimeoutTask::new(timeout, move || async move {
            let msg = messages::input::SpfDelayEventMsg { event };
            let _ = spf_delay_event_tx.send(msg);
        })
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Bounds how long we stay helper for a restarting neighbor.
pub(crate) fn grace_period_timer<V>(
    nbr: &Neighbor<V>,
    iface: &Interface<V>,
    area: &Area<V>,
    instance: &InstanceUpView<'_, V>,
    grace_period: u32,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let area_id = area.id;
        let iface_id = iface.id;
        let nbr_id = nbr.id;
        let grace_period_tx = instance.tx.protocol_input.grace_period.clone();

        TimeoutTask::new(
            Duration::from_secs(grace_period.into()),
            move || async move {
                let _ = grace_period_tx
                    .send(messages::input::GracePeriodMsg {
                        area_key: area_id.into(),
                        iface_key: iface_id.into(),
                        nbr_key: nbr_id.into(),
                    })
                    .await;
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}

// Bounds our own restart when acting as the restarting router.
pub(crate) fn gr_restart_timer<V>(
    instance: &InstanceUpView<'_, V>,
    grace_period: u32,
) -> TimeoutTask
where
    V: Version,
{
    #[cfg(not(feature = "testing"))]
    {
        let gr_restart_expiry_tx =
            instance.tx.protocol_input.gr_restart_expiry.clone();

        TimeoutTask::new(
            Duration::from_secs(grace_period.into()),
            move || async move {
                let _ = gr_restart_expiry_tx
                    .send(messages::input::GrRestartExpiryMsg {});
            },
        )
    }
    #[cfg(feature = "testing")]
    {
        TimeoutTask {}
    }
}
