//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use rospf_utils::crypto::CryptoAlgo;
use rospf_utils::protocol::Protocol;
use rospf_utils::southbound::RedistMetricType;
use serde::{Deserialize, Serialize};

use crate::area::AreaType;
use crate::debug::InterfaceInactiveReason;
use crate::error::ConfigError;
use crate::gr;
use crate::instance::Instance;
use crate::interface::{InterfaceType, ism};
use crate::spf;
use crate::version::Version;

// Default route preferences (administrative distances).
const DFLT_PREFERENCE: u8 = 110;
// Default SPF delay FSM timers, in milliseconds.
const DFLT_SPF_INITIAL_DELAY: u32 = 50;
const DFLT_SPF_SHORT_DELAY: u32 = 200;
const DFLT_SPF_LONG_DELAY: u32 = 5000;
const DFLT_SPF_HOLD_DOWN: u32 = 10000;
const DFLT_SPF_TIME_TO_LEARN: u32 = 500;
// Default ExitOverflowInterval, in seconds.
const DFLT_EXIT_OVERFLOW_INTERVAL: u32 = 300;
// Default number of retransmission rounds without progress before the
// neighbor is torn down.
const DFLT_MAX_RXMT_WINDOW: u16 = 8;
// Default grace period requested when restarting, in seconds.
const DFLT_RESTART_GRACE_PERIOD: u32 = 120;

// Instance configuration.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct InstanceCfg {
    pub enabled: bool,
    pub router_id: Option<Ipv4Addr>,
    pub preference: Preference,
    pub max_paths: u16,
    pub spf_initial_delay: u32,
    pub spf_short_delay: u32,
    pub spf_long_delay: u32,
    pub spf_hold_down: u32,
    pub spf_time_to_learn: u32,
    pub stub_router: bool,
    // Limit of non-default AS-external LSAs before entering the overflow
    // state (RFC 1765).
    pub ext_lsdb_limit: Option<u32>,
    pub exit_overflow_interval: u32,
    // Maximum number of new AS-external originations per second.
    pub new_flood_rate: Option<u32>,
    pub max_rxmt_window: u16,
    pub gr: GrCfg,
    pub redistribute: BTreeMap<Protocol, RedistributeCfg>,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Preference {
    pub intra_area: u8,
    pub inter_area: u8,
    pub external: u8,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct GrCfg {
    pub helper_enabled: bool,
    pub helper_strict_lsa_checking: bool,
    pub restart_enabled: bool,
    pub restart_grace_period: u32,
}

// Redistribution policy for one source protocol.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RedistributeCfg {
    pub metric: Option<u32>,
    pub metric_type: RedistMetricType,
    pub tag: Option<u32>,
}

// Area configuration.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AreaCfg {
    pub area_type: AreaType,
    // Whether to import summaries into this (stub/NSSA) area.
    pub summary: bool,
    pub default_cost: u32,
}

// Area range configuration.
#[derive(Clone, Debug, Default, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RangeCfg {
    pub advertise: bool,
    pub cost: Option<u32>,
}

// Interface configuration.
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(bound = "V: Version")]
pub struct InterfaceCfg<V: Version> {
    pub enabled: bool,
    pub if_type: InterfaceType,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub retransmit_interval: u16,
    pub transmit_delay: u16,
    pub priority: u8,
    pub cost: u16,
    pub mtu_ignore: bool,
    pub passive: bool,
    pub demand_circuit: bool,
    // OSPFv3 instance ID.
    pub instance_id: u8,
    // Authentication.
    pub auth_key: Option<String>,
    pub auth_keyid: Option<u32>,
    pub auth_algo: Option<CryptoAlgo>,
    pub auth_keychain: Option<String>,
    // Static neighbors (NBMA and Point-to-MultiPoint).
    pub static_nbrs: BTreeMap<V::NetIpAddr, StaticNbr>,
    // Virtual link endpoint identification.
    pub vlink_transit_area: Option<Ipv4Addr>,
    pub vlink_nbr_id: Option<Ipv4Addr>,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct StaticNbr {
    pub priority: u8,
    pub poll_interval: u16,
}

// Configuration operations. A configuration round starts with `Begin`,
// marking every existing item as unseen; items that weren't touched when
// `Commit` arrives are removed.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
#[serde(bound = "V: Version")]
pub enum ConfigMsg<V: Version> {
    Begin,
    Instance(InstanceCfg),
    Area {
        area_id: Ipv4Addr,
        cfg: AreaCfg,
    },
    Range {
        area_id: Ipv4Addr,
        prefix: V::IpNetwork,
        cfg: RangeCfg,
    },
    Interface {
        area_id: Ipv4Addr,
        ifname: String,
        cfg: Box<InterfaceCfg<V>>,
    },
    VirtualLink {
        transit_area: Ipv4Addr,
        nbr_router_id: Ipv4Addr,
    },
    Commit,
    GracefulRestart,
}

// Items touched during the current configuration round.
#[derive(Debug)]
pub struct ConfigRound<V: Version> {
    pub areas: BTreeSet<Ipv4Addr>,
    pub ranges: BTreeSet<(Ipv4Addr, V::IpNetwork)>,
    pub interfaces: BTreeSet<String>,
}

impl<V: Version> Default for ConfigRound<V> {
    fn default() -> Self {
        ConfigRound {
            areas: BTreeSet::default(),
            ranges: BTreeSet::default(),
            interfaces: BTreeSet::default(),
        }
    }
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            enabled: true,
            router_id: None,
            preference: Preference {
                intra_area: DFLT_PREFERENCE,
                inter_area: DFLT_PREFERENCE,
                external: DFLT_PREFERENCE,
            },
            max_paths: 16,
            spf_initial_delay: DFLT_SPF_INITIAL_DELAY,
            spf_short_delay: DFLT_SPF_SHORT_DELAY,
            spf_long_delay: DFLT_SPF_LONG_DELAY,
            spf_hold_down: DFLT_SPF_HOLD_DOWN,
            spf_time_to_learn: DFLT_SPF_TIME_TO_LEARN,
            stub_router: false,
            ext_lsdb_limit: None,
            exit_overflow_interval: DFLT_EXIT_OVERFLOW_INTERVAL,
            new_flood_rate: None,
            max_rxmt_window: DFLT_MAX_RXMT_WINDOW,
            gr: GrCfg {
                helper_enabled: true,
                helper_strict_lsa_checking: true,
                restart_enabled: false,
                restart_grace_period: DFLT_RESTART_GRACE_PERIOD,
            },
            redistribute: Default::default(),
        }
    }
}

// ===== impl AreaCfg =====

impl Default for AreaCfg {
    fn default() -> AreaCfg {
        AreaCfg {
            area_type: AreaType::Normal,
            summary: true,
            default_cost: 1,
        }
    }
}

// ===== impl InterfaceCfg =====

impl<V> Default for InterfaceCfg<V>
where
    V: Version,
{
    fn default() -> InterfaceCfg<V> {
        InterfaceCfg {
            enabled: true,
            if_type: InterfaceType::Broadcast,
            hello_interval: 10,
            dead_interval: 40,
            retransmit_interval: 5,
            transmit_delay: 1,
            priority: 1,
            cost: 10,
            mtu_ignore: false,
            passive: false,
            demand_circuit: false,
            instance_id: 0,
            auth_key: None,
            auth_keyid: None,
            auth_algo: None,
            auth_keychain: None,
            static_nbrs: Default::default(),
            vlink_transit_area: None,
            vlink_nbr_id: None,
        }
    }
}

// ===== global functions =====

// Applies a single configuration operation. Rejected operations leave the
// previous value in place.
pub(crate) fn process_config_msg<V>(
    instance: &mut Instance<V>,
    msg: ConfigMsg<V>,
) -> Result<(), ConfigError>
where
    V: Version,
{
    match msg {
        ConfigMsg::Begin => {
            instance.config_round = Some(ConfigRound::default());
            Ok(())
        }
        ConfigMsg::Instance(cfg) => process_instance_cfg(instance, cfg),
        ConfigMsg::Area { area_id, cfg } => {
            process_area_cfg(instance, area_id, cfg)
        }
        ConfigMsg::Range {
            area_id,
            prefix,
            cfg,
        } => process_range_cfg(instance, area_id, prefix, cfg),
        ConfigMsg::Interface {
            area_id,
            ifname,
            cfg,
        } => process_interface_cfg(instance, area_id, &ifname, *cfg),
        ConfigMsg::VirtualLink {
            transit_area,
            nbr_router_id,
        } => process_vlink_cfg(instance, transit_area, nbr_router_id),
        ConfigMsg::Commit => {
            process_commit(instance);
            Ok(())
        }
        ConfigMsg::GracefulRestart => {
            if let Some((mut instance, arenas)) = instance.as_up() {
                gr::restart_initiate(&mut instance, arenas);
            }
            Ok(())
        }
    }
}

fn process_instance_cfg<V>(
    instance: &mut Instance<V>,
    cfg: InstanceCfg,
) -> Result<(), ConfigError>
where
    V: Version,
{
    let router_id_change = instance.config.router_id != cfg.router_id;
    let redistribute_change = instance.config.redistribute != cfg.redistribute;
    instance.config = cfg;

    // A Router-ID change requires a full restart of the instance.
    if router_id_change && instance.is_active() {
        instance.reset();
    } else {
        instance.update();
    }

    // Re-evaluate redistributed routes under the new policy.
    if redistribute_change {
        crate::ibus::resync_redistributed_routes(instance);
    }

    // Recompute routes under the new preferences.
    if let Some((instance, _)) = instance.as_up() {
        instance
            .tx
            .protocol_input
            .spf_delay_event(spf::fsm::Event::ConfigChange);
    }

    Ok(())
}

fn process_area_cfg<V>(
    instance: &mut Instance<V>,
    area_id: Ipv4Addr,
    cfg: AreaCfg,
) -> Result<(), ConfigError>
where
    V: Version,
{
    // The backbone can't be a stub or NSSA area.
    if area_id == Ipv4Addr::UNSPECIFIED && cfg.area_type != AreaType::Normal {
        return Err(ConfigError::NssaBackbone);
    }

    // Find or create the area.
    if instance.arenas.areas.get_by_area_id(area_id).is_none() {
        instance.arenas.areas.insert(area_id);
    }
    let (_, area) =
        instance.arenas.areas.get_mut_by_area_id(area_id).unwrap();

    let type_change = area.config.area_type != cfg.area_type;
    area.config = cfg;

    if let Some(round) = &mut instance.config_round {
        round.areas.insert(area_id);
    }

    // An area type change invalidates all adjacencies in the area (the
    // options advertised in Hello packets change).
    if type_change
        && let Some((instance, arenas)) = instance.as_up()
        && let Some((_, area)) = arenas.areas.get_mut_by_area_id(area_id)
    {
        for iface_idx in area.interfaces.indexes().collect::<Vec<_>>() {
            let iface = &mut arenas.interfaces[iface_idx];
            iface.reset(
                area,
                &instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
            );
        }
    }

    Ok(())
}

fn process_range_cfg<V>(
    instance: &mut Instance<V>,
    area_id: Ipv4Addr,
    prefix: V::IpNetwork,
    cfg: RangeCfg,
) -> Result<(), ConfigError>
where
    V: Version,
{
    let Some((_, area)) = instance.arenas.areas.get_mut_by_area_id(area_id)
    else {
        return Err(ConfigError::AreaNotFound(area_id));
    };

    let range = area.ranges.entry(prefix).or_default();
    range.config = cfg;

    if let Some(round) = &mut instance.config_round {
        round.ranges.insert((area_id, prefix));
    }

    // Aggregation is re-evaluated on the next routing table update.
    if let Some((instance, _)) = instance.as_up() {
        instance
            .tx
            .protocol_input
            .spf_delay_event(spf::fsm::Event::ConfigChange);
    }

    Ok(())
}

fn process_interface_cfg<V>(
    instance: &mut Instance<V>,
    area_id: Ipv4Addr,
    ifname: &str,
    cfg: InterfaceCfg<V>,
) -> Result<(), ConfigError>
where
    V: Version,
{
    if cfg.if_type == InterfaceType::VirtualLink {
        return Err(ConfigError::InvalidValue("if-type"));
    }

    // Find or create the area.
    if instance.arenas.areas.get_by_area_id(area_id).is_none() {
        instance.arenas.areas.insert(area_id);
    }
    let (_, area) =
        instance.arenas.areas.get_mut_by_area_id(area_id).unwrap();

    // Find or create the interface.
    if area
        .interfaces
        .get_by_name(&instance.arenas.interfaces, ifname)
        .is_none()
    {
        area.interfaces
            .insert(&mut instance.arenas.interfaces, ifname);
    }
    let (_, iface) = area
        .interfaces
        .get_mut_by_name(&mut instance.arenas.interfaces, ifname)
        .unwrap();

    let changed = iface.config != cfg;
    iface.config = cfg;

    if let Some(round) = &mut instance.config_round {
        round.interfaces.insert(ifname.to_owned());
    }

    // Apply the change: restart the interface if it was active, otherwise
    // just re-evaluate whether it can start.
    if let Some((instance, arenas)) = instance.as_up()
        && let Some((_, area)) = arenas.areas.get_mut_by_area_id(area_id)
        && let Some((_, iface)) = area
            .interfaces
            .get_mut_by_name(&mut arenas.interfaces, ifname)
    {
        if changed && !iface.is_down() {
            iface.reset(
                area,
                &instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
            );
        } else {
            iface.update(
                area,
                &instance,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
            );
        }
    }

    Ok(())
}

fn process_vlink_cfg<V>(
    instance: &mut Instance<V>,
    transit_area: Ipv4Addr,
    nbr_router_id: Ipv4Addr,
) -> Result<(), ConfigError>
where
    V: Version,
{
    // Virtual links are always bound to the backbone area.
    if transit_area == Ipv4Addr::UNSPECIFIED {
        return Err(ConfigError::VirtualLinkNotBackbone(transit_area));
    }
    if instance
        .arenas
        .areas
        .get_by_area_id(transit_area)
        .is_none()
    {
        return Err(ConfigError::AreaNotFound(transit_area));
    }

    // Find or create the backbone area.
    if instance
        .arenas
        .areas
        .get_by_area_id(Ipv4Addr::UNSPECIFIED)
        .is_none()
    {
        instance.arenas.areas.insert(Ipv4Addr::UNSPECIFIED);
    }
    let (_, backbone) = instance
        .arenas
        .areas
        .get_mut_by_area_id(Ipv4Addr::UNSPECIFIED)
        .unwrap();

    // Virtual interfaces are named after their endpoints.
    let ifname = format!("vl-{}-{}", transit_area, nbr_router_id);
    if backbone
        .interfaces
        .get_by_name(&instance.arenas.interfaces, &ifname)
        .is_none()
    {
        backbone
            .interfaces
            .insert(&mut instance.arenas.interfaces, &ifname);
    }
    let (_, iface) = backbone
        .interfaces
        .get_mut_by_name(&mut instance.arenas.interfaces, &ifname)
        .unwrap();

    iface.config.if_type = InterfaceType::VirtualLink;
    iface.config.vlink_transit_area = Some(transit_area);
    iface.config.vlink_nbr_id = Some(nbr_router_id);

    if let Some(round) = &mut instance.config_round {
        round.interfaces.insert(ifname);
    }

    // The endpoint is resolved after the next SPF run in the transit area.
    if let Some((instance, _)) = instance.as_up() {
        instance
            .tx
            .protocol_input
            .spf_delay_event(spf::fsm::Event::ConfigChange);
    }

    Ok(())
}

// Ends a configuration round: every item that wasn't touched since `Begin`
// is removed.
fn process_commit<V>(instance: &mut Instance<V>)
where
    V: Version,
{
    let Some(round) = instance.config_round.take() else {
        return;
    };

    // Collect unseen items.
    let mut del_areas = vec![];
    let mut del_ranges = vec![];
    let mut del_ifaces = vec![];
    for area_idx in instance.arenas.areas.indexes() {
        let area = &instance.arenas.areas[area_idx];
        if !round.areas.contains(&area.area_id) {
            del_areas.push(area.area_id);
        }
        for prefix in area.ranges.keys() {
            if !round.ranges.contains(&(area.area_id, *prefix)) {
                del_ranges.push((area.area_id, *prefix));
            }
        }
        for iface_idx in area.interfaces.indexes() {
            let iface = &instance.arenas.interfaces[iface_idx];
            if !round.interfaces.contains(&iface.name) {
                del_ifaces.push((area.area_id, iface.name.clone()));
            }
        }
    }

    // Stop and remove unseen interfaces.
    for (area_id, ifname) in del_ifaces {
        if let Some((instance_up, arenas)) = instance.as_up()
            && let Some((_, area)) = arenas.areas.get_mut_by_area_id(area_id)
            && let Some((_, iface)) = area
                .interfaces
                .get_mut_by_name(&mut arenas.interfaces, &ifname)
        {
            iface.fsm(
                area,
                &instance_up,
                &mut arenas.neighbors,
                &arenas.lsa_entries,
                ism::Event::InterfaceDown(InterfaceInactiveReason::AdminDown),
            );
        }
        if let Some((_, area)) =
            instance.arenas.areas.get_mut_by_area_id(area_id)
        {
            let iface_idx = area
                .interfaces
                .get_by_name(&instance.arenas.interfaces, &ifname)
                .map(|(iface_idx, _)| iface_idx);
            if let Some(iface_idx) = iface_idx {
                area.interfaces
                    .delete(&mut instance.arenas.interfaces, iface_idx);
            }
        }
    }

    // Remove unseen ranges.
    for (area_id, prefix) in del_ranges {
        if let Some((_, area)) =
            instance.arenas.areas.get_mut_by_area_id(area_id)
        {
            area.ranges.remove(&prefix);
        }
    }

    // Remove unseen (and now empty) areas.
    for area_id in del_areas {
        if let Some((area_idx, area)) =
            instance.arenas.areas.get_by_area_id(area_id)
            && area.interfaces.indexes().next().is_none()
        {
            instance.arenas.areas.delete(area_idx);
        }
    }

    // Re-evaluate the instance as a whole.
    instance.update();
    if let Some((instance, _)) = instance.as_up() {
        instance
            .tx
            .protocol_input
            .spf_delay_event(spf::fsm::Event::ConfigChange);
    }
}
