//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use enum_as_inner::EnumAsInner;
use generational_arena::Index;
use rospf_utils::task::IntervalTask;
use serde::{Deserialize, Serialize};

use crate::area::Area;
use crate::error::{Error, fatal, fatal_code};
use crate::instance::ProtocolInputChannelsTx;
use crate::interface::Interface;
use crate::lsdb::{
    LSA_MAX_AGE, LSA_MIN_INTERVAL, LSA_REFRESH_TIME, LsaDelayedOrig, LsaEntry,
    LsaEntryFlags,
};
use crate::neighbor::{Neighbor, NeighborNetId};
use crate::packet::lsa::{Lsa, LsaHdrVersion, LsaKey};
use crate::tasks;
use crate::version::Version;

pub type ObjectId = u32;

#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum ObjectKey<T> {
    Id(ObjectId),
    Value(T),
}

pub type AreaId = ObjectId;
pub type AreaIndex = Index;
pub type AreaKey = ObjectKey<Ipv4Addr>;
pub type InterfaceId = ObjectId;
pub type InterfaceIndex = Index;
pub type InterfaceKey = ObjectKey<String>;
pub type NeighborId = ObjectId;
pub type NeighborIndex = Index;
pub type NeighborKey = ObjectKey<Ipv4Addr>;
pub type LsaEntryId = ObjectId;
pub type LsaEntryIndex = Index;
pub type LsaEntryKey<T> = ObjectKey<LsaKey<T>>;

// Number of aging bins: one per possible LSA age, [0..MaxAge].
pub(crate) const AGE_BINS: usize = LSA_MAX_AGE as usize + 1;

#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

#[derive(Debug, Default)]
pub struct Areas<V: Version> {
    arena: Arena<Area<V>>,
    by_id: HashMap<AreaId, AreaIndex>,
    by_area_id: BTreeMap<Ipv4Addr, AreaIndex>,
    next_id: AreaId,
}

#[derive(Debug, Default)]
pub struct Interfaces<V: Version> {
    by_id: HashMap<InterfaceId, InterfaceIndex>,
    by_name: BTreeMap<String, InterfaceIndex>,
    by_ifindex: HashMap<u32, InterfaceIndex>,
    next_id: InterfaceId,
    _marker: std::marker::PhantomData<V>,
}

#[derive(Debug, Default)]
pub struct Neighbors<V: Version> {
    by_id: HashMap<NeighborId, NeighborIndex>,
    by_router_id: BTreeMap<Ipv4Addr, NeighborIndex>,
    by_net_id: BTreeMap<NeighborNetId, NeighborIndex>,
    next_id: NeighborId,
    _marker: std::marker::PhantomData<V>,
}

#[derive(Debug)]
pub struct Lsdb<V: Version> {
    by_id: HashMap<LsaEntryId, LsaEntryIndex>,
    types: BTreeMap<V::LsaType, LsdbSingleType<V>>,
    // Aging wheel: the cursor points at the virtual "age zero" bin and
    // advances once per second. An entry stored in bin `b` has age
    // `(cursor - b) mod AGE_BINS`. DoNotAge LSAs are kept out of the wheel.
    bins: Vec<BTreeSet<LsaEntryIndex>>,
    cursor: usize,
    dna_lsas: BTreeSet<LsaEntryIndex>,
    // List of MaxAge LSAs awaiting acknowledgment from all adjacencies.
    pub maxage_lsas: HashSet<LsaEntryIndex>,
    maxage_sweeper: Option<IntervalTask>,
    // List of LSAs whose origination was delayed due to the MinLSInterval
    // check. Released by the aging wheel.
    pub delayed_orig: HashMap<LsaKey<V::LsaType>, LsaDelayedOrig<V>>,
    // List of LSAs waiting for a MaxAge flush to be acknowledged before
    // they can be reissued (sequence number wrap and reinstallation of an
    // identity that is still on the MaxAge list).
    pub reissue: HashMap<LsaKey<V::LsaType>, Lsa<V>>,
    next_id: LsaEntryId,
    lsa_count: u32,
    cksum_sum: u32,
}

#[derive(Debug)]
pub struct LsdbSingleType<V: Version> {
    lsa_type: V::LsaType,
    entries: BTreeMap<LsaKey<V::LsaType>, LsaEntryIndex>,
    lsa_count: u32,
    cksum_sum: u32,
}

// Per-tick actions collected while advancing an LSDB's aging wheel.
#[derive(Debug)]
pub struct AgeTickActions<V: Version> {
    // Entries that reached MaxAge.
    pub expired: Vec<LsaEntryIndex>,
    // Self-originated entries due for refresh.
    pub refresh: Vec<LsaEntryIndex>,
    // Deferred originations whose MinLSInterval has elapsed.
    pub orig_release: Vec<LsaKey<V::LsaType>>,
}

// LSDB ID.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsdbId {
    Link(AreaId, InterfaceId),
    Area(AreaId),
    As,
}

// LSDB Index.
#[derive(Clone, Copy, Debug, EnumAsInner, Eq, PartialEq)]
pub enum LsdbIndex {
    Link(AreaIndex, InterfaceIndex),
    Area(AreaIndex),
    As,
}

// LSDB key.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum LsdbKey {
    Link(AreaKey, InterfaceKey),
    Area(AreaKey),
    As,
}

// ===== impl ObjectKey =====

impl<T> From<ObjectId> for ObjectKey<T> {
    fn from(id: ObjectId) -> ObjectKey<T> {
        ObjectKey::Id(id)
    }
}

// ===== impl Arena =====

impl<T> Arena<T> {
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn get(&self, index: Index) -> Option<&T> {
        self.0.get(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (Index, &mut T)> {
        self.0.iter_mut()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(Default::default())
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut Self::Output {
        &mut self.0[index]
    }
}

// ===== impl Areas =====

impl<V> Areas<V>
where
    V: Version,
{
    pub(crate) fn insert(
        &mut self,
        area_id: Ipv4Addr,
    ) -> (AreaIndex, &mut Area<V>) {
        self.next_id += 1;
        let area = Area::new(self.next_id, area_id);
        let area_idx = self.arena.0.insert(area);

        // Index the new area.
        let area = &mut self.arena[area_idx];
        self.by_id.insert(area.id, area_idx);
        if self.by_area_id.insert(area.area_id, area_idx).is_some() {
            panic!("area area-id={} already exists", area.area_id);
        }

        (area_idx, area)
    }

    pub(crate) fn delete(&mut self, area_idx: AreaIndex) {
        let area = &mut self.arena[area_idx];

        // Drop the area from the lookup indexes.
        self.by_id.remove(&area.id);
        self.by_area_id.remove(&area.area_id);

        self.arena.0.remove(area_idx);
    }

    pub(crate) fn get_by_id(
        &self,
        id: AreaId,
    ) -> Result<(AreaIndex, &Area<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(|area_idx| (area_idx, &self.arena[area_idx]))
            .filter(|(_, area)| area.id == id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id(
        &mut self,
        id: AreaId,
    ) -> Result<(AreaIndex, &mut Area<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(move |area_idx| (area_idx, &mut self.arena[area_idx]))
            .filter(|(_, area)| area.id == id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_by_area_id(
        &self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &Area<V>)> {
        self.by_area_id
            .get(&area_id)
            .copied()
            .map(|area_idx| (area_idx, &self.arena[area_idx]))
    }

    pub(crate) fn get_mut_by_area_id(
        &mut self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &mut Area<V>)> {
        self.by_area_id
            .get(&area_id)
            .copied()
            .map(move |area_idx| (area_idx, &mut self.arena[area_idx]))
    }

    pub(crate) fn get_by_key(
        &self,
        key: &AreaKey,
    ) -> Result<(AreaIndex, &Area<V>), Error<V>> {
        match key {
            AreaKey::Id(id) => self.get_by_id(*id),
            AreaKey::Value(area_id) => {
                Ok(self.get_by_area_id(*area_id).unwrap())
            }
        }
    }

    pub(crate) fn get_mut_by_key(
        &mut self,
        key: &AreaKey,
    ) -> Result<(AreaIndex, &mut Area<V>), Error<V>> {
        match key {
            AreaKey::Id(id) => self.get_mut_by_id(*id),
            AreaKey::Value(area_id) => {
                Ok(self.get_mut_by_area_id(*area_id).unwrap())
            }
        }
    }

    // Iterates over the areas in area-ID order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Area<V>> {
        self.by_area_id
            .values()
            .map(|area_idx| &self.arena[*area_idx])
    }

    // Iterates over the areas mutably, in no particular order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &'_ mut Area<V>> {
        self.arena.0.iter_mut().map(|(_, area)| area)
    }

    // Iterates over the area indexes in area-ID order.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = AreaIndex> + '_ {
        self.by_area_id.values().copied()
    }

    // An ABR has interfaces attached to more than one active area.
    pub(crate) fn is_abr(&self, interfaces: &Arena<Interface<V>>) -> bool {
        self.active_count(interfaces) > 1
    }

    pub(crate) fn active_count(
        &self,
        interfaces: &Arena<Interface<V>>,
    ) -> usize {
        self.iter()
            .filter(|area| area.is_active(interfaces))
            .count()
    }
}

impl<V> std::ops::Index<AreaIndex> for Areas<V>
where
    V: Version,
{
    type Output = Area<V>;

    fn index(&self, index: AreaIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl<V> std::ops::IndexMut<AreaIndex> for Areas<V>
where
    V: Version,
{
    fn index_mut(&mut self, index: AreaIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

// ===== impl Interfaces =====

impl<V> Interfaces<V>
where
    V: Version,
{
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Interface<V>>,
        ifname: &str,
    ) -> (InterfaceIndex, &'a mut Interface<V>) {
        self.next_id += 1;
        let iface = Interface::new(self.next_id, ifname.to_owned());
        let iface_idx = arena.0.insert(iface);

        // Index the new interface.
        let iface = &mut arena[iface_idx];
        self.by_id.insert(iface.id, iface_idx);
        if self
            .by_name
            .insert(iface.name.clone(), iface_idx)
            .is_some()
        {
            panic!("interface name={} already exists", iface.name);
        }

        (iface_idx, iface)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Interface<V>>,
        iface_idx: InterfaceIndex,
    ) {
        let iface = &mut arena[iface_idx];

        // Drop the interface from the lookup indexes.
        self.by_id.remove(&iface.id);
        self.by_name.remove(&iface.name);
        if let Some(ifindex) = iface.system.ifindex {
            self.by_ifindex.remove(&ifindex);
        }

        arena.0.remove(iface_idx);
    }

    // Rebinds the ifindex lookup when the system ifindex changes.
    pub(crate) fn update_ifindex(
        &mut self,
        iface_idx: InterfaceIndex,
        iface: &mut Interface<V>,
        ifindex: Option<u32>,
    ) {
        if let Some(ifindex) = iface.system.ifindex {
            self.by_ifindex.remove(&ifindex);
        }
        iface.system.ifindex = ifindex;
        if let Some(ifindex) = ifindex {
            self.by_ifindex.insert(ifindex, iface_idx);
        }
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Interface<V>>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a Interface<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(|iface_idx| (iface_idx, &arena[iface_idx]))
            .filter(|(_, iface)| iface.id == id)
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Interface<V>>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a mut Interface<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(move |iface_idx| (iface_idx, &mut arena[iface_idx]))
            .filter(|(_, iface)| iface.id == id)
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    pub(crate) fn get_by_name<'a>(
        &self,
        arena: &'a Arena<Interface<V>>,
        ifname: &str,
    ) -> Option<(InterfaceIndex, &'a Interface<V>)> {
        self.by_name
            .get(ifname)
            .copied()
            .map(|iface_idx| (iface_idx, &arena[iface_idx]))
    }

    pub(crate) fn get_mut_by_name<'a>(
        &mut self,
        arena: &'a mut Arena<Interface<V>>,
        ifname: &str,
    ) -> Option<(InterfaceIndex, &'a mut Interface<V>)> {
        self.by_name
            .get(ifname)
            .copied()
            .map(move |iface_idx| (iface_idx, &mut arena[iface_idx]))
    }

    pub(crate) fn get_by_ifindex<'a>(
        &self,
        arena: &'a Arena<Interface<V>>,
        ifindex: u32,
    ) -> Option<(InterfaceIndex, &'a Interface<V>)> {
        self.by_ifindex
            .get(&ifindex)
            .copied()
            .map(|iface_idx| (iface_idx, &arena[iface_idx]))
    }

    pub(crate) fn get_by_addr<'a>(
        &self,
        arena: &'a Arena<Interface<V>>,
        addr: V::IpAddr,
    ) -> Option<(InterfaceIndex, &'a Interface<V>)> {
        self.by_name
            .values()
            .map(|iface_idx| (*iface_idx, &arena[*iface_idx]))
            .find(|(_, iface)| iface.system.contains_addr(&addr))
    }

    pub(crate) fn get_mut_by_addr<'a>(
        &mut self,
        arena: &'a mut Arena<Interface<V>>,
        addr: V::IpAddr,
    ) -> Option<(InterfaceIndex, &'a mut Interface<V>)> {
        for (iface_idx, iface) in arena.iter_mut() {
            if iface.system.contains_addr(&addr) {
                return Some((iface_idx, iface));
            }
        }

        None
    }

    pub(crate) fn get_by_key<'a>(
        &self,
        arena: &'a Arena<Interface<V>>,
        key: &InterfaceKey,
    ) -> Result<(InterfaceIndex, &'a Interface<V>), Error<V>> {
        match key {
            InterfaceKey::Id(id) => self.get_by_id(arena, *id),
            InterfaceKey::Value(ifname) => {
                Ok(self.get_by_name(arena, ifname).unwrap())
            }
        }
    }

    pub(crate) fn get_mut_by_key<'a>(
        &mut self,
        arena: &'a mut Arena<Interface<V>>,
        key: &InterfaceKey,
    ) -> Result<(InterfaceIndex, &'a mut Interface<V>), Error<V>> {
        match key {
            InterfaceKey::Id(id) => self.get_mut_by_id(arena, *id),
            InterfaceKey::Value(ifname) => {
                Ok(self.get_mut_by_name(arena, ifname).unwrap())
            }
        }
    }

    // Iterates over the interfaces in name order.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Interface<V>>,
    ) -> impl Iterator<Item = &'a Interface<V>> + 'a {
        self.by_name.values().map(|iface_idx| &arena[*iface_idx])
    }

    // Iterates over the interface indexes in name order.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = InterfaceIndex> + '_ {
        self.by_name.values().copied()
    }
}

// ===== impl Neighbors =====

impl<V> Neighbors<V>
where
    V: Version,
{
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor<V>>,
        router_id: Ipv4Addr,
        src: V::NetIpAddr,
    ) -> (NeighborIndex, &'a mut Neighbor<V>) {
        self.next_id += 1;
        let nbr = Neighbor::new(self.next_id, router_id, src);
        let nbr_idx = arena.0.insert(nbr);

        // Index the new neighbor.
        let nbr = &mut arena[nbr_idx];
        let nbr_net_id = nbr.network_id();
        self.by_id.insert(nbr.id, nbr_idx);
        self.by_router_id.insert(nbr.router_id, nbr_idx);
        self.by_net_id.insert(nbr_net_id, nbr_idx);

        (nbr_idx, nbr)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Neighbor<V>>,
        nbr_idx: NeighborIndex,
    ) {
        let nbr = &mut arena[nbr_idx];
        let nbr_net_id = nbr.network_id();

        // Drop the neighbor from the lookup indexes.
        self.by_id.remove(&nbr.id);
        self.by_router_id.remove(&nbr.router_id);
        self.by_net_id.remove(&nbr_net_id);

        arena.0.remove(nbr_idx);
    }

    pub(crate) fn update_router_id(
        &mut self,
        nbr_idx: NeighborIndex,
        nbr: &mut Neighbor<V>,
        router_id: Ipv4Addr,
    ) {
        self.by_router_id.remove(&nbr.router_id);
        nbr.router_id = router_id;
        self.by_router_id.insert(nbr.router_id, nbr_idx);
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<Neighbor<V>>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a Neighbor<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
            .filter(|(_, nbr)| nbr.id == id)
            .ok_or(Error::NeighborIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor<V>>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a mut Neighbor<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(move |nbr_idx| (nbr_idx, &mut arena[nbr_idx]))
            .filter(|(_, nbr)| nbr.id == id)
            .ok_or(Error::NeighborIdNotFound(id))
    }

    pub(crate) fn get_by_router_id<'a>(
        &self,
        arena: &'a Arena<Neighbor<V>>,
        router_id: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a Neighbor<V>)> {
        self.by_router_id
            .get(&router_id)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
    }

    pub(crate) fn get_mut_by_router_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor<V>>,
        router_id: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a mut Neighbor<V>)> {
        self.by_router_id
            .get(&router_id)
            .copied()
            .map(move |nbr_idx| (nbr_idx, &mut arena[nbr_idx]))
    }

    pub(crate) fn get_by_net_id<'a>(
        &self,
        arena: &'a Arena<Neighbor<V>>,
        net_id: NeighborNetId,
    ) -> Option<(NeighborIndex, &'a Neighbor<V>)> {
        self.by_net_id
            .get(&net_id)
            .copied()
            .map(|nbr_idx| (nbr_idx, &arena[nbr_idx]))
    }

    pub(crate) fn get_mut_by_net_id<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor<V>>,
        net_id: NeighborNetId,
    ) -> Option<(NeighborIndex, &'a mut Neighbor<V>)> {
        self.by_net_id
            .get(&net_id)
            .copied()
            .map(move |nbr_idx| (nbr_idx, &mut arena[nbr_idx]))
    }

    pub(crate) fn get_mut_by_key<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor<V>>,
        key: &NeighborKey,
    ) -> Result<(NeighborIndex, &'a mut Neighbor<V>), Error<V>> {
        match key {
            NeighborKey::Id(id) => self.get_mut_by_id(arena, *id),
            NeighborKey::Value(router_id) => {
                Ok(self.get_mut_by_router_id(arena, *router_id).unwrap())
            }
        }
    }

    // Iterates over the neighbors in Router-ID order.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Neighbor<V>>,
    ) -> impl Iterator<Item = &'a Neighbor<V>> + 'a {
        self.by_router_id.values().map(|nbr_idx| &arena[*nbr_idx])
    }

    // Iterates over the neighbor Router IDs in ascending order.
    pub(crate) fn router_ids(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.by_router_id.keys().copied()
    }

    // Iterates over the neighbor indexes in Router-ID order.
    pub(crate) fn indexes(&self) -> impl Iterator<Item = NeighborIndex> + '_ {
        self.by_router_id.values().copied()
    }

    pub(crate) fn count(&self) -> usize {
        self.by_router_id.len()
    }
}

// ===== impl Lsdb =====

impl<V> Lsdb<V>
where
    V: Version,
{
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry<V>>,
        lsdb_id: LsdbId,
        lsa: Arc<Lsa<V>>,
        protocol_input: &ProtocolInputChannelsTx<V>,
    ) -> (LsaEntryIndex, &'a mut LsaEntry<V>) {
        let key = lsa.hdr.key();

        let next_id = self.next_id + 1;
        self.next_id = next_id;
        let entry = LsaEntry::new(next_id, lsa);
        let entry_idx = arena.0.insert(entry);

        // Index the new entry.
        let entry = &mut arena[entry_idx];
        self.by_id.insert(entry.id, entry_idx);
        let lsdb_type =
            self.types
                .entry(key.lsa_type)
                .or_insert_with(|| LsdbSingleType {
                    lsa_type: key.lsa_type,
                    entries: Default::default(),
                    lsa_count: 0,
                    cksum_sum: 0,
                });
        if lsdb_type.entries.insert(key, entry_idx).is_some() {
            fatal::<V>(fatal_code::LSDB_DUPLICATE_KEY, "duplicate LSA key");
        }

        // Add the entry to the aging structure.
        if entry.data.hdr.is_maxage() {
            // MaxAge LSAs are managed by the MaxAge list and removed once
            // all adjacencies have acknowledged them.
            self.maxage_lsas.insert(entry_idx);
            if self.maxage_sweeper.is_none() {
                let task = tasks::lsdb_maxage_sweep_interval(
                    lsdb_id,
                    &protocol_input.lsdb_maxage_sweep_interval,
                );
                self.maxage_sweeper = Some(task);
            }
        } else if entry.data.hdr.is_dna() {
            // DoNotAge LSAs have a frozen age.
            self.dna_lsas.insert(entry_idx);
        } else {
            let age = entry.data.hdr.age() as usize;
            let bin = (self.cursor + AGE_BINS - age) % AGE_BINS;
            self.bins[bin].insert(entry_idx);
            entry.bin = Some(bin);
        }

        lsdb_type.lsa_count += 1;
        lsdb_type.cksum_sum += entry.data.hdr.cksum() as u32;
        self.lsa_count += 1;
        self.cksum_sum += entry.data.hdr.cksum() as u32;

        (entry_idx, entry)
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<LsaEntry<V>>,
        entry_idx: LsaEntryIndex,
    ) {
        let entry = &mut arena[entry_idx];
        let key = entry.data.hdr.key();
        let lsdb_type = self.types.get_mut(&key.lsa_type).unwrap();

        lsdb_type.lsa_count -= 1;
        lsdb_type.cksum_sum -= entry.data.hdr.cksum() as u32;
        self.lsa_count -= 1;
        self.cksum_sum -= entry.data.hdr.cksum() as u32;

        // Drop the entry from the lookup indexes.
        self.by_id.remove(&entry.id);
        lsdb_type.entries.remove(&key);
        if lsdb_type.entries.is_empty() {
            self.types.remove(&key.lsa_type);
        }

        // Remove LSA from the aging structure.
        if let Some(bin) = entry.bin.take() {
            self.bins[bin].remove(&entry_idx);
        }
        self.dna_lsas.remove(&entry_idx);
        self.maxage_lsas.remove(&entry_idx);
        if self.maxage_lsas.is_empty() {
            self.maxage_sweeper = None;
        }

        arena.0.remove(entry_idx);
    }

    // Advances the aging wheel by one second, collecting the entries whose
    // age crossed one of the interesting offsets. The wheel is cross-checked
    // against the key tree as it's scanned; a mismatch means the database is
    // corrupt and the process must not keep running on it.
    pub(crate) fn tick(
        &mut self,
        arena: &Arena<LsaEntry<V>>,
    ) -> AgeTickActions<V> {
        self.cursor = (self.cursor + 1) % AGE_BINS;

        let mut actions = AgeTickActions {
            expired: vec![],
            refresh: vec![],
            orig_release: vec![],
        };

        // Entries whose age just reached MaxAge.
        let expiry_bin = (self.cursor + 1) % AGE_BINS;
        for entry_idx in self.bins[expiry_bin].iter().copied() {
            self.cross_check(arena, entry_idx, expiry_bin);
            actions.expired.push(entry_idx);
        }

        // Self-originated entries due for refresh.
        let refresh_bin =
            (self.cursor + AGE_BINS - LSA_REFRESH_TIME as usize) % AGE_BINS;
        for entry_idx in self.bins[refresh_bin].iter().copied() {
            self.cross_check(arena, entry_idx, refresh_bin);
            let entry = &arena[entry_idx];
            if entry.flags.contains(LsaEntryFlags::SELF_ORIGINATED)
                && !entry.flags.contains(LsaEntryFlags::RECEIVED)
            {
                actions.refresh.push(entry_idx);
            }
        }

        // Deferred originations that waited out MinLSInterval.
        if !self.delayed_orig.is_empty() {
            let release_bin =
                (self.cursor + AGE_BINS - LSA_MIN_INTERVAL as usize) % AGE_BINS;
            for entry_idx in self.bins[release_bin].iter().copied() {
                let entry = &arena[entry_idx];
                let key = entry.data.hdr.key();
                if self.delayed_orig.contains_key(&key) {
                    actions.orig_release.push(key);
                }
            }
        }

        actions
    }

    // Verifies that a binned entry is still linked from the key tree.
    fn cross_check(
        &self,
        arena: &Arena<LsaEntry<V>>,
        entry_idx: LsaEntryIndex,
        bin: usize,
    ) {
        let Some(entry) = arena.get(entry_idx) else {
            fatal::<V>(
                fatal_code::LSDB_CORRUPT_BINS,
                "aging bin references freed LSA",
            );
        };
        if entry.bin != Some(bin) {
            fatal::<V>(fatal_code::LSDB_CORRUPT_BINS, "LSA bin mismatch");
        }
        let key = entry.data.hdr.key();
        if self
            .types
            .get(&key.lsa_type)
            .and_then(|lsdb_type| lsdb_type.entries.get(&key))
            != Some(&entry_idx)
        {
            fatal::<V>(
                fatal_code::LSDB_CORRUPT_TREE,
                "aged LSA missing from key map",
            );
        }
    }

    pub(crate) fn clear(&mut self, arena: &mut Arena<LsaEntry<V>>) {
        for entry_idx in self.by_id.values() {
            arena.0.remove(*entry_idx).unwrap();
        }
        self.by_id.clear();
        self.types.clear();
        for bin in self.bins.iter_mut() {
            bin.clear();
        }
        self.dna_lsas.clear();
        self.maxage_lsas.clear();
        self.maxage_sweeper = None;
        self.delayed_orig.clear();
        self.reissue.clear();
        self.lsa_count = 0;
        self.cksum_sum = 0;
    }

    pub(crate) fn get_by_id<'a>(
        &self,
        arena: &'a Arena<LsaEntry<V>>,
        id: LsaEntryId,
    ) -> Result<(LsaEntryIndex, &'a LsaEntry<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(|entry_idx| (entry_idx, &arena[entry_idx]))
            .filter(|(_, entry)| entry.id == id)
            .ok_or(Error::LsaEntryIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry<V>>,
        id: LsaEntryId,
    ) -> Result<(LsaEntryIndex, &'a mut LsaEntry<V>), Error<V>> {
        self.by_id
            .get(&id)
            .copied()
            .map(move |entry_idx| (entry_idx, &mut arena[entry_idx]))
            .filter(|(_, entry)| entry.id == id)
            .ok_or(Error::LsaEntryIdNotFound(id))
    }

    pub(crate) fn get<'a>(
        &self,
        arena: &'a Arena<LsaEntry<V>>,
        key: &LsaKey<V::LsaType>,
    ) -> Option<(LsaEntryIndex, &'a LsaEntry<V>)> {
        self.types
            .get(&key.lsa_type)
            .and_then(|lsdb_type| lsdb_type.entries.get(key).copied())
            .map(move |entry_idx| (entry_idx, &arena[entry_idx]))
    }

    pub(crate) fn get_mut<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry<V>>,
        key: &LsaKey<V::LsaType>,
    ) -> Option<(LsaEntryIndex, &'a mut LsaEntry<V>)> {
        self.types
            .get(&key.lsa_type)
            .and_then(|lsdb_type| lsdb_type.entries.get(key).copied())
            .map(move |entry_idx| (entry_idx, &mut arena[entry_idx]))
    }

    pub(crate) fn get_by_key<'a>(
        &self,
        arena: &'a Arena<LsaEntry<V>>,
        key: &LsaEntryKey<V::LsaType>,
    ) -> Result<(LsaEntryIndex, &'a LsaEntry<V>), Error<V>> {
        match key {
            LsaEntryKey::Id(id) => self.get_by_id(arena, *id),
            LsaEntryKey::Value(key) => Ok(self.get(arena, key).unwrap()),
        }
    }

    pub(crate) fn get_mut_by_key<'a>(
        &mut self,
        arena: &'a mut Arena<LsaEntry<V>>,
        key: &LsaEntryKey<V::LsaType>,
    ) -> Result<(LsaEntryIndex, &'a mut LsaEntry<V>), Error<V>> {
        match key {
            LsaEntryKey::Id(id) => self.get_mut_by_id(arena, *id),
            LsaEntryKey::Value(key) => Ok(self.get_mut(arena, key).unwrap()),
        }
    }

    // Iterates over the LSAs in key order.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry<V>>,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry<V>)> + 'a {
        self.types
            .values()
            .flat_map(|lsdb_type| lsdb_type.iter(arena))
    }

    // Iterates over the per-type databases in type order.
    pub(crate) fn iter_types(
        &self,
    ) -> impl Iterator<Item = &LsdbSingleType<V>> + '_ {
        self.types.values()
    }

    // Iterates over the LSAs of one type, in key order.
    pub(crate) fn iter_by_type<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry<V>>,
        lsa_type: V::LsaType,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry<V>)> + 'a {
        self.types
            .get(&lsa_type)
            .into_iter()
            .flat_map(|lsdb_type| lsdb_type.iter(arena))
    }

    // Iterates over the LSAs of one type originated by one router, in
    // key order.
    pub(crate) fn iter_by_type_advrtr<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry<V>>,
        lsa_type: V::LsaType,
        adv_rtr: Ipv4Addr,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry<V>)> + 'a {
        self.types
            .get(&lsa_type)
            .into_iter()
            .flat_map(move |lsdb_type| {
                lsdb_type.iter_by_type_advrtr(arena, adv_rtr)
            })
    }

    pub(crate) fn lsa_count(&self) -> u32 {
        self.lsa_count
    }

    pub(crate) fn cksum_sum(&self) -> u32 {
        self.cksum_sum
    }
}

impl<V> Default for Lsdb<V>
where
    V: Version,
{
    fn default() -> Lsdb<V> {
        Lsdb {
            by_id: Default::default(),
            types: BTreeMap::new(),
            bins: vec![BTreeSet::new(); AGE_BINS],
            cursor: 0,
            dna_lsas: Default::default(),
            maxage_lsas: Default::default(),
            maxage_sweeper: Default::default(),
            delayed_orig: Default::default(),
            reissue: Default::default(),
            next_id: Default::default(),
            lsa_count: 0,
            cksum_sum: 0,
        }
    }
}

// ===== impl LsdbSingleType =====

impl<V> LsdbSingleType<V>
where
    V: Version,
{
    pub(crate) fn lsa_type(&self) -> V::LsaType {
        self.lsa_type
    }

    // Iterates over the LSAs in key order.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry<V>>,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry<V>)> + 'a {
        self.entries
            .values()
            .map(|entry_idx| (*entry_idx, &arena[*entry_idx]))
    }

    // Iterates over the LSAs originated by one router, in key order.
    pub(crate) fn iter_by_type_advrtr<'a>(
        &'a self,
        arena: &'a Arena<LsaEntry<V>>,
        adv_rtr: Ipv4Addr,
    ) -> impl Iterator<Item = (LsaEntryIndex, &'a LsaEntry<V>)> + 'a {
        let begin = LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr,
            lsa_id: Ipv4Addr::new(0, 0, 0, 0),
        };
        let end = LsaKey {
            lsa_type: self.lsa_type,
            adv_rtr,
            lsa_id: Ipv4Addr::new(255, 255, 255, 255),
        };
        self.entries
            .range((
                std::ops::Bound::Included(&begin),
                std::ops::Bound::Included(&end),
            ))
            .map(|(_, entry_idx)| (*entry_idx, &arena[*entry_idx]))
    }

    pub(crate) fn lsa_count(&self) -> u32 {
        self.lsa_count
    }

    pub(crate) fn cksum_sum(&self) -> u32 {
        self.cksum_sum
    }
}

// ===== impl LsdbKey =====

impl From<LsdbId> for LsdbKey {
    fn from(lsdb_id: LsdbId) -> LsdbKey {
        match lsdb_id {
            LsdbId::Link(area_id, iface_id) => {
                LsdbKey::Link(area_id.into(), iface_id.into())
            }
            LsdbId::Area(area_id) => LsdbKey::Area(area_id.into()),
            LsdbId::As => LsdbKey::As,
        }
    }
}

// ===== global functions =====

pub(crate) fn lsdb_get<'a, V>(
    instance_lsdb: &'a Lsdb<V>,
    areas: &'a Areas<V>,
    interfaces: &'a Arena<Interface<V>>,
    lsdb_key: &LsdbKey,
) -> Result<(LsdbIndex, &'a Lsdb<V>), Error<V>>
where
    V: Version,
{
    match lsdb_key {
        LsdbKey::Link(area_key, iface_key) => {
            let (area_idx, area) = areas.get_by_key(area_key)?;
            let (iface_idx, iface) =
                area.interfaces.get_by_key(interfaces, iface_key)?;

            let lsdb_idx = LsdbIndex::Link(area_idx, iface_idx);
            let lsdb = &iface.state.lsdb;
            Ok((lsdb_idx, lsdb))
        }
        LsdbKey::Area(area_key) => {
            let (area_idx, area) = areas.get_by_key(area_key)?;

            let lsdb_idx = LsdbIndex::Area(area_idx);
            let lsdb = &area.state.lsdb;
            Ok((lsdb_idx, lsdb))
        }
        LsdbKey::As => {
            let lsdb_idx = LsdbIndex::As;
            let lsdb = instance_lsdb;
            Ok((lsdb_idx, lsdb))
        }
    }
}

pub(crate) fn lsdb_get_mut<'a, V>(
    instance_lsdb: &'a mut Lsdb<V>,
    areas: &'a mut Areas<V>,
    interfaces: &'a mut Arena<Interface<V>>,
    lsdb_key: &LsdbKey,
) -> Result<(LsdbIndex, &'a mut Lsdb<V>), Error<V>>
where
    V: Version,
{
    match lsdb_key {
        LsdbKey::Link(area_key, iface_key) => {
            let (area_idx, area) = areas.get_mut_by_key(area_key)?;
            let (iface_idx, iface) =
                area.interfaces.get_mut_by_key(interfaces, iface_key)?;

            let lsdb_idx = LsdbIndex::Link(area_idx, iface_idx);
            let lsdb = &mut iface.state.lsdb;
            Ok((lsdb_idx, lsdb))
        }
        LsdbKey::Area(area_key) => {
            let (area_idx, area) = areas.get_mut_by_key(area_key)?;

            let lsdb_idx = LsdbIndex::Area(area_idx);
            let lsdb = &mut area.state.lsdb;
            Ok((lsdb_idx, lsdb))
        }
        LsdbKey::As => {
            let lsdb_idx = LsdbIndex::As;
            let lsdb = instance_lsdb;
            Ok((lsdb_idx, lsdb))
        }
    }
}

pub(crate) fn lsdb_index<'a, V>(
    instance_lsdb: &'a Lsdb<V>,
    areas: &'a Areas<V>,
    interfaces: &'a Arena<Interface<V>>,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a Lsdb<V>)
where
    V: Version,
{
    match lsdb_idx {
        LsdbIndex::Link(area_idx, iface_idx) => {
            let area = &areas[area_idx];
            let iface = &interfaces[iface_idx];

            let lsdb_id = LsdbId::Link(area.id, iface.id);
            let lsdb = &iface.state.lsdb;
            (lsdb_id, lsdb)
        }
        LsdbIndex::Area(area_idx) => {
            let area = &areas[area_idx];

            let lsdb = &area.state.lsdb;
            let lsdb_id = LsdbId::Area(area.id);
            (lsdb_id, lsdb)
        }
        LsdbIndex::As => {
            let lsdb_id = LsdbId::As;
            let lsdb = instance_lsdb;
            (lsdb_id, lsdb)
        }
    }
}

pub(crate) fn lsdb_index_mut<'a, V>(
    instance_lsdb: &'a mut Lsdb<V>,
    areas: &'a mut Areas<V>,
    interfaces: &'a mut Arena<Interface<V>>,
    lsdb_idx: LsdbIndex,
) -> (LsdbId, &'a mut Lsdb<V>)
where
    V: Version,
{
    match lsdb_idx {
        LsdbIndex::Link(area_idx, iface_idx) => {
            let area = &areas[area_idx];
            let iface = &mut interfaces[iface_idx];

            let lsdb_id = LsdbId::Link(area.id, iface.id);
            let lsdb = &mut iface.state.lsdb;
            (lsdb_id, lsdb)
        }
        LsdbIndex::Area(area_idx) => {
            let area = &mut areas[area_idx];

            let lsdb = &mut area.state.lsdb;
            let lsdb_id = LsdbId::Area(area.id);
            (lsdb_id, lsdb)
        }
        LsdbIndex::As => {
            let lsdb_id = LsdbId::As;
            let lsdb = instance_lsdb;
            (lsdb_id, lsdb)
        }
    }
}
