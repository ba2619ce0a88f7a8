//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

pub mod lsa;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::atomic;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use rospf_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use rospf_utils::crypto::CryptoProtocolId;
use rospf_utils::ip::{AddressFamily, Ipv4AddrExt};
use rospf_utils::keychain::Key;
use serde::{Deserialize, Serialize};

use crate::neighbor::NeighborNetId;
use crate::ospfv3::packet::lsa::{LsaHdr, LsaType};
use crate::packet::auth::{AuthDecodeCtx, AuthEncodeCtx, AuthMethod};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{Lsa, LsaHdrVersion, LsaKey};
use crate::packet::{
    auth, encode_begin, encode_finish, DbDescFlags, DbDescVersion,
    HelloVersion, LsAckVersion, LsRequestVersion, LsUpdateVersion,
    OptionsVersion, Packet, PacketBase, PacketHdrVersion, PacketType,
    PacketVersion,
};
use crate::version::Ospfv3;

// OSPFv3 Options field.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv3-parameters/ospfv3-parameters.xhtml#ospfv3-parameters-1
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Options: u16 {
        const V6 = 0x0001;
        const E = 0x0002;
        const N = 0x0008;
        const R = 0x0010;
        const DC = 0x0020;
        const AF = 0x0100;
        const AT = 0x0400;
    }
}

// Authentication types of the RFC 7166 trailer.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AuthType {
    HmacCryptographic = 0x01,
}

// Size of the fixed part of the authentication trailer, before the
// digest.
pub const AUTH_TRAILER_HDR_SIZE: u16 = 16;

// OSPFv3 packet header (16 octets): version, type, length, Router ID,
// Area ID, checksum, Instance ID and a reserved octet. Unlike OSPFv2
// there is no in-header authentication block.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: Ipv4Addr,
    pub instance_id: u8,
    // Cryptographic sequence number from the authentication trailer.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_seqno: Option<u64>,
}

// Placeholder for the generic codec: all OSPFv3 authentication state
// lives in the trailer, not the header.
#[derive(Debug)]
pub struct PacketHdrAuth;

// Hello packet body: Interface ID, priority, 24-bit options, timers,
// DR/BDR Router IDs and the neighbor list.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub iface_id: u32,
    pub priority: u8,
    pub options: Options,
    pub hello_interval: u16,
    pub dead_interval: u16,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub neighbors: BTreeSet<Ipv4Addr>,
}

// Database Description packet body.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub options: Options,
    pub mtu: u16,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// Link State Request packet body: a run of (LS type, Link State ID,
// Advertising Router) triplets.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsRequest {
    pub hdr: PacketHdr,
    pub entries: Vec<LsaKey<LsaType>>,
}

// Link State Update packet body: an LSA count followed by that many
// full LSAs.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub lsas: Vec<Lsa<Ospfv3>>,
}

// Link State Acknowledgment packet body: a run of LSA headers.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// ===== impl Options =====

impl Options {
    // The options field is 24 bits wide on the wire in the Database
    // Description packet; only the low 16 are defined.
    pub(crate) fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let _ = buf.try_get_u8()?;
        Ok(Options::from_bits_truncate(buf.try_get_u16()?))
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
        buf.put_u16(self.bits());
    }
}

impl OptionsVersion<Ospfv3> for Options {
    fn e_bit(&self) -> bool {
        self.contains(Options::E)
    }

    fn dc_bit(&self) -> bool {
        self.contains(Options::DC)
    }
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const VERSION: u8 = 3;

    // Smallest valid body for each packet type.
    fn body_min_length(pkt_type: PacketType) -> u16 {
        match pkt_type {
            PacketType::Hello => Hello::BASE_LENGTH,
            PacketType::DbDesc => DbDesc::BASE_LENGTH,
            PacketType::LsRequest => 0,
            PacketType::LsUpdate => LsUpdate::BASE_LENGTH,
            PacketType::LsAck => 0,
        }
    }
}

impl PacketHdrVersion<Ospfv3> for PacketHdr {
    const LENGTH: u16 = 16;

    fn generate(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
        instance_id: u8,
    ) -> Self {
        PacketHdr {
            pkt_type,
            router_id,
            area_id,
            instance_id,
            auth_seqno: None,
        }
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<(Self, u16, PacketHdrAuth)> {
        let version = buf.try_get_u8()?;
        if version != Self::VERSION {
            return Err(DecodeError::InvalidVersion(version));
        }

        let pkt_type = buf.try_get_u8()?;
        let Some(pkt_type) = PacketType::from_u8(pkt_type) else {
            return Err(DecodeError::UnknownPacketType(pkt_type));
        };

        let pkt_len = buf.try_get_u16()?;
        if pkt_len < Self::LENGTH + Self::body_min_length(pkt_type) {
            return Err(DecodeError::InvalidLength(pkt_len));
        }

        let router_id = buf.try_get_ipv4()?;
        if !router_id.is_usable() {
            return Err(DecodeError::InvalidRouterId(router_id));
        }

        let area_id = buf.try_get_ipv4()?;

        // The checksum covers the IPv6 pseudo-header, so it's handled at
        // the I/O boundary rather than here.
        let _cksum = buf.try_get_u16()?;

        let instance_id = buf.try_get_u8()?;
        let _reserved = buf.try_get_u8()?;

        let hdr = PacketHdr {
            pkt_type,
            router_id,
            area_id,
            instance_id,
            auth_seqno: None,
        };
        Ok((hdr, pkt_len, PacketHdrAuth))
    }

    fn encode(&self, buf: &mut BytesMut, _auth: Option<AuthEncodeCtx<'_>>) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(self.pkt_type as u8);
        // Length is patched in once the body is known; the checksum
        // field stays zero and is filled at the I/O boundary.
        buf.put_u16(0);
        buf.put_ipv4(&self.router_id);
        buf.put_ipv4(&self.area_id);
        buf.put_u16(0);
        buf.put_u8(self.instance_id);
        buf.put_u8(0);
    }

    fn update_cksum(_buf: &mut BytesMut) {
        // Left to the I/O boundary (IPv6 pseudo-header).
    }

    fn verify_cksum(_data: &[u8]) -> DecodeResult<()> {
        // Left to the I/O boundary (IPv6 pseudo-header).
        Ok(())
    }

    fn pkt_type(&self) -> PacketType {
        self.pkt_type
    }

    fn router_id(&self) -> Ipv4Addr {
        self.router_id
    }

    fn area_id(&self) -> Ipv4Addr {
        self.area_id
    }

    fn auth_seqno(&self) -> Option<u64> {
        self.auth_seqno
    }

    fn set_auth_seqno(&mut self, seqno: u64) {
        self.auth_seqno = Some(seqno)
    }
}

// ===== impl Hello =====

impl Hello {
    pub const BASE_LENGTH: u16 = 20;
}

impl PacketBase<Ospfv3> for Hello {
    fn decode(
        _af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let iface_id = buf.try_get_u32()?;
        let priority = buf.try_get_u8()?;
        // Unknown option bits are dropped rather than rejected.
        let options = Options::from_bits_truncate(buf.try_get_u24()? as u16);
        let hello_interval = buf.try_get_u16()?;
        let dead_interval = buf.try_get_u16()?;
        let dr = buf.try_get_opt_ipv4()?;
        let bdr = buf.try_get_opt_ipv4()?;

        // The rest of the body is the neighbor list.
        let mut neighbors = BTreeSet::new();
        while buf.remaining() >= 4 {
            neighbors.insert(buf.try_get_ipv4()?);
        }

        Ok(Hello {
            hdr,
            iface_id,
            priority,
            options,
            hello_interval,
            dead_interval,
            dr: dr.map(NeighborNetId::from),
            bdr: bdr.map(NeighborNetId::from),
            neighbors,
        })
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = encode_begin::<Ospfv3>(buf, &self.hdr, auth);

            buf.put_u32(self.iface_id);
            buf.put_u8(self.priority);
            buf.put_u24(self.options.bits() as u32);
            buf.put_u16(self.hello_interval);
            buf.put_u16(self.dead_interval);
            let dr = self.dr.map_or(Ipv4Addr::UNSPECIFIED, |id| id.get());
            let bdr = self.bdr.map_or(Ipv4Addr::UNSPECIFIED, |id| id.get());
            buf.put_ipv4(&dr);
            buf.put_ipv4(&bdr);
            for nbr in &self.neighbors {
                buf.put_ipv4(nbr);
            }

            encode_finish::<Ospfv3>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl HelloVersion<Ospfv3> for Hello {
    fn iface_id(&self) -> Option<u32> {
        Some(self.iface_id)
    }

    fn hello_interval(&self) -> u16 {
        self.hello_interval
    }

    fn dead_interval(&self) -> u32 {
        self.dead_interval.into()
    }

    fn options(&self) -> Options {
        self.options
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn dr(&self) -> Option<NeighborNetId> {
        self.dr
    }

    fn bdr(&self) -> Option<NeighborNetId> {
        self.bdr
    }

    fn neighbors(&self) -> &BTreeSet<Ipv4Addr> {
        &self.neighbors
    }
}

// ===== impl DbDesc =====

impl PacketBase<Ospfv3> for DbDesc {
    fn decode(
        _af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let options = Options::decode(buf)?;
        let mtu = buf.try_get_u16()?;
        let _reserved = buf.try_get_u8()?;
        let dd_flags = DbDescFlags::from_bits_truncate(buf.try_get_u8()?);
        let dd_seq_no = buf.try_get_u32()?;

        let mut lsa_hdrs = vec![];
        while buf.remaining() >= LsaHdr::LENGTH as usize {
            lsa_hdrs.push(LsaHdr::decode(buf)?);
        }

        Ok(DbDesc {
            hdr,
            options,
            mtu,
            dd_flags,
            dd_seq_no,
            lsa_hdrs,
        })
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = encode_begin::<Ospfv3>(buf, &self.hdr, auth);

            buf.put_u8(0);
            self.options.encode(&mut buf);
            buf.put_u16(self.mtu);
            buf.put_u8(0);
            buf.put_u8(self.dd_flags.bits());
            buf.put_u32(self.dd_seq_no);
            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            encode_finish::<Ospfv3>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl DbDescVersion<Ospfv3> for DbDesc {
    const BASE_LENGTH: u16 = 12;

    fn mtu(&self) -> u16 {
        self.mtu
    }

    fn options(&self) -> Options {
        self.options
    }

    fn dd_flags(&self) -> DbDescFlags {
        self.dd_flags
    }

    fn dd_seq_no(&self) -> u32 {
        self.dd_seq_no
    }

    fn lsa_hdrs(&self) -> &[LsaHdr] {
        &self.lsa_hdrs
    }

    fn generate(
        hdr: PacketHdr,
        options: Options,
        mtu: u16,
        dd_flags: DbDescFlags,
        dd_seq_no: u32,
        lsa_hdrs: Vec<LsaHdr>,
    ) -> Packet<Ospfv3> {
        Packet::DbDesc(DbDesc {
            hdr,
            options,
            mtu,
            dd_flags,
            dd_seq_no,
            lsa_hdrs,
        })
    }
}

// ===== impl LsRequest =====

impl PacketBase<Ospfv3> for LsRequest {
    fn decode(
        _af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let mut entries = vec![];
        while buf.remaining() >= LsRequest::ENTRY_LENGTH as usize {
            let _reserved = buf.try_get_u16()?;
            let lsa_type = LsaType(buf.try_get_u16()?);
            let lsa_id = buf.try_get_ipv4()?;
            let adv_rtr = buf.try_get_ipv4()?;
            entries.push(LsaKey {
                lsa_type,
                adv_rtr,
                lsa_id,
            });
        }

        Ok(LsRequest { hdr, entries })
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = encode_begin::<Ospfv3>(buf, &self.hdr, auth);

            for entry in &self.entries {
                buf.put_u16(0);
                buf.put_u16(entry.lsa_type.0);
                buf.put_ipv4(&entry.lsa_id);
                buf.put_ipv4(&entry.adv_rtr);
            }

            encode_finish::<Ospfv3>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl LsRequestVersion<Ospfv3> for LsRequest {
    const ENTRY_LENGTH: u16 = 12;

    fn entries(&self) -> &[LsaKey<LsaType>] {
        &self.entries
    }

    fn generate(
        hdr: PacketHdr,
        entries: Vec<LsaKey<LsaType>>,
    ) -> Packet<Ospfv3> {
        Packet::LsRequest(LsRequest { hdr, entries })
    }
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 4;
}

impl PacketBase<Ospfv3> for LsUpdate {
    fn decode(
        af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        // A malformed LSA doesn't poison the whole packet; it's logged
        // and the remaining LSAs are still processed.
        let mut lsas = vec![];
        let lsas_cnt = buf.try_get_u32()?;
        for _ in 0..lsas_cnt {
            match Lsa::decode(af, buf) {
                Ok(lsa) => lsas.push(lsa),
                Err(error) => error.log(),
            }
        }

        Ok(LsUpdate { hdr, lsas })
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = encode_begin::<Ospfv3>(buf, &self.hdr, auth);

            buf.put_u32(self.lsas.len() as u32);
            for lsa in &self.lsas {
                buf.put_slice(&lsa.raw);
            }

            encode_finish::<Ospfv3>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl LsUpdateVersion<Ospfv3> for LsUpdate {
    const BASE_LENGTH: u16 = 4;

    fn into_lsas(self) -> std::vec::IntoIter<Lsa<Ospfv3>> {
        self.lsas.into_iter()
    }

    fn generate(hdr: PacketHdr, lsas: Vec<Lsa<Ospfv3>>) -> Packet<Ospfv3> {
        Packet::LsUpdate(LsUpdate { hdr, lsas })
    }
}

// ===== impl LsAck =====

impl PacketBase<Ospfv3> for LsAck {
    fn decode(
        _af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let mut lsa_hdrs = vec![];
        while buf.remaining() >= LsaHdr::LENGTH as usize {
            lsa_hdrs.push(LsaHdr::decode(buf)?);
        }

        Ok(LsAck { hdr, lsa_hdrs })
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = encode_begin::<Ospfv3>(buf, &self.hdr, auth);

            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            encode_finish::<Ospfv3>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl LsAckVersion<Ospfv3> for LsAck {
    fn lsa_hdrs(&self) -> &[LsaHdr] {
        &self.lsa_hdrs
    }

    fn generate(hdr: PacketHdr, lsa_hdrs: Vec<LsaHdr>) -> Packet<Ospfv3> {
        Packet::LsAck(LsAck { hdr, lsa_hdrs })
    }
}

// ===== impl Ospfv3 =====

impl PacketVersion<Self> for Ospfv3 {
    type PacketOptions = Options;
    type PacketHdr = PacketHdr;
    type PacketHdrAuth = PacketHdrAuth;
    type PacketHello = Hello;
    type PacketDbDesc = DbDesc;
    type PacketLsRequest = LsRequest;
    type PacketLsUpdate = LsUpdate;
    type PacketLsAck = LsAck;

    fn decode_auth_validate(
        data: &[u8],
        pkt_len: u16,
        _hdr_auth: &PacketHdrAuth,
        auth: Option<&AuthDecodeCtx<'_>>,
    ) -> DecodeResult<Option<u64>> {
        // Without configured authentication there is nothing to check;
        // a trailer the sender may have appended is simply not examined.
        let Some(auth) = auth else {
            return Ok(None);
        };

        // The trailer starts where the header's length field says the
        // packet ends.
        let mut trailer = Bytes::copy_from_slice(&data[pkt_len as usize..]);
        if trailer.remaining() < AUTH_TRAILER_HDR_SIZE as usize {
            return Err(DecodeError::InvalidLength(trailer.len() as u16));
        }
        let au_type = trailer.try_get_u16()?;
        if AuthType::from_u16(au_type) != Some(AuthType::HmacCryptographic) {
            return Err(DecodeError::UnsupportedAuthType(au_type));
        }
        let auth_len = trailer.try_get_u16()?;
        let _reserved = trailer.try_get_u16()?;
        let key_id = trailer.try_get_u16()?;
        let seqno = trailer.try_get_u64()?;

        let auth_key = auth_key_lookup(auth, key_id)?;

        // The advertised trailer length has to cover the fixed part
        // plus the digest, and the digest has to be fully present.
        let digest_size = auth_key.algo.digest_size() as usize;
        if auth_len != AUTH_TRAILER_HDR_SIZE + digest_size as u16 {
            return Err(DecodeError::AuthLenError(auth_len));
        }
        if trailer.remaining() < digest_size {
            return Err(DecodeError::AuthLenError(auth_len));
        }

        // The digest covers the packet plus the fixed trailer part.
        let digest_rx = trailer.slice(..digest_size);
        let signed_len = pkt_len as usize + AUTH_TRAILER_HDR_SIZE as usize;
        let digest = auth::message_digest(
            &data[..signed_len],
            auth_key.algo,
            &auth_key.string,
            Some(CryptoProtocolId::Ospfv3),
            Some(&auth.src_addr),
        );
        if *digest_rx != digest {
            return Err(DecodeError::AuthError);
        }

        Ok(Some(seqno))
    }

    fn encode_auth_trailer(buf: &mut BytesMut, auth: AuthEncodeCtx<'_>) {
        // Fixed part of the trailer.
        buf.put_u16(AuthType::HmacCryptographic as u16);
        buf.put_u16(AUTH_TRAILER_HDR_SIZE + auth.key.algo.digest_size() as u16);
        buf.put_u16(0);
        buf.put_u16(auth.key.id as u16);
        buf.put_u64(auth.seqno.fetch_add(1, atomic::Ordering::Relaxed));

        // Digest over everything written so far.
        let digest = auth::message_digest(
            buf,
            auth.key.algo,
            &auth.key.string,
            Some(CryptoProtocolId::Ospfv3),
            Some(&auth.src_addr),
        );
        buf.put_slice(&digest);
    }
}

// ===== helper functions =====

// Resolves the Key ID advertised in the trailer against the configured
// key or key-chain.
fn auth_key_lookup<'a>(
    auth: &'a AuthDecodeCtx<'_>,
    key_id: u16,
) -> DecodeResult<&'a Key> {
    match auth.method {
        AuthMethod::ManualKey(key) => {
            if key.id != key_id as u64 {
                return Err(DecodeError::AuthKeyIdNotFound(key_id as u32));
            }
            Ok(key)
        }
        AuthMethod::Keychain(keychain) => keychain
            .key_lookup_accept(key_id as u64)
            .ok_or(DecodeError::AuthKeyIdNotFound(key_id as u32)),
    }
}
