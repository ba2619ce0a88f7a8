//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

pub mod lsa;
pub mod lsa_opaque;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::atomic;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use internet_checksum::Checksum;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use rospf_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use rospf_utils::ip::{AddressFamily, Ipv4AddrExt};
use serde::{Deserialize, Serialize};

use crate::neighbor::NeighborNetId;
use crate::ospfv2::packet::lsa::{LsaHdr, LsaType};
use crate::packet::auth::{AuthDecodeCtx, AuthEncodeCtx, AuthMethod};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{Lsa, LsaHdrVersion, LsaKey};
use crate::packet::{
    auth, encode_begin, encode_finish, DbDescFlags, DbDescVersion,
    HelloVersion, LsAckVersion, LsRequestVersion, LsUpdateVersion,
    OptionsVersion, Packet, PacketBase, PacketHdrVersion, PacketType,
    PacketVersion,
};
use crate::version::Ospfv2;

// OSPFv2 Options field.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-1
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Options: u8 {
        const E = 0x02;
        const MC = 0x04;
        const NP = 0x08;
        const DC = 0x20;
        const O = 0x40;
    }
}

// Value of the AuType header field (RFC 2328, appendix D.1).
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AuthType {
    Null = 0x00,
    Simple = 0x01,
    Cryptographic = 0x02,
}

// OSPFv2 packet header (24 octets): version, type, length, Router ID,
// Area ID, checksum, AuType and an 8-octet authentication field.
//
// Only the fields the rest of the code cares about are kept after
// decoding. The on-wire authentication field is interpreted during
// parsing and surfaces as `PacketHdrAuth`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: Ipv4Addr,
    // Cryptographic sequence number from the authentication block.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_seqno: Option<u64>,
}

// Contents of the header's authentication field.
#[derive(Debug)]
pub enum PacketHdrAuth {
    Null,
    Cryptographic {
        key_id: u8,
        auth_len: u8,
        seqno: u32,
    },
}

// Hello packet body: network mask, timers, options, priority, the
// current DR/BDR and the list of neighbors seen on the network.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: Options,
    pub priority: u8,
    pub dead_interval: u32,
    pub dr: Option<NeighborNetId>,
    pub bdr: Option<NeighborNetId>,
    pub neighbors: BTreeSet<Ipv4Addr>,
}

// Database Description packet body: interface MTU, options, the
// I/M/MS flag octet, sequence number and a run of LSA headers.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub mtu: u16,
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// Link State Request packet body: a run of (LS type, Link State ID,
// Advertising Router) triplets, 12 octets each.
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
    pub lsas: Vec<Lsa<Ospfv2>>,
}

// Link State Acknowledgment packet body: a run of LSA headers.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// ===== impl Options =====

impl OptionsVersion<Ospfv2> for Options {
    fn e_bit(&self) -> bool {
        self.contains(Options::E)
    }

    fn dc_bit(&self) -> bool {
        self.contains(Options::DC)
    }
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const VERSION: u8 = 2;

    // Byte offsets of the checksum field and of the authentication
    // field within the fixed header.
    const CKSUM_FIELD: std::ops::Range<usize> = 12..14;
    const AUTH_FIELD: std::ops::Range<usize> = 16..24;

    // Smallest valid body for each packet type. Lengths below these
    // can be rejected before the body parser runs.
    fn body_min_length(pkt_type: PacketType) -> u16 {
        match pkt_type {
            PacketType::Hello => Hello::BASE_LENGTH,
            PacketType::DbDesc => DbDesc::BASE_LENGTH,
            PacketType::LsRequest => 0,
            PacketType::LsUpdate => LsUpdate::BASE_LENGTH,
            PacketType::LsAck => 0,
        }
    }

    // Interprets the AuType and authentication fields at the end of
    // the header.
    fn decode_auth_field(buf: &mut Bytes) -> DecodeResult<PacketHdrAuth> {
        let au_type = buf.try_get_u16()?;
        match AuthType::from_u16(au_type) {
            Some(AuthType::Null) => {
                let _ = buf.try_get_u64()?;
                Ok(PacketHdrAuth::Null)
            }
            Some(AuthType::Cryptographic) => {
                let _ = buf.try_get_u16()?;
                let key_id = buf.try_get_u8()?;
                let auth_len = buf.try_get_u8()?;
                let seqno = buf.try_get_u32()?;
                Ok(PacketHdrAuth::Cryptographic {
                    key_id,
                    auth_len,
                    seqno,
                })
            }
            _ => Err(DecodeError::UnsupportedAuthType(au_type)),
        }
    }
}

impl PacketHdrVersion<Ospfv2> for PacketHdr {
    const LENGTH: u16 = 24;

    fn generate(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
        _instance_id: u8,
    ) -> Self {
        PacketHdr {
            pkt_type,
            router_id,
            area_id,
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

        // The checksum is validated over the full packet, elsewhere.
        let _cksum = buf.try_get_u16()?;

        let hdr_auth = Self::decode_auth_field(buf)?;

        let hdr = PacketHdr {
            pkt_type,
            router_id,
            area_id,
            auth_seqno: None,
        };
        Ok((hdr, pkt_len, hdr_auth))
    }

    fn encode(&self, buf: &mut BytesMut, auth: Option<AuthEncodeCtx<'_>>) {
        buf.put_u8(Self::VERSION);
        buf.put_u8(self.pkt_type as u8);
        // Length and checksum are patched in once the body is known.
        buf.put_u16(0);
        buf.put_ipv4(&self.router_id);
        buf.put_ipv4(&self.area_id);
        buf.put_u16(0);
        match auth {
            Some(auth) => {
                buf.put_u16(AuthType::Cryptographic as u16);
                buf.put_u16(0);
                buf.put_u8(auth.key.id as u8);
                buf.put_u8(auth.key.algo.digest_size());
                // The RFC 5709 sequence number is 32-bit and simply
                // wraps when exhausted.
                buf.put_u32(
                    auth.seqno.fetch_add(1, atomic::Ordering::Relaxed) as u32,
                );
            }
            None => {
                buf.put_u16(AuthType::Null as u16);
                buf.put_u64(0);
            }
        }
    }

    fn update_cksum(buf: &mut BytesMut) {
        let mut cksum = Checksum::new();
        cksum.add_bytes(buf);
        buf[Self::CKSUM_FIELD].copy_from_slice(&cksum.checksum());
    }

    fn verify_cksum(data: &[u8]) -> DecodeResult<()> {
        // The authentication field is excluded from the checksum.
        let mut cksum = Checksum::new();
        cksum.add_bytes(&data[0..Self::AUTH_FIELD.start]);
        cksum.add_bytes(&data[Self::AUTH_FIELD.end..]);
        if cksum.checksum() != [0; 2] {
            return Err(DecodeError::InvalidChecksum);
        }

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

impl PacketBase<Ospfv2> for Hello {
    fn decode(
        _af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let network_mask = buf.try_get_ipv4()?;
        let hello_interval = buf.try_get_u16()?;
        // Unknown option bits are dropped rather than rejected.
        let options = Options::from_bits_truncate(buf.try_get_u8()?);
        let priority = buf.try_get_u8()?;
        let dead_interval = buf.try_get_u32()?;
        let dr = buf.try_get_opt_ipv4()?;
        let bdr = buf.try_get_opt_ipv4()?;

        // The rest of the body is the neighbor list.
        let mut neighbors = BTreeSet::new();
        while buf.remaining() >= 4 {
            neighbors.insert(buf.try_get_ipv4()?);
        }

        Ok(Hello {
            hdr,
            network_mask,
            hello_interval,
            options,
            priority,
            dead_interval,
            dr: dr.map(NeighborNetId::from),
            bdr: bdr.map(NeighborNetId::from),
            neighbors,
        })
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = encode_begin::<Ospfv2>(buf, &self.hdr, auth);

            buf.put_ipv4(&self.network_mask);
            buf.put_u16(self.hello_interval);
            buf.put_u8(self.options.bits());
            buf.put_u8(self.priority);
            buf.put_u32(self.dead_interval);
            let dr = self.dr.map_or(Ipv4Addr::UNSPECIFIED, |id| id.get());
            let bdr = self.bdr.map_or(Ipv4Addr::UNSPECIFIED, |id| id.get());
            buf.put_ipv4(&dr);
            buf.put_ipv4(&bdr);
            for nbr in &self.neighbors {
                buf.put_ipv4(nbr);
            }

            encode_finish::<Ospfv2>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl HelloVersion<Ospfv2> for Hello {
    fn iface_id(&self) -> Option<u32> {
        None
    }

    fn hello_interval(&self) -> u16 {
        self.hello_interval
    }

    fn dead_interval(&self) -> u32 {
        self.dead_interval
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

impl PacketBase<Ospfv2> for DbDesc {
    fn decode(
        _af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let mtu = buf.try_get_u16()?;
        let options = Options::from_bits_truncate(buf.try_get_u8()?);
        let dd_flags = DbDescFlags::from_bits_truncate(buf.try_get_u8()?);
        let dd_seq_no = buf.try_get_u32()?;

        let mut lsa_hdrs = vec![];
        while buf.remaining() >= LsaHdr::LENGTH as usize {
            lsa_hdrs.push(LsaHdr::decode(buf)?);
        }

        Ok(DbDesc {
            hdr,
            mtu,
            options,
            dd_flags,
            dd_seq_no,
            lsa_hdrs,
        })
    }

    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = encode_begin::<Ospfv2>(buf, &self.hdr, auth);

            buf.put_u16(self.mtu);
            buf.put_u8(self.options.bits());
            buf.put_u8(self.dd_flags.bits());
            buf.put_u32(self.dd_seq_no);
            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            encode_finish::<Ospfv2>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl DbDescVersion<Ospfv2> for DbDesc {
    const BASE_LENGTH: u16 = 8;

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
    ) -> Packet<Ospfv2> {
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

impl PacketBase<Ospfv2> for LsRequest {
    fn decode(
        _af: AddressFamily,
        hdr: PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let mut entries = vec![];
        while buf.remaining() >= LsRequest::ENTRY_LENGTH as usize {
            // The LS type is carried as 32 bits but only the low octet
            // is meaningful in OSPFv2.
            let lsa_type = LsaType(buf.try_get_u32()? as u8);
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
            let mut buf = encode_begin::<Ospfv2>(buf, &self.hdr, auth);

            for entry in &self.entries {
                buf.put_u32(entry.lsa_type.0 as u32);
                buf.put_ipv4(&entry.lsa_id);
                buf.put_ipv4(&entry.adv_rtr);
            }

            encode_finish::<Ospfv2>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl LsRequestVersion<Ospfv2> for LsRequest {
    const ENTRY_LENGTH: u16 = 12;

    fn entries(&self) -> &[LsaKey<LsaType>] {
        &self.entries
    }

    fn generate(
        hdr: PacketHdr,
        entries: Vec<LsaKey<LsaType>>,
    ) -> Packet<Ospfv2> {
        Packet::LsRequest(LsRequest { hdr, entries })
    }
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 4;
}

impl PacketBase<Ospfv2> for LsUpdate {
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
            let mut buf = encode_begin::<Ospfv2>(buf, &self.hdr, auth);

            buf.put_u32(self.lsas.len() as u32);
            for lsa in &self.lsas {
                buf.put_slice(&lsa.raw);
            }

            encode_finish::<Ospfv2>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl LsUpdateVersion<Ospfv2> for LsUpdate {
    const BASE_LENGTH: u16 = 4;

    fn into_lsas(self) -> std::vec::IntoIter<Lsa<Ospfv2>> {
        self.lsas.into_iter()
    }

    fn generate(hdr: PacketHdr, lsas: Vec<Lsa<Ospfv2>>) -> Packet<Ospfv2> {
        Packet::LsUpdate(LsUpdate { hdr, lsas })
    }
}

// ===== impl LsAck =====

impl PacketBase<Ospfv2> for LsAck {
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
            let mut buf = encode_begin::<Ospfv2>(buf, &self.hdr, auth);

            for lsa_hdr in &self.lsa_hdrs {
                lsa_hdr.encode(&mut buf);
            }

            encode_finish::<Ospfv2>(buf, auth)
        })
    }

    fn hdr(&self) -> &PacketHdr {
        &self.hdr
    }
}

impl LsAckVersion<Ospfv2> for LsAck {
    fn lsa_hdrs(&self) -> &[LsaHdr] {
        &self.lsa_hdrs
    }

    fn generate(hdr: PacketHdr, lsa_hdrs: Vec<LsaHdr>) -> Packet<Ospfv2> {
        Packet::LsAck(LsAck { hdr, lsa_hdrs })
    }
}

// ===== impl Ospfv2 =====

impl PacketVersion<Self> for Ospfv2 {
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
        hdr_auth: &PacketHdrAuth,
        auth: Option<&AuthDecodeCtx<'_>>,
    ) -> DecodeResult<Option<u64>> {
        // The packet's AuType has to agree with what the receiving
        // interface is configured for.
        let crypto_rx =
            matches!(hdr_auth, PacketHdrAuth::Cryptographic { .. });
        if auth.is_some() != crypto_rx {
            return Err(DecodeError::AuthTypeMismatch);
        }

        match hdr_auth {
            PacketHdrAuth::Null => Ok(None),
            PacketHdrAuth::Cryptographic {
                key_id,
                auth_len,
                seqno,
            } => {
                // The digest sits past the length declared in the
                // header. Make sure it's actually all there.
                let trailer_end = pkt_len as usize + *auth_len as usize;
                if trailer_end > data.len() {
                    return Err(DecodeError::AuthLenError(*auth_len as u16));
                }
                let digest_rx = &data[pkt_len as usize..trailer_end];

                let signed = &data[..pkt_len as usize];
                validate_digest(*key_id, *auth_len, auth, digest_rx, signed)?;

                Ok(Some((*seqno).into()))
            }
        }
    }

    fn encode_auth_trailer(buf: &mut BytesMut, auth: AuthEncodeCtx<'_>) {
        let digest = auth::message_digest(
            buf,
            auth.key.algo,
            &auth.key.string,
            None,
            None,
        );
        buf.put_slice(&digest);
    }
}

// ===== helper functions =====

// Recomputes the message digest over `data` and compares it with the
// received one, after resolving the advertised Key ID against the
// configured key or key-chain.
pub(crate) fn validate_digest(
    key_id: u8,
    auth_len: u8,
    auth: Option<&AuthDecodeCtx<'_>>,
    digest_rx: &[u8],
    data: &[u8],
) -> DecodeResult<()> {
    let auth = auth.as_ref().unwrap();
    let auth_key = match auth.method {
        AuthMethod::ManualKey(key) => {
            if key.id != key_id as u64 {
                return Err(DecodeError::AuthKeyIdNotFound(key_id as u32));
            }
            key
        }
        AuthMethod::Keychain(keychain) => keychain
            .key_lookup_accept(key_id as u64)
            .ok_or(DecodeError::AuthKeyIdNotFound(key_id as u32))?,
    };

    // The advertised digest length has to match the key's algorithm.
    if auth_key.algo.digest_size() != auth_len {
        return Err(DecodeError::AuthLenError(auth_len as u16));
    }

    let digest =
        auth::message_digest(data, auth_key.algo, &auth_key.string, None, None);
    if *digest_rx != digest {
        return Err(DecodeError::AuthError);
    }

    Ok(())
}
