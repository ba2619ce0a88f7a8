//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

pub mod auth;
pub mod error;
pub mod lsa;

use std::cell::{RefCell, RefMut};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Bytes, BytesMut};
use num_derive::FromPrimitive;
use rospf_utils::ip::AddressFamily;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::neighbor::NeighborNetId;
use crate::packet::auth::{AuthDecodeCtx, AuthEncodeCtx};
use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::lsa::{Lsa, LsaKey};
use crate::version::Version;

// Packet types shared by OSPFv2 and OSPFv3.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-3
#[derive(Clone, Copy, Debug, Eq, Hash, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 0x01,
    DbDesc = 0x02,
    LsRequest = 0x03,
    LsUpdate = 0x04,
    LsAck = 0x05,
}

// Flags carried in Database Description packets.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DbDescFlags: u8 {
        const MS = 0x01;
        const M = 0x02;
        const I = 0x04;
    }
}

// A decoded OSPF packet of either version.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Packet<V: Version> {
    Hello(V::PacketHello),
    DbDesc(V::PacketDbDesc),
    LsRequest(V::PacketLsRequest),
    LsUpdate(V::PacketLsUpdate),
    LsAck(V::PacketLsAck),
}

// Entry point of the per-version packet codec: concrete header, body and
// options types plus the authentication hooks that differ between the
// OSPFv2 trailer (RFC 5709) and the OSPFv3 one (RFC 7166).
pub trait PacketVersion<V: Version> {
    type PacketOptions: OptionsVersion<V>;
    type PacketHdr: PacketHdrVersion<V>;
    type PacketHdrAuth: Send + Sync;
    type PacketHello: HelloVersion<V>;
    type PacketDbDesc: DbDescVersion<V>;
    type PacketLsRequest: LsRequestVersion<V>;
    type PacketLsUpdate: LsUpdateVersion<V>;
    type PacketLsAck: LsAckVersion<V>;

    // Checks a received packet's authentication data against the
    // configured method. On success, returns the received cryptographic
    // sequence number when one is present.
    fn decode_auth_validate(
        data: &[u8],
        pkt_len: u16,
        hdr_auth: &V::PacketHdrAuth,
        auth: Option<&AuthDecodeCtx<'_>>,
    ) -> DecodeResult<Option<u64>>;

    // Appends the authentication trailer to a fully-encoded packet.
    fn encode_auth_trailer(buf: &mut BytesMut, auth: AuthEncodeCtx<'_>);
}

// Fixed packet header of one OSPF version.
pub trait PacketHdrVersion<V: Version>
where
    Self: Sized,
{
    const LENGTH: u16;

    // Builds a header for an outgoing packet.
    fn generate(
        pkt_type: PacketType,
        router_id: Ipv4Addr,
        area_id: Ipv4Addr,
        instance_id: u8,
    ) -> Self;

    // Parses the header, returning it together with the on-wire packet
    // length and whatever per-version authentication fields it carried.
    fn decode(buf: &mut Bytes) -> DecodeResult<(Self, u16, V::PacketHdrAuth)>;

    // Writes the header to the output buffer.
    fn encode(&self, buf: &mut BytesMut, auth: Option<AuthEncodeCtx<'_>>);

    // Recomputes the checksum field over the finished packet.
    fn update_cksum(buf: &mut BytesMut);

    // Checks the checksum of a received packet.
    fn verify_cksum(data: &[u8]) -> DecodeResult<()>;

    fn pkt_type(&self) -> PacketType;
    fn router_id(&self) -> Ipv4Addr;
    fn area_id(&self) -> Ipv4Addr;

    // Cryptographic sequence number accessors, used for replay
    // protection when authentication is enabled.
    fn auth_seqno(&self) -> Option<u64>;
    fn set_auth_seqno(&mut self, seqno: u64);
}

// Behavior common to all packet bodies.
pub trait PacketBase<V: Version>
where
    Self: Send + Sync + Clone + std::fmt::Debug + Serialize + DeserializeOwned,
{
    // Parses the packet body following an already-decoded header.
    fn decode(
        af: AddressFamily,
        hdr: V::PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self>;

    // Serializes header and body to wire format.
    fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes;

    fn hdr(&self) -> &V::PacketHdr;

    fn router_id(&self) -> Ipv4Addr {
        self.hdr().router_id()
    }
}

// The options field, which sits in different places and has different
// widths in the two versions.
pub trait OptionsVersion<V: Version>
where
    Self: Send
        + Sync
        + Clone
        + Copy
        + std::fmt::Debug
        + Eq
        + PartialEq
        + Serialize
        + DeserializeOwned,
{
    // External routing capability.
    fn e_bit(&self) -> bool;

    // Demand circuit support.
    fn dc_bit(&self) -> bool;
}

// Accessors over a decoded Hello packet.
pub trait HelloVersion<V: Version>
where
    Self: PacketBase<V>,
{
    // OSPFv3 carries the sender's Interface ID in the Hello.
    fn iface_id(&self) -> Option<u32>;

    fn hello_interval(&self) -> u16;
    fn dead_interval(&self) -> u32;
    fn options(&self) -> V::PacketOptions;
    fn priority(&self) -> u8;
    fn dr(&self) -> Option<NeighborNetId>;
    fn bdr(&self) -> Option<NeighborNetId>;

    // Routers the sender has recently heard from on this network.
    fn neighbors(&self) -> &BTreeSet<Ipv4Addr>;
}

// Accessors over a decoded Database Description packet.
pub trait DbDescVersion<V: Version>
where
    Self: PacketBase<V>,
{
    const BASE_LENGTH: u16;

    fn mtu(&self) -> u16;
    fn options(&self) -> V::PacketOptions;
    fn dd_flags(&self) -> DbDescFlags;
    fn dd_seq_no(&self) -> u32;

    // Headers of the LSAs being summarized by this packet.
    fn lsa_hdrs(&self) -> &[V::LsaHdr];

    fn generate(
        hdr: V::PacketHdr,
        options: V::PacketOptions,
        mtu: u16,
        dd_flags: DbDescFlags,
        dd_seq_no: u32,
        lsa_hdrs: Vec<V::LsaHdr>,
    ) -> Packet<V>;
}

// Accessors over a decoded Link State Request packet.
pub trait LsRequestVersion<V: Version>
where
    Self: PacketBase<V>,
{
    const ENTRY_LENGTH: u16;

    fn entries(&self) -> &[LsaKey<V::LsaType>];

    fn generate(
        hdr: V::PacketHdr,
        entries: Vec<LsaKey<V::LsaType>>,
    ) -> Packet<V>;
}

// Accessors over a decoded Link State Update packet.
pub trait LsUpdateVersion<V: Version>
where
    Self: PacketBase<V>,
{
    const BASE_LENGTH: u16;

    fn into_lsas(self) -> std::vec::IntoIter<Lsa<V>>;

    fn generate(hdr: V::PacketHdr, lsas: Vec<Lsa<V>>) -> Packet<V>;
}

// Accessors over a decoded Link State Acknowledgment packet.
pub trait LsAckVersion<V: Version>
where
    Self: PacketBase<V>,
{
    fn lsa_hdrs(&self) -> &[V::LsaHdr];

    fn generate(hdr: V::PacketHdr, lsa_hdrs: Vec<V::LsaHdr>) -> Packet<V>;
}

// ===== impl Packet =====

impl<V: Version> Packet<V> {
    // Parses one packet out of a receive buffer, checking length,
    // checksum and authentication along the way.
    pub fn decode(
        af: AddressFamily,
        buf: &mut Bytes,
        auth: Option<AuthDecodeCtx<'_>>,
    ) -> DecodeResult<Self> {
        if buf.len() < V::PacketHdr::LENGTH as usize {
            return Err(DecodeError::IncompletePacket);
        }

        // Keep an untouched view of the whole packet around. Checksum and
        // digest computations need to run over the original octets, and
        // `Bytes` makes the second view free.
        let buf_orig = buf.clone();

        let (mut hdr, pkt_len, hdr_auth) = V::PacketHdr::decode(buf)?;

        // The length field must fit inside what was received. It may be
        // smaller than the buffer: authentication trailers and link-layer
        // padding sit beyond the length the header declares.
        if (pkt_len as usize) > buf_orig.len() {
            return Err(DecodeError::IncompletePacket);
        }

        // With cryptographic authentication in use, the checksum field is
        // not meaningful and the digest takes over its role.
        if auth.is_none() {
            V::PacketHdr::verify_cksum(buf_orig.as_ref())?;
        }
        if let Some(auth_seqno) = V::decode_auth_validate(
            buf_orig.as_ref(),
            pkt_len,
            &hdr_auth,
            auth.as_ref(),
        )? {
            hdr.set_auth_seqno(auth_seqno);
        }

        // Hand the body (everything between the header and the declared
        // packet end) to the type-specific parser.
        let body_len = pkt_len as usize - V::PacketHdr::LENGTH as usize;
        let mut body = buf.slice(..body_len);
        Self::decode_body(af, hdr, &mut body)
    }

    fn decode_body(
        af: AddressFamily,
        hdr: V::PacketHdr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let packet = match hdr.pkt_type() {
            PacketType::Hello => {
                Packet::Hello(V::PacketHello::decode(af, hdr, buf)?)
            }
            PacketType::DbDesc => {
                Packet::DbDesc(V::PacketDbDesc::decode(af, hdr, buf)?)
            }
            PacketType::LsRequest => {
                Packet::LsRequest(V::PacketLsRequest::decode(af, hdr, buf)?)
            }
            PacketType::LsUpdate => {
                Packet::LsUpdate(V::PacketLsUpdate::decode(af, hdr, buf)?)
            }
            PacketType::LsAck => {
                Packet::LsAck(V::PacketLsAck::decode(af, hdr, buf)?)
            }
        };
        Ok(packet)
    }

    pub fn encode(&self, auth: Option<AuthEncodeCtx<'_>>) -> Bytes {
        match self {
            Packet::Hello(pkt) => pkt.encode(auth),
            Packet::DbDesc(pkt) => pkt.encode(auth),
            Packet::LsRequest(pkt) => pkt.encode(auth),
            Packet::LsUpdate(pkt) => pkt.encode(auth),
            Packet::LsAck(pkt) => pkt.encode(auth),
        }
    }

    pub(crate) fn hdr(&self) -> &V::PacketHdr {
        match self {
            Packet::Hello(pkt) => pkt.hdr(),
            Packet::DbDesc(pkt) => pkt.hdr(),
            Packet::LsRequest(pkt) => pkt.hdr(),
            Packet::LsUpdate(pkt) => pkt.hdr(),
            Packet::LsAck(pkt) => pkt.hdr(),
        }
    }
}

// ===== helper functions =====

// Starts encoding a packet: clears the shared thread-local buffer and
// writes the header into it. The matching `encode_finish` call patches
// the length in and seals the packet.
pub(crate) fn encode_begin<'a, V>(
    buf: &'a RefCell<BytesMut>,
    hdr: &V::PacketHdr,
    auth: Option<AuthEncodeCtx<'_>>,
) -> RefMut<'a, BytesMut>
where
    V: Version,
{
    let mut buf = buf.borrow_mut();
    buf.clear();
    hdr.encode(&mut buf, auth);
    buf
}

pub(crate) fn encode_finish<V>(
    mut buf: RefMut<'_, BytesMut>,
    auth: Option<AuthEncodeCtx<'_>>,
) -> Bytes
where
    V: Version,
{
    // Now that the body is in place the real packet length is known.
    let pkt_len = buf.len() as u16;
    buf[2..4].copy_from_slice(&pkt_len.to_be_bytes());

    // Authenticated packets get a trailer in place of a checksum.
    match auth {
        Some(auth) => V::encode_auth_trailer(&mut buf, auth),
        None => V::PacketHdr::update_cksum(&mut buf),
    }

    buf.clone().freeze()
}
