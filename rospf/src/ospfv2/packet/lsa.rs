//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use rospf_utils::bytes::{BytesExt, BytesMutExt};
use rospf_utils::ip::AddressFamily;
use serde::{Deserialize, Serialize};

use crate::ospfv2::packet::Options;
use crate::ospfv2::packet::lsa_opaque::LsaOpaque;
use crate::packet::error::{DecodeError, DecodeResult, LsaValidationError};
use crate::packet::lsa::age_mask;
#[cfg(feature = "testing")]
use crate::packet::lsa::serde_lsa_age_filter;
use crate::packet::lsa::{
    GrReason, LsaBodyVersion, LsaHdrVersion, LsaRouterFlagsVersion, LsaScope,
    LsaTypeVersion, LsaVersion, PrefixOptionsVersion,
};
use crate::lsdb::LSA_DO_NOT_AGE;
use crate::version::Ospfv2;

// OSPFv2 has no per-prefix options; this only satisfies the generic
// codec's associated type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PrefixOptions {}

// Raw LSA type octet, kept as-is so unknown types survive a round
// trip through the database.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaType(pub u8);

// The LSA types this implementation understands.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-5
#[derive(Clone, Copy, Debug, Eq, Ord, FromPrimitive, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaTypeCode {
    Router = 1,
    Network = 2,
    SummaryNetwork = 3,
    SummaryRouter = 4,
    AsExternal = 5,
    Type7 = 7,
    OpaqueLink = 9,
    OpaqueArea = 10,
    OpaqueAs = 11,
}

// Decoded body of an OSPFv2 LSA.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaBody {
    Router(LsaRouter),
    Network(LsaNetwork),
    SummaryNetwork(LsaSummary),
    SummaryRouter(LsaSummary),
    AsExternal(LsaAsExternal),
    Type7(LsaAsExternal),
    OpaqueLink(LsaOpaque),
    OpaqueArea(LsaOpaque),
    OpaqueAs(LsaOpaque),
    Unknown(LsaUnknown),
}

// OSPFv2 LSA header (20 octets): age, options, type, Link State ID,
// Advertising Router, sequence number, checksum and length. The high
// bit of the age field is the DoNotAge bit (RFC 1793).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    #[cfg_attr(
        feature = "testing",
        serde(default, skip_serializing_if = "serde_lsa_age_filter")
    )]
    pub age: u16,
    pub options: Options,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    #[cfg_attr(feature = "testing", serde(skip_serializing))]
    pub seq_no: u32,
    #[cfg_attr(feature = "testing", serde(default, skip_serializing))]
    pub cksum: u16,
    pub length: u16,
}

// Router-LSA body: the V/E/B flag octet, a link count, and one
// 12-octet descriptor per link (plus any deprecated TOS metrics).
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouter {
    pub flags: LsaRouterFlags,
    pub links: Vec<LsaRouterLink>,
}

// OSPFv2 Router Properties Registry.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-11
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaRouterFlags: u8 {
        const B = 0x01;
        const E = 0x02;
        const V = 0x04;
        const NT = 0x10;
    }
}

// OSPFv2 Router LSA Link Type.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv2-parameters/ospfv2-parameters.xhtml#ospfv2-parameters-7
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaRouterLinkType {
    PointToPoint = 0x01,
    TransitNetwork = 0x02,
    StubNetwork = 0x03,
    VirtualLink = 0x04,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouterLink {
    pub link_type: LsaRouterLinkType,
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub metric: u16,
}

// Network-LSA body: the network mask followed by the Router IDs of
// all routers attached to the network.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaNetwork {
    pub mask: Ipv4Addr,
    pub attached_rtrs: BTreeSet<Ipv4Addr>,
}

// Summary-LSA body, shared by types 3 and 4: network mask, a zero
// octet and a 24-bit metric.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaSummary {
    pub mask: Ipv4Addr,
    pub metric: u32,
}

// AS-External-LSA body: network mask, the E-bit plus 24-bit metric,
// forwarding address and route tag. NSSA Type-7 LSAs (RFC 3101) use
// the same layout.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaAsExternal {
    pub mask: Ipv4Addr,
    pub flags: LsaAsExternalFlags,
    pub metric: u32,
    pub fwd_addr: Option<Ipv4Addr>,
    pub tag: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaAsExternalFlags: u8 {
        const E = 0x80;
    }
}

// LSA of a type this implementation doesn't know. The raw octets are
// preserved at the `Lsa` level; nothing of the body is interpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaUnknown {}

// ===== impl PrefixOptions =====

impl PrefixOptionsVersion for PrefixOptions {}

// ===== impl LsaType =====

impl LsaType {
    pub(crate) fn type_code(&self) -> Option<LsaTypeCode> {
        LsaTypeCode::from_u8(self.0)
    }

    pub(crate) fn is_opaque(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::OpaqueLink
                    | LsaTypeCode::OpaqueArea
                    | LsaTypeCode::OpaqueAs
            )
        )
    }
}

impl LsaTypeVersion for LsaType {
    fn scope(&self) -> LsaScope {
        match self.type_code() {
            Some(LsaTypeCode::OpaqueLink) => LsaScope::Link,
            Some(
                LsaTypeCode::Router
                | LsaTypeCode::Network
                | LsaTypeCode::SummaryNetwork
                | LsaTypeCode::SummaryRouter
                | LsaTypeCode::Type7
                | LsaTypeCode::OpaqueArea,
            ) => LsaScope::Area,
            Some(LsaTypeCode::AsExternal | LsaTypeCode::OpaqueAs) => {
                LsaScope::As
            }
            None => LsaScope::Unknown,
        }
    }

    fn is_gr_topology_info(&self) -> bool {
        matches!(
            self.type_code(),
            Some(
                LsaTypeCode::Router
                    | LsaTypeCode::Network
                    | LsaTypeCode::SummaryNetwork
                    | LsaTypeCode::SummaryRouter
                    | LsaTypeCode::AsExternal
                    | LsaTypeCode::Type7
            )
        )
    }
}

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<LsaTypeCode> for LsaType {
    fn from(code: LsaTypeCode) -> LsaType {
        LsaType(code as u8)
    }
}

impl From<LsaType> for u16 {
    fn from(lsa_type: LsaType) -> u16 {
        lsa_type.0.into()
    }
}

// ===== impl LsaHdr =====

impl LsaHdrVersion<Ospfv2> for LsaHdr {
    const LENGTH: u16 = 20;

    fn new(
        age: u16,
        options: Option<Options>,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
    ) -> Self {
        LsaHdr {
            age,
            options: options.unwrap(),
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum: 0,
            length: 0,
        }
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let age = buf.try_get_u16()?;
        let options = Options::from_bits_truncate(buf.try_get_u8()?);
        let lsa_type = LsaType(buf.try_get_u8()?);
        let lsa_id = buf.try_get_ipv4()?;
        let adv_rtr = buf.try_get_ipv4()?;
        let seq_no = buf.try_get_u32()?;
        let cksum = buf.try_get_u16()?;
        let length = buf.try_get_u16()?;

        Ok(LsaHdr {
            age,
            options,
            lsa_type,
            lsa_id,
            adv_rtr,
            seq_no,
            cksum,
            length,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.age);
        buf.put_u8(self.options.bits());
        buf.put_u8(self.lsa_type.0);
        buf.put_ipv4(&self.lsa_id);
        buf.put_ipv4(&self.adv_rtr);
        buf.put_u32(self.seq_no);
        buf.put_u16(self.cksum);
        buf.put_u16(self.length);
    }

    fn age(&self) -> u16 {
        age_mask(self.age)
    }

    fn set_age(&mut self, age: u16) {
        self.age = age;
    }

    fn is_dna(&self) -> bool {
        self.age & LSA_DO_NOT_AGE != 0
    }

    fn options(&self) -> Option<Options> {
        Some(self.options)
    }

    fn lsa_type(&self) -> LsaType {
        self.lsa_type
    }

    fn lsa_id(&self) -> Ipv4Addr {
        self.lsa_id
    }

    fn adv_rtr(&self) -> Ipv4Addr {
        self.adv_rtr
    }

    fn seq_no(&self) -> u32 {
        self.seq_no
    }

    fn set_cksum(&mut self, value: u16) {
        self.cksum = value;
    }

    fn cksum(&self) -> u16 {
        self.cksum
    }

    fn length(&self) -> u16 {
        self.length
    }

    fn set_length(&mut self, length: u16) {
        self.length = length;
    }
}

// ===== impl LsaBody =====

impl LsaBody {
    pub(crate) fn as_summary(&self) -> Option<&LsaSummary> {
        match self {
            LsaBody::SummaryNetwork(summary)
            | LsaBody::SummaryRouter(summary) => Some(summary),
            _ => None,
        }
    }

    pub(crate) fn as_external(&self) -> Option<&LsaAsExternal> {
        match self {
            LsaBody::AsExternal(ext) | LsaBody::Type7(ext) => Some(ext),
            _ => None,
        }
    }
}

impl LsaBodyVersion<Ospfv2> for LsaBody {
    fn decode(
        _af: AddressFamily,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let lsa = match lsa_type.type_code() {
            Some(LsaTypeCode::Router) => {
                LsaBody::Router(LsaRouter::decode(buf)?)
            }
            Some(LsaTypeCode::Network) => {
                LsaBody::Network(LsaNetwork::decode(buf)?)
            }
            Some(LsaTypeCode::SummaryNetwork) => {
                LsaBody::SummaryNetwork(LsaSummary::decode(buf)?)
            }
            Some(LsaTypeCode::SummaryRouter) => {
                LsaBody::SummaryRouter(LsaSummary::decode(buf)?)
            }
            Some(LsaTypeCode::AsExternal) => {
                LsaBody::AsExternal(LsaAsExternal::decode(buf)?)
            }
            Some(LsaTypeCode::Type7) => {
                LsaBody::Type7(LsaAsExternal::decode(buf)?)
            }
            Some(LsaTypeCode::OpaqueLink) => {
                LsaBody::OpaqueLink(LsaOpaque::decode(lsa_id, buf)?)
            }
            Some(LsaTypeCode::OpaqueArea) => {
                LsaBody::OpaqueArea(LsaOpaque::decode(lsa_id, buf)?)
            }
            Some(LsaTypeCode::OpaqueAs) => {
                LsaBody::OpaqueAs(LsaOpaque::decode(lsa_id, buf)?)
            }
            None => LsaBody::Unknown(LsaUnknown::decode(buf)?),
        };

        Ok(lsa)
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaBody::Router(lsa) => lsa.encode(buf),
            LsaBody::Network(lsa) => lsa.encode(buf),
            LsaBody::SummaryNetwork(lsa) => lsa.encode(buf),
            LsaBody::SummaryRouter(lsa) => lsa.encode(buf),
            LsaBody::AsExternal(lsa) => lsa.encode(buf),
            LsaBody::Type7(lsa) => lsa.encode(buf),
            LsaBody::OpaqueLink(lsa) => lsa.encode(buf),
            LsaBody::OpaqueArea(lsa) => lsa.encode(buf),
            LsaBody::OpaqueAs(lsa) => lsa.encode(buf),
            LsaBody::Unknown(lsa) => lsa.encode(buf),
        }
    }

    fn lsa_type(&self) -> LsaType {
        match self {
            LsaBody::Router(_) => LsaTypeCode::Router.into(),
            LsaBody::Network(_) => LsaTypeCode::Network.into(),
            LsaBody::SummaryNetwork(_) => LsaTypeCode::SummaryNetwork.into(),
            LsaBody::SummaryRouter(_) => LsaTypeCode::SummaryRouter.into(),
            LsaBody::AsExternal(_) => LsaTypeCode::AsExternal.into(),
            LsaBody::Type7(_) => LsaTypeCode::Type7.into(),
            LsaBody::OpaqueLink(_) => LsaTypeCode::OpaqueLink.into(),
            LsaBody::OpaqueArea(_) => LsaTypeCode::OpaqueArea.into(),
            LsaBody::OpaqueAs(_) => LsaTypeCode::OpaqueAs.into(),
            LsaBody::Unknown(_) => unreachable!(),
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(
            self,
            LsaBody::Unknown(_)
                | LsaBody::OpaqueLink(LsaOpaque::Unknown(_))
                | LsaBody::OpaqueArea(LsaOpaque::Unknown(_))
                | LsaBody::OpaqueAs(LsaOpaque::Unknown(_))
        )
    }

    fn validate(&self, hdr: &LsaHdr) -> Result<(), LsaValidationError> {
        match self {
            LsaBody::Router(lsa) => lsa.validate(hdr),
            _ => Ok(()),
        }
    }

    fn as_grace(&self) -> Option<(u32, GrReason, Option<Ipv4Addr>)> {
        let grace = self.as_opaque_link()?.as_grace()?;
        let grace_period = grace.grace_period?;
        let gr_reason =
            GrReason::from_u8(grace.gr_reason?).unwrap_or(GrReason::Unknown);
        Some((grace_period, gr_reason, grace.addr))
    }
}

// ===== impl LsaRouter =====

impl LsaRouter {
    pub const BASE_LENGTH: u16 = 4;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let flags = LsaRouterFlags::from_bits_truncate(buf.try_get_u8()?);
        let _reserved = buf.try_get_u8()?;
        let links_cnt = buf.try_get_u16()?;

        let mut links = vec![];
        for _ in 0..links_cnt {
            let link_id = buf.try_get_ipv4()?;
            let link_data = buf.try_get_ipv4()?;
            let link_type = buf.try_get_u8()?;
            let link_type = LsaRouterLinkType::from_u8(link_type)
                .ok_or(DecodeError::UnknownRouterLinkType(link_type))?;
            let num_tos = buf.try_get_u8()?;
            let metric = buf.try_get_u16()?;

            // TOS routing is long deprecated; skip over any TOS metrics.
            for _ in 0..num_tos {
                let _ = buf.try_get_u32()?;
            }

            links
                .push(LsaRouterLink::new(link_type, link_id, link_data, metric));
        }

        Ok(LsaRouter { flags, links })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.bits());
        buf.put_u8(0);
        buf.put_u16(self.links.len() as u16);
        for link in &self.links {
            buf.put_ipv4(&link.link_id);
            buf.put_ipv4(&link.link_data);
            buf.put_u8(link.link_type as u8);
            buf.put_u8(0);
            buf.put_u16(link.metric);
        }
    }

    fn validate(&self, hdr: &LsaHdr) -> Result<(), LsaValidationError> {
        // The Router-LSA's advertising router and LSA-ID must be equal.
        if hdr.adv_rtr != hdr.lsa_id {
            return Err(LsaValidationError::Ospfv2RouterLsaIdMismatch);
        }

        Ok(())
    }
}

// ===== impl LsaRouterFlags =====

impl LsaRouterFlagsVersion for LsaRouterFlags {
    fn is_abr(&self) -> bool {
        self.contains(LsaRouterFlags::B)
    }

    fn is_asbr(&self) -> bool {
        self.contains(LsaRouterFlags::E)
    }
}

// ===== impl LsaNetwork =====

impl LsaNetwork {
    pub const BASE_LENGTH: u16 = 4;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mask = buf.try_get_ipv4()?;

        let mut attached_rtrs = BTreeSet::new();
        while buf.remaining() >= 4 {
            attached_rtrs.insert(buf.try_get_ipv4()?);
        }

        Ok(LsaNetwork {
            mask,
            attached_rtrs,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        for rtr in &self.attached_rtrs {
            buf.put_ipv4(rtr);
        }
    }
}

// ===== impl LsaSummary =====

impl LsaSummary {
    pub const BASE_LENGTH: u16 = 8;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mask = buf.try_get_ipv4()?;
        let _reserved = buf.try_get_u8()?;
        let metric = buf.try_get_u24()?;
        // Trailing TOS metrics, if any, are not interpreted.

        Ok(LsaSummary { mask, metric })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        buf.put_u8(0);
        buf.put_u24(self.metric);
    }
}

// ===== impl LsaAsExternal =====

impl LsaAsExternal {
    pub const BASE_LENGTH: u16 = 16;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let mask = buf.try_get_ipv4()?;
        let flags = LsaAsExternalFlags::from_bits_truncate(buf.try_get_u8()?);
        let metric = buf.try_get_u24()?;
        let fwd_addr = buf.try_get_opt_ipv4()?;
        let tag = buf.try_get_u32()?;
        // Trailing TOS-specific entries, if any, are not interpreted.

        Ok(LsaAsExternal {
            mask,
            flags,
            metric,
            fwd_addr,
            tag,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv4(&self.mask);
        buf.put_u8(self.flags.bits());
        buf.put_u24(self.metric);
        buf.put_ipv4(&self.fwd_addr.unwrap_or(Ipv4Addr::UNSPECIFIED));
        buf.put_u32(self.tag);
    }
}

// ===== impl LsaUnknown =====

impl LsaUnknown {
    pub(crate) fn decode(_buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(LsaUnknown {})
    }

    pub(crate) fn encode(&self, _buf: &mut BytesMut) {
        #[cfg(not(feature = "testing"))]
        unreachable!()
    }
}

// ===== impl Ospfv2 =====

impl LsaVersion<Self> for Ospfv2 {
    type LsaType = LsaType;
    type LsaHdr = LsaHdr;
    type LsaBody = LsaBody;
    type LsaRouterFlags = LsaRouterFlags;
    type LsaRouterLink = LsaRouterLink;
    type PrefixOptions = PrefixOptions;

    fn type3_summary() -> LsaType {
        LsaTypeCode::SummaryNetwork.into()
    }

    fn type4_summary() -> LsaType {
        LsaTypeCode::SummaryRouter.into()
    }

    fn type5_external() -> LsaType {
        LsaTypeCode::AsExternal.into()
    }

    fn type7_nssa() -> LsaType {
        LsaTypeCode::Type7.into()
    }
}
