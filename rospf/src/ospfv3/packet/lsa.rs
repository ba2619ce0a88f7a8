//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use rospf_utils::bytes::{BytesExt, BytesMutExt};
use rospf_utils::ip::{AddressFamily, IpNetworkKind};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::lsdb::LSA_DO_NOT_AGE;
use crate::ospfv3::packet::Options;
use crate::packet::error::{DecodeError, DecodeResult, LsaValidationError};
use crate::packet::lsa::age_mask;
#[cfg(feature = "testing")]
use crate::packet::lsa::serde_lsa_age_filter;
use crate::packet::lsa::{
    GrReason, LsaBodyVersion, LsaHdrVersion, LsaRouterFlagsVersion, LsaScope,
    LsaTypeVersion, LsaVersion, PrefixOptionsVersion,
};
use crate::version::Ospfv3;

// The PrefixOptions Field.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv3-parameters/ospfv3-parameters.xhtml#ospfv3-parameters-4
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct PrefixOptions: u8 {
        const NU = 0x01;
        const LA = 0x02;
        const P = 0x08;
        const DN = 0x10;
    }
}

// Raw LSA type field: U-bit, flooding scope and function code.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaType(pub u16);

// The U-bit indicates how the LSA should be handled by a router that does
// not recognize the LSA's function code.
pub const U_BIT: u16 = 1 << 15;

// Flooding scope bits of the LSA type field.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaScopeCode {
    Link = 0x0000,
    Area = 0x2000,
    As = 0x4000,
    Reserved = 0x6000,
}

// OSPFv3 LSA function code.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv3-parameters/ospfv3-parameters.xhtml#ospfv3-parameters-3
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaFunctionCode {
    Router = 1,
    Network = 2,
    InterAreaPrefix = 3,
    InterAreaRouter = 4,
    AsExternal = 5,
    Nssa = 7,
    Link = 8,
    IntraAreaPrefix = 9,
    Grace = 11,
}

// OSPFv3 LSA header (20 octets): age, 16-bit type, Link State ID,
// Advertising Router, sequence number, checksum and length. As in
// OSPFv2, the high bit of the age field is the DoNotAge bit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    #[cfg_attr(
        feature = "testing",
        serde(default, skip_serializing_if = "serde_lsa_age_filter")
    )]
    pub age: u16,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    #[cfg_attr(feature = "testing", serde(skip_serializing))]
    pub seq_no: u32,
    #[cfg_attr(feature = "testing", serde(default, skip_serializing))]
    pub cksum: u16,
    pub length: u16,
}

// Decoded body of an OSPFv3 LSA.
#[derive(Clone, Debug, Eq, PartialEq, EnumAsInner)]
#[derive(Deserialize, Serialize)]
pub enum LsaBody {
    Router(LsaRouter),
    Network(LsaNetwork),
    InterAreaPrefix(LsaInterAreaPrefix),
    InterAreaRouter(LsaInterAreaRouter),
    AsExternal(LsaAsExternal),
    Nssa(LsaAsExternal),
    Link(LsaLink),
    IntraAreaPrefix(LsaIntraAreaPrefix),
    Grace(LsaGrace),
    Unknown(LsaUnknown),
}

// Router-LSA body: the Nt/V/E/B flag octet and 24-bit options,
// followed by one 16-octet descriptor per link (type, metric,
// Interface ID, Neighbor Interface ID, Neighbor Router ID).
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouter {
    pub flags: LsaRouterFlags,
    pub options: Options,
    pub links: Vec<LsaRouterLink>,
}

// OSPFv3 Router Properties Registry.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv3-parameters/ospfv3-parameters.xhtml#ospfv3-parameters-7
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

// OSPFv3 Router LSA Link Types.
//
// IANA registry:
// https://www.iana.org/assignments/ospfv3-parameters/ospfv3-parameters.xhtml#ospfv3-parameters-6
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaRouterLinkType {
    PointToPoint = 0x01,
    TransitNetwork = 0x02,
    VirtualLink = 0x04,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouterLink {
    pub link_type: LsaRouterLinkType,
    pub metric: u16,
    pub iface_id: u32,
    pub nbr_iface_id: u32,
    pub nbr_router_id: Ipv4Addr,
}

//
// OSPFv3 Network-LSA.
//
// Encoding format (LSA body): options followed by the list of attached
// routers.
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaNetwork {
    pub options: Options,
    pub attached_rtrs: BTreeSet<Ipv4Addr>,
}

// Inter-Area-Prefix-LSA body: a 24-bit metric followed by one
// variable-length encoded prefix.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaInterAreaPrefix {
    pub metric: u32,
    pub prefix_options: PrefixOptions,
    pub prefix: IpNetwork,
}

//
// OSPFv3 Inter-Area-Router LSA.
//
// Encoding format (LSA body): options, metric and the destination
// router-id.
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaInterAreaRouter {
    pub options: Options,
    pub metric: u32,
    pub router_id: Ipv4Addr,
}

// AS-External-LSA body: the E/F/T flag bits and 24-bit metric, an
// encoded prefix, then optional forwarding address, route tag and
// referenced Link State ID as selected by the flags. NSSA LSAs use
// the same layout.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaAsExternal {
    pub flags: LsaAsExternalFlags,
    pub metric: u32,
    pub prefix_options: PrefixOptions,
    pub prefix: IpNetwork,
    pub fwd_addr: Option<IpAddr>,
    pub tag: Option<u32>,
    pub ref_lsa_type: Option<LsaType>,
    pub ref_lsa_id: Option<Ipv4Addr>,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaAsExternalFlags: u8 {
        const T = 0x01;
        const F = 0x02;
        const E = 0x04;
    }
}

//
// OSPFv3 Link LSA.
//
// Encoding format (LSA body): router priority, options, link-local
// address and the list of prefixes associated with the link.
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaLink {
    pub priority: u8,
    pub options: Options,
    pub linklocal: IpAddr,
    pub prefixes: Vec<LsaLinkPrefix>,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaLinkPrefix {
    pub options: PrefixOptions,
    pub value: IpNetwork,
}

//
// OSPFv3 Intra-Area-Prefix LSA.
//
// Encoding format (LSA body): prefix count, referenced LSA identification
// and the list of (prefix, metric) entries.
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaIntraAreaPrefix {
    pub ref_lsa_type: LsaType,
    pub ref_lsa_id: Ipv4Addr,
    pub ref_adv_rtr: Ipv4Addr,
    pub prefixes: Vec<LsaIntraAreaPrefixEntry>,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaIntraAreaPrefixEntry {
    pub options: PrefixOptions,
    pub value: IpNetwork,
    pub metric: u16,
}

//
// OSPFv3 Grace-LSA (RFC 5187). TLV-encoded like its OSPFv2 counterpart;
// the restarting neighbor is identified by the link, so no address TLV.
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaGrace {
    pub grace_period: Option<u32>,
    pub gr_reason: Option<u8>,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum GraceTlvType {
    GracePeriod = 1,
    GrReason = 2,
}

//
// OSPFv3 Unknown LSA. The body is retained un-decoded so the LSA can be
// stored and flooded according to its U-bit.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaUnknown {
    pub data: Bytes,
}

// ===== impl LsaType =====

impl LsaType {
    pub(crate) fn function_code(&self) -> Option<LsaFunctionCode> {
        LsaFunctionCode::from_u16(self.0 & 0x1fff)
    }

    pub(crate) fn u_bit(&self) -> bool {
        self.0 & U_BIT != 0
    }
}

impl LsaTypeVersion for LsaType {
    fn scope(&self) -> LsaScope {
        match LsaScopeCode::from_u16(self.0 & 0x6000) {
            Some(LsaScopeCode::Link) => LsaScope::Link,
            Some(LsaScopeCode::Area) => LsaScope::Area,
            Some(LsaScopeCode::As) => LsaScope::As,
            _ => LsaScope::Unknown,
        }
    }

    fn is_gr_topology_info(&self) -> bool {
        matches!(
            self.function_code(),
            Some(
                LsaFunctionCode::Router
                    | LsaFunctionCode::Network
                    | LsaFunctionCode::InterAreaPrefix
                    | LsaFunctionCode::InterAreaRouter
                    | LsaFunctionCode::AsExternal
                    | LsaFunctionCode::Nssa
            )
        )
    }
}

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl From<LsaType> for u16 {
    fn from(lsa_type: LsaType) -> u16 {
        lsa_type.0
    }
}

impl LsaFunctionCode {
    // Return the full LSA type for the standard flooding scope of this
    // function code.
    pub(crate) fn lsa_type(&self) -> LsaType {
        let scope = match self {
            LsaFunctionCode::Link | LsaFunctionCode::Grace => {
                LsaScopeCode::Link
            }
            LsaFunctionCode::AsExternal => LsaScopeCode::As,
            _ => LsaScopeCode::Area,
        };
        LsaType(scope as u16 | *self as u16)
    }
}

// ===== impl LsaHdr =====

impl LsaHdrVersion<Ospfv3> for LsaHdr {
    const LENGTH: u16 = 20;

    fn new(
        age: u16,
        _options: Option<Options>,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
    ) -> Self {
        LsaHdr {
            age,
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
        let lsa_type = LsaType(buf.try_get_u16()?);
        let lsa_id = buf.try_get_ipv4()?;
        let adv_rtr = buf.try_get_ipv4()?;
        let seq_no = buf.try_get_u32()?;
        let cksum = buf.try_get_u16()?;
        let length = buf.try_get_u16()?;

        Ok(LsaHdr {
            age,
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
        buf.put_u16(self.lsa_type.0);
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
        None
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
    pub(crate) fn as_external(&self) -> Option<&LsaAsExternal> {
        match self {
            LsaBody::AsExternal(ext) | LsaBody::Nssa(ext) => Some(ext),
            _ => None,
        }
    }
}

impl LsaBodyVersion<Ospfv3> for LsaBody {
    fn decode(
        af: AddressFamily,
        lsa_type: LsaType,
        _lsa_id: Ipv4Addr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let lsa = match lsa_type.function_code() {
            Some(LsaFunctionCode::Router) => {
                LsaBody::Router(LsaRouter::decode(buf)?)
            }
            Some(LsaFunctionCode::Network) => {
                LsaBody::Network(LsaNetwork::decode(buf)?)
            }
            Some(LsaFunctionCode::InterAreaPrefix) => {
                LsaBody::InterAreaPrefix(LsaInterAreaPrefix::decode(af, buf)?)
            }
            Some(LsaFunctionCode::InterAreaRouter) => {
                LsaBody::InterAreaRouter(LsaInterAreaRouter::decode(buf)?)
            }
            Some(LsaFunctionCode::AsExternal) => {
                LsaBody::AsExternal(LsaAsExternal::decode(af, buf)?)
            }
            Some(LsaFunctionCode::Nssa) => {
                LsaBody::Nssa(LsaAsExternal::decode(af, buf)?)
            }
            Some(LsaFunctionCode::Link) => {
                LsaBody::Link(LsaLink::decode(af, buf)?)
            }
            Some(LsaFunctionCode::IntraAreaPrefix) => {
                LsaBody::IntraAreaPrefix(LsaIntraAreaPrefix::decode(af, buf)?)
            }
            Some(LsaFunctionCode::Grace) => {
                LsaBody::Grace(LsaGrace::decode(buf)?)
            }
            None => LsaBody::Unknown(LsaUnknown {
                data: buf.copy_to_bytes(buf.remaining()),
            }),
        };

        Ok(lsa)
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaBody::Router(lsa) => lsa.encode(buf),
            LsaBody::Network(lsa) => lsa.encode(buf),
            LsaBody::InterAreaPrefix(lsa) => lsa.encode(buf),
            LsaBody::InterAreaRouter(lsa) => lsa.encode(buf),
            LsaBody::AsExternal(lsa) => lsa.encode(buf),
            LsaBody::Nssa(lsa) => lsa.encode(buf),
            LsaBody::Link(lsa) => lsa.encode(buf),
            LsaBody::IntraAreaPrefix(lsa) => lsa.encode(buf),
            LsaBody::Grace(lsa) => lsa.encode(buf),
            LsaBody::Unknown(lsa) => buf.put_slice(&lsa.data),
        }
    }

    fn lsa_type(&self) -> LsaType {
        match self {
            LsaBody::Router(_) => LsaFunctionCode::Router.lsa_type(),
            LsaBody::Network(_) => LsaFunctionCode::Network.lsa_type(),
            LsaBody::InterAreaPrefix(_) => {
                LsaFunctionCode::InterAreaPrefix.lsa_type()
            }
            LsaBody::InterAreaRouter(_) => {
                LsaFunctionCode::InterAreaRouter.lsa_type()
            }
            LsaBody::AsExternal(_) => LsaFunctionCode::AsExternal.lsa_type(),
            LsaBody::Nssa(_) => LsaFunctionCode::Nssa.lsa_type(),
            LsaBody::Link(_) => LsaFunctionCode::Link.lsa_type(),
            LsaBody::IntraAreaPrefix(_) => {
                LsaFunctionCode::IntraAreaPrefix.lsa_type()
            }
            LsaBody::Grace(_) => LsaFunctionCode::Grace.lsa_type(),
            LsaBody::Unknown(_) => unreachable!(),
        }
    }

    fn is_unknown(&self) -> bool {
        matches!(self, LsaBody::Unknown(_))
    }

    fn validate(&self, _hdr: &LsaHdr) -> Result<(), LsaValidationError> {
        Ok(())
    }

    fn as_grace(&self) -> Option<(u32, GrReason, Option<Ipv6Addr>)> {
        let LsaBody::Grace(grace) = self else {
            return None;
        };
        let grace_period = grace.grace_period?;
        let gr_reason =
            GrReason::from_u8(grace.gr_reason?).unwrap_or(GrReason::Unknown);
        Some((grace_period, gr_reason, None))
    }
}

// ===== impl LsaRouter =====

impl LsaRouter {
    pub const BASE_LENGTH: u16 = 4;
    pub const LINK_LENGTH: u16 = 16;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let flags = LsaRouterFlags::from_bits_truncate(buf.try_get_u8()?);
        let options = Options::from_bits_truncate(buf.try_get_u24()? as u16);

        let mut links = vec![];
        while buf.remaining() >= Self::LINK_LENGTH as usize {
            let link_type = buf.try_get_u8()?;
            let link_type = LsaRouterLinkType::from_u8(link_type)
                .ok_or(DecodeError::UnknownRouterLinkType(link_type))?;
            let _ = buf.try_get_u8()?;
            let metric = buf.try_get_u16()?;
            let iface_id = buf.try_get_u32()?;
            let nbr_iface_id = buf.try_get_u32()?;
            let nbr_router_id = buf.try_get_ipv4()?;

            let link = LsaRouterLink::new(
                link_type,
                metric,
                iface_id,
                nbr_iface_id,
                nbr_router_id,
            );
            links.push(link);
        }

        Ok(LsaRouter {
            flags,
            options,
            links,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.bits());
        buf.put_u24(self.options.bits() as u32);
        for link in &self.links {
            buf.put_u8(link.link_type as u8);
            buf.put_u8(0);
            buf.put_u16(link.metric);
            buf.put_u32(link.iface_id);
            buf.put_u32(link.nbr_iface_id);
            buf.put_ipv4(&link.nbr_router_id);
        }
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
        let _ = buf.try_get_u8()?;
        let options = Options::from_bits_truncate(buf.try_get_u24()? as u16);

        let mut attached_rtrs = BTreeSet::new();
        let rtrs_cnt = buf.remaining() / 4;
        for _ in 0..rtrs_cnt {
            let rtr = buf.try_get_ipv4()?;
            attached_rtrs.insert(rtr);
        }

        Ok(LsaNetwork {
            options,
            attached_rtrs,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
        buf.put_u24(self.options.bits() as u32);
        for rtr in &self.attached_rtrs {
            buf.put_ipv4(rtr);
        }
    }
}

// ===== impl LsaInterAreaPrefix =====

impl LsaInterAreaPrefix {
    pub const BASE_LENGTH: u16 = 8;

    fn decode(af: AddressFamily, buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let metric = buf.try_get_u24()?;
        let plen = buf.try_get_u8()?;
        let prefix_options =
            PrefixOptions::from_bits_truncate(buf.try_get_u8()?);
        let _ = buf.try_get_u16()?;
        let prefix = decode_prefix(af, plen, buf)?;

        Ok(LsaInterAreaPrefix {
            metric,
            prefix_options,
            prefix,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
        buf.put_u24(self.metric);
        buf.put_u8(self.prefix.prefix());
        buf.put_u8(self.prefix_options.bits());
        buf.put_u16(0);
        encode_prefix(&self.prefix, buf);
    }
}

// ===== impl LsaInterAreaRouter =====

impl LsaInterAreaRouter {
    pub const BASE_LENGTH: u16 = 12;

    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let options = Options::decode(buf)?;
        let metric = buf.try_get_u32()? & 0x00ffffff;
        let router_id = buf.try_get_ipv4()?;

        Ok(LsaInterAreaRouter {
            options,
            metric,
            router_id,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
        self.options.encode(buf);
        buf.put_u32(self.metric & 0x00ffffff);
        buf.put_ipv4(&self.router_id);
    }
}

// ===== impl LsaAsExternal =====

impl LsaAsExternal {
    pub const BASE_LENGTH: u16 = 8;

    fn decode(af: AddressFamily, buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let flags = LsaAsExternalFlags::from_bits_truncate(buf.try_get_u8()?);
        let metric = buf.try_get_u24()?;
        let plen = buf.try_get_u8()?;
        let prefix_options =
            PrefixOptions::from_bits_truncate(buf.try_get_u8()?);
        let ref_lsa_type = buf.try_get_u16()?;
        let ref_lsa_type =
            (ref_lsa_type != 0).then_some(LsaType(ref_lsa_type));
        let prefix = decode_prefix(af, plen, buf)?;
        let fwd_addr = if flags.contains(LsaAsExternalFlags::F) {
            let addr = match af {
                AddressFamily::Ipv6 => IpAddr::V6(buf.try_get_ipv6()?),
                AddressFamily::Ipv4 => IpAddr::V4(buf.try_get_ipv4()?),
            };
            Some(addr)
        } else {
            None
        };
        let tag = if flags.contains(LsaAsExternalFlags::T) {
            Some(buf.try_get_u32()?)
        } else {
            None
        };
        let ref_lsa_id = if ref_lsa_type.is_some() {
            Some(buf.try_get_ipv4()?)
        } else {
            None
        };

        Ok(LsaAsExternal {
            flags,
            metric,
            prefix_options,
            prefix,
            fwd_addr,
            tag,
            ref_lsa_type,
            ref_lsa_id,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.bits());
        buf.put_u24(self.metric);
        buf.put_u8(self.prefix.prefix());
        buf.put_u8(self.prefix_options.bits());
        buf.put_u16(self.ref_lsa_type.map(|t| t.0).unwrap_or(0));
        encode_prefix(&self.prefix, buf);
        if let Some(fwd_addr) = &self.fwd_addr {
            buf.put_ip(fwd_addr);
        }
        if let Some(tag) = self.tag {
            buf.put_u32(tag);
        }
        if let Some(ref_lsa_id) = &self.ref_lsa_id {
            buf.put_ipv4(ref_lsa_id);
        }
    }
}

// ===== impl LsaLink =====

impl LsaLink {
    pub const BASE_LENGTH: u16 = 24;

    fn decode(af: AddressFamily, buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let priority = buf.try_get_u8()?;
        let options = Options::from_bits_truncate(buf.try_get_u24()? as u16);
        let linklocal = match af {
            AddressFamily::Ipv6 => IpAddr::V6(buf.try_get_ipv6()?),
            AddressFamily::Ipv4 => IpAddr::V4(buf.try_get_ipv4()?),
        };
        let prefixes_cnt = buf.try_get_u32()?;

        let mut prefixes = vec![];
        for _ in 0..prefixes_cnt {
            let plen = buf.try_get_u8()?;
            let options = PrefixOptions::from_bits_truncate(buf.try_get_u8()?);
            let _ = buf.try_get_u16()?;
            let value = decode_prefix(af, plen, buf)?;
            prefixes.push(LsaLinkPrefix::new(options, value));
        }

        Ok(LsaLink {
            priority,
            options,
            linklocal,
            prefixes,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.priority);
        buf.put_u24(self.options.bits() as u32);
        buf.put_ip(&self.linklocal);
        buf.put_u32(self.prefixes.len() as u32);
        for prefix in &self.prefixes {
            buf.put_u8(prefix.value.prefix());
            buf.put_u8(prefix.options.bits());
            buf.put_u16(0);
            encode_prefix(&prefix.value, buf);
        }
    }
}

// ===== impl LsaIntraAreaPrefix =====

impl LsaIntraAreaPrefix {
    pub const BASE_LENGTH: u16 = 12;

    fn decode(af: AddressFamily, buf: &mut Bytes) -> DecodeResult<Self> {
        if buf.remaining() < Self::BASE_LENGTH as usize {
            return Err(DecodeError::InvalidLsaLength);
        }
        let prefixes_cnt = buf.try_get_u16()?;
        let ref_lsa_type = LsaType(buf.try_get_u16()?);
        let ref_lsa_id = buf.try_get_ipv4()?;
        let ref_adv_rtr = buf.try_get_ipv4()?;

        let mut prefixes = vec![];
        for _ in 0..prefixes_cnt {
            let plen = buf.try_get_u8()?;
            let options = PrefixOptions::from_bits_truncate(buf.try_get_u8()?);
            let metric = buf.try_get_u16()?;
            let value = decode_prefix(af, plen, buf)?;
            prefixes.push(LsaIntraAreaPrefixEntry::new(options, value, metric));
        }

        Ok(LsaIntraAreaPrefix {
            ref_lsa_type,
            ref_lsa_id,
            ref_adv_rtr,
            prefixes,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.prefixes.len() as u16);
        buf.put_u16(self.ref_lsa_type.0);
        buf.put_ipv4(&self.ref_lsa_id);
        buf.put_ipv4(&self.ref_adv_rtr);
        for prefix in &self.prefixes {
            buf.put_u8(prefix.value.prefix());
            buf.put_u8(prefix.options.bits());
            buf.put_u16(prefix.metric);
            encode_prefix(&prefix.value, buf);
        }
    }
}

// ===== impl LsaGrace =====

impl LsaGrace {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let mut grace = LsaGrace::default();

        while buf.remaining() >= 4 {
            let tlv_type = buf.try_get_u16()?;
            let tlv_len = buf.try_get_u16()?;
            let tlv_wlen = tlv_len.div_ceil(4) * 4;
            if tlv_wlen as usize > buf.remaining() {
                break;
            }
            let mut tlv_buf = buf.copy_to_bytes(tlv_wlen as usize);

            match GraceTlvType::from_u16(tlv_type) {
                Some(GraceTlvType::GracePeriod) => {
                    grace.grace_period = Some(tlv_buf.try_get_u32()?);
                }
                Some(GraceTlvType::GrReason) => {
                    grace.gr_reason = Some(tlv_buf.try_get_u8()?);
                }
                None => (),
            }
        }

        Ok(grace)
    }

    fn encode(&self, buf: &mut BytesMut) {
        if let Some(grace_period) = self.grace_period {
            buf.put_u16(GraceTlvType::GracePeriod as u16);
            buf.put_u16(4);
            buf.put_u32(grace_period);
        }
        if let Some(gr_reason) = self.gr_reason {
            buf.put_u16(GraceTlvType::GrReason as u16);
            buf.put_u16(1);
            buf.put_u8(gr_reason);
            buf.put_slice(&[0; 3]);
        }
    }
}

// ===== impl PrefixOptions =====

impl PrefixOptionsVersion for PrefixOptions {}

// ===== impl Ospfv3 =====

impl LsaVersion<Self> for Ospfv3 {
    type LsaType = LsaType;
    type LsaHdr = LsaHdr;
    type LsaBody = LsaBody;
    type LsaRouterFlags = LsaRouterFlags;
    type LsaRouterLink = LsaRouterLink;
    type PrefixOptions = PrefixOptions;

    fn type3_summary() -> LsaType {
        LsaFunctionCode::InterAreaPrefix.lsa_type()
    }

    fn type4_summary() -> LsaType {
        LsaFunctionCode::InterAreaRouter.lsa_type()
    }

    fn type5_external() -> LsaType {
        LsaFunctionCode::AsExternal.lsa_type()
    }

    fn type7_nssa() -> LsaType {
        LsaFunctionCode::Nssa.lsa_type()
    }
}

// ===== helper functions =====

// Decodes an OSPFv3 address prefix: the address bits are encoded in
// (PrefixLength + 31) / 32 32-bit words.
fn decode_prefix(
    af: AddressFamily,
    plen: u8,
    buf: &mut Bytes,
) -> DecodeResult<IpNetwork> {
    let plen_wire = prefix_wire_len(plen);
    if buf.remaining() < plen_wire {
        return Err(DecodeError::InvalidIpPrefix);
    }

    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes[..plen_wire]);

    let prefix = match af {
        AddressFamily::Ipv6 => {
            if plen > 128 {
                return Err(DecodeError::InvalidIpPrefix);
            }
            IpNetwork::new(IpAddr::V6(Ipv6Addr::from(bytes)), plen)
        }
        AddressFamily::Ipv4 => {
            if plen > 32 {
                return Err(DecodeError::InvalidIpPrefix);
            }
            let mut addr = [0u8; 4];
            addr.copy_from_slice(&bytes[..4]);
            IpNetwork::new(IpAddr::V4(Ipv4Addr::from(addr)), plen)
        }
    };

    prefix.map_err(|_| DecodeError::InvalidIpPrefix)
}

fn encode_prefix(prefix: &IpNetwork, buf: &mut BytesMut) {
    let plen_wire = prefix_wire_len(prefix.prefix());
    match prefix.ip() {
        IpAddr::V4(addr) => {
            buf.put_slice(&addr.octets()[..plen_wire.min(4)]);
            if plen_wire > 4 {
                buf.put_slice(&[0; 12][..plen_wire - 4]);
            }
        }
        IpAddr::V6(addr) => {
            buf.put_slice(&addr.octets()[..plen_wire]);
        }
    }
}

// Number of bytes used to encode a prefix of the given length.
fn prefix_wire_len(plen: u8) -> usize {
    (plen as usize).div_ceil(32) * 4
}
