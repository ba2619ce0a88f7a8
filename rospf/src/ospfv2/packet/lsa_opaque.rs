//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use rospf_utils::bytes::{BytesExt, BytesMutExt};
use serde::{Deserialize, Serialize};

use crate::packet::error::DecodeResult;

// OSPFv2 opaque LSA types.
//
// IANA registry:
// https://www.iana.org/assignments/ospf-opaque-types/ospf-opaque-types.xhtml#ospf-opaque-types-2
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaOpaqueType {
    Grace = 3,
}

// OSPFv2 opaque LSA.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaOpaque {
    Grace(LsaGrace),
    Unknown(LsaUnknownOpaque),
}

// Decomposed opaque LSA ID: the first octet of the Link State ID carries
// the opaque type and the remaining three the opaque ID.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct OpaqueLsaId {
    pub opaque_type: u8,
    pub opaque_id: u32,
}

//
// Grace-LSA (RFC 3623).
//
// TLVs: Grace Period (1), Graceful Restart Reason (2), IP Interface
// Address (3).
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaGrace {
    pub grace_period: Option<u32>,
    pub gr_reason: Option<u8>,
    pub addr: Option<Ipv4Addr>,
    pub unknown_tlvs: Vec<UnknownTlv>,
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum GraceTlvType {
    GracePeriod = 1,
    GrReason = 2,
    InterfaceAddr = 3,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct UnknownTlv {
    pub tlv_type: u16,
    pub length: u16,
    pub value: Bytes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaUnknownOpaque {
    pub data: Bytes,
}

// TLV header size (type + length).
const TLV_HDR_SIZE: u16 = 4;

// ===== impl LsaOpaque =====

impl LsaOpaque {
    pub(crate) fn decode(
        lsa_id: Ipv4Addr,
        buf: &mut Bytes,
    ) -> DecodeResult<Self> {
        let opaque_lsa_id = OpaqueLsaId::from(lsa_id);
        let opaque = match LsaOpaqueType::from_u8(opaque_lsa_id.opaque_type) {
            Some(LsaOpaqueType::Grace) => {
                LsaOpaque::Grace(LsaGrace::decode(buf)?)
            }
            None => {
                // Retain the body un-decoded so the LSA can be stored and
                // reflooded (RFC 5250 demands unknown opaque types to be
                // treated as data).
                LsaOpaque::Unknown(LsaUnknownOpaque {
                    data: buf.copy_to_bytes(buf.remaining()),
                })
            }
        };

        Ok(opaque)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            LsaOpaque::Grace(grace) => grace.encode(buf),
            LsaOpaque::Unknown(unknown) => {
                buf.put_slice(&unknown.data);
            }
        }
    }
}

// ===== impl LsaGrace =====

impl LsaGrace {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let mut grace = LsaGrace::default();

        while buf.remaining() >= TLV_HDR_SIZE as usize {
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
                Some(GraceTlvType::InterfaceAddr) => {
                    grace.addr = Some(tlv_buf.try_get_ipv4()?);
                }
                None => {
                    grace.unknown_tlvs.push(UnknownTlv::new(
                        tlv_type, tlv_len, tlv_buf,
                    ));
                }
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
            // TLVs are padded to a four-octet alignment.
            buf.put_slice(&[0; 3]);
        }
        if let Some(addr) = self.addr {
            buf.put_u16(GraceTlvType::InterfaceAddr as u16);
            buf.put_u16(4);
            buf.put_ipv4(&addr);
        }
    }
}

// ===== impl OpaqueLsaId =====

impl From<Ipv4Addr> for OpaqueLsaId {
    fn from(lsa_id: Ipv4Addr) -> OpaqueLsaId {
        let lsa_id: u32 = lsa_id.into();
        OpaqueLsaId {
            opaque_type: (lsa_id >> 24) as u8,
            opaque_id: lsa_id & 0x00ffffff,
        }
    }
}

impl From<OpaqueLsaId> for Ipv4Addr {
    fn from(opaque_lsa_id: OpaqueLsaId) -> Ipv4Addr {
        let lsa_id: u32 = ((opaque_lsa_id.opaque_type as u32) << 24)
            | (opaque_lsa_id.opaque_id & 0x00ffffff);
        lsa_id.into()
    }
}
