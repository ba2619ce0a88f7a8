//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use derive_new::new;
use hmac::{Hmac, Mac};
use rospf_utils::crypto::{CryptoAlgo, CryptoProtocolId, HMAC_APAD};
use rospf_utils::ip::IpAddrExt;
use rospf_utils::keychain::{Key, Keychain};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

// How packets are authenticated on an interface: a single configured key,
// or a key-chain whose keys rotate through their configured lifetimes.
#[derive(Clone, Debug)]
pub enum AuthMethod {
    ManualKey(Key),
    Keychain(Arc<Keychain>),
}

#[derive(Clone, Copy, Debug, new)]
pub struct AuthEncodeCtx<'a> {
    // Key used to sign the outgoing packet.
    pub key: &'a Key,
    // Shared non-decreasing sequence number.
    pub seqno: &'a Arc<AtomicU64>,
    // Source address of the outgoing packet.
    pub src_addr: IpAddr,
}

#[derive(Clone, Debug, new)]
pub struct AuthDecodeCtx<'a> {
    // Configured authentication method.
    pub method: &'a AuthMethod,
    // Source address of the received packet.
    pub src_addr: IpAddr,
}

// Computes an HMAC over `data` with the given hash, finishing with the
// Apad constant. RFC 7474 (OSPFv2) and RFC 7166 (OSPFv3) both seed the
// first octets of Apad with the packet's IP source address.
macro_rules! hmac_compute {
    ($hash:ty, $data:expr, $key:expr, $src:expr) => {{
        let mut mac = Hmac::<$hash>::new_from_slice($key).unwrap();
        mac.update($data);
        let digest_size = <<$hash as hmac::digest::core_api::CoreProxy>::Core
            as hmac::digest::OutputSizeUser>::output_size();
        match $src {
            Some(addr) => {
                let addr: &IpAddr = addr;
                match addr {
                    IpAddr::V4(addr) => mac.update(&addr.octets()),
                    IpAddr::V6(addr) => mac.update(&addr.octets()),
                }
                mac.update(&HMAC_APAD[..digest_size - addr.length()]);
            }
            None => {
                mac.update(&HMAC_APAD[..digest_size]);
            }
        }
        mac.finalize().into_bytes().to_vec()
    }};
}

// ===== helper functions =====

// RFC 5709-style keyed MD5: hash the packet followed by the key padded
// out to the digest size.
fn md5_digest(data: &[u8], key: &[u8]) -> Vec<u8> {
    let mut key = key.to_vec();
    key.resize(16, 0);

    use md5::{Digest, Md5};

    let mut ctx = Md5::new();
    ctx.update(data);
    ctx.update(&key);
    ctx.finalize().to_vec()
}

// ===== global functions =====

// Computes the authentication digest for a packet. `proto_id` is the
// cryptographic protocol identifier appended to the key to defeat
// cross-protocol replay (OSPFv3 only); `src` selects the Apad seeding.
pub(crate) fn message_digest(
    data: &[u8],
    algo: CryptoAlgo,
    key: &[u8],
    proto_id: Option<CryptoProtocolId>,
    src: Option<&IpAddr>,
) -> Vec<u8> {
    // Keyed MD5 ignores the protocol ID and Apad machinery.
    if algo == CryptoAlgo::Md5 {
        return md5_digest(data, key);
    }

    // Append the protocol ID to the key material when requested.
    let key_proto;
    let key = match proto_id {
        Some(proto_id) => {
            key_proto = [key, &(proto_id as u16).to_be_bytes()].concat();
            key_proto.as_slice()
        }
        None => key,
    };

    match algo {
        CryptoAlgo::Md5 => unreachable!(),
        CryptoAlgo::HmacSha1 => hmac_compute!(Sha1, data, key, src),
        CryptoAlgo::HmacSha256 => hmac_compute!(Sha256, data, key, src),
        CryptoAlgo::HmacSha384 => hmac_compute!(Sha384, data, key, src),
        CryptoAlgo::HmacSha512 => hmac_compute!(Sha512, data, key, src),
    }
}
