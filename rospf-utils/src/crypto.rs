//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use serde::{Deserialize, Serialize};

// The Apad constant of RFC 5709/7166: 0x878FE1F3 repeated to the
// digest length. Sized here for the largest supported digest (SHA512,
// 64 bytes); shorter digests use a prefix.
pub static HMAC_APAD: Lazy<Vec<u8>> = Lazy::new(|| {
    [0x87, 0x8F, 0xE1, 0xF3]
        .into_iter()
        .cycle()
        .take(64)
        .collect()
});

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum CryptoAlgo {
    Md5,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

// Protocol-specific value mixed into the key to defeat cross-protocol
// replay.
//
// IANA registry:
// https://www.iana.org/assignments/authentication-cryptographic-protocol-id/authentication-cryptographic-protocol-id.xhtml
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum CryptoProtocolId {
    Ospfv3 = 0x01,
    Ospfv2 = 0x03,
}

// ===== impl CryptoAlgo =====

impl CryptoAlgo {
    pub fn digest_size(&self) -> u8 {
        match self {
            CryptoAlgo::Md5 => 16,
            CryptoAlgo::HmacSha1 => 20,
            CryptoAlgo::HmacSha256 => 32,
            CryptoAlgo::HmacSha384 => 48,
            CryptoAlgo::HmacSha512 => 64,
        }
    }
}

impl std::fmt::Display for CryptoAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoAlgo::Md5 => write!(f, "md5"),
            CryptoAlgo::HmacSha1 => write!(f, "hmac-sha-1"),
            CryptoAlgo::HmacSha256 => write!(f, "hmac-sha-256"),
            CryptoAlgo::HmacSha384 => write!(f, "hmac-sha-384"),
            CryptoAlgo::HmacSha512 => write!(f, "hmac-sha-512"),
        }
    }
}
