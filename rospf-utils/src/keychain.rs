//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::crypto::CryptoAlgo;

// Type aliases.
pub type Keychains = BTreeMap<String, Arc<Keychain>>;

// A named, rotating set of authentication keys.
#[derive(Clone, Debug, new)]
#[derive(Deserialize, Serialize)]
pub struct Keychain {
    pub name: String,
    // When the chain last changed.
    #[new(default)]
    pub last_modified: Option<DateTime<Utc>>,
    // Largest digest produced by any configured key.
    #[new(default)]
    pub max_digest_size: u8,
    #[new(default)]
    pub keys: BTreeMap<u64, KeychainKey>,
}

// One key of a chain, with its validity windows.
#[derive(Clone, Debug, new)]
#[derive(Deserialize, Serialize)]
pub struct KeychainKey {
    pub data: Key,
    // When the key may sign outgoing packets.
    #[new(default)]
    pub send_lifetime: KeyLifetime,
    // When the key may validate incoming packets.
    #[new(default)]
    pub accept_lifetime: KeyLifetime,
}

// Key material and algorithm.
#[derive(Clone, Debug, new)]
#[derive(Deserialize, Serialize)]
pub struct Key {
    pub id: u64,
    pub algo: CryptoAlgo,
    pub string: Vec<u8>,
}

// Key lifetime.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct KeyLifetime {
    // Optional start time.
    pub start: Option<DateTime<FixedOffset>>,
    // Optional end time (`None` means infinite).
    pub end: Option<DateTime<FixedOffset>>,
}

// ===== impl Keychain =====

impl Keychain {
    // Recomputes the maximum digest size among all keys.
    pub fn update_max_digest_size(&mut self) {
        self.max_digest_size = self
            .keys
            .values()
            .map(|key| key.data.algo.digest_size())
            .max()
            .unwrap_or(0);
    }

    // Looks up the key used to send a packet. The first key with a valid
    // lifetime will be selected.
    pub fn key_lookup_send(&self) -> Option<&Key> {
        self.keys
            .values()
            .find(|key| key.send_lifetime.is_active())
            .map(|key| &key.data)
    }

    // Looks up the key used to accept a packet. The first key of the provided
    // key ID with a valid lifetime will be selected.
    pub fn key_lookup_accept(&self, key_id: u64) -> Option<&Key> {
        self.keys
            .values()
            .find(|key| key.data.id == key_id)
            .filter(|key| key.accept_lifetime.is_active())
            .map(|key| &key.data)
    }
}

// ===== impl KeyLifetime =====

impl KeyLifetime {
    // Checks if the key lifetime is currently active.
    pub fn is_active(&self) -> bool {
        let now = Utc::now();

        if let Some(start) = self.start
            && now < start
        {
            return false;
        }
        if let Some(end) = self.end
            && now > end
        {
            return false;
        }

        true
    }
}
