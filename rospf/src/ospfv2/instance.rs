//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::{SystemTime, UNIX_EPOCH};

use rospf_utils::ip::AddressFamily;

use crate::instance::{Instance, InstanceVersion};
use crate::version::Ospfv2;

// ===== impl Ospfv2 =====

impl InstanceVersion<Self> for Ospfv2 {
    // OSPFv2 uses a 32-bit authentication sequence number carried in the
    // packet header, so equal sequence numbers are tolerated (RFC 5709
    // doesn't mandate strictly increasing values for retransmissions).
    const STRICT_AUTH_SEQNO_CHECK: bool = false;

    fn address_family(_instance: &Instance<Self>) -> AddressFamily {
        AddressFamily::Ipv4
    }

    fn initial_auth_seqno() -> u64 {
        // Seconds since the epoch keep the sequence number monotonic across
        // restarts without non-volatile storage.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
