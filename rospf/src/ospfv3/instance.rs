//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::time::{SystemTime, UNIX_EPOCH};

use rospf_utils::ip::AddressFamily;

use crate::instance::{Instance, InstanceVersion};
use crate::version::Ospfv3;

// ===== impl Ospfv3 =====

impl InstanceVersion<Self> for Ospfv3 {
    // OSPFv3 uses a 64-bit authentication sequence number, which must be
    // strictly increasing (RFC 7166).
    const STRICT_AUTH_SEQNO_CHECK: bool = true;

    fn address_family(instance: &Instance<Self>) -> AddressFamily {
        // Instance IDs in the range 64-95 identify IPv4 address family
        // instances (RFC 5838).
        let ipv4_af = instance
            .arenas
            .interfaces
            .iter()
            .all(|(_, iface)| (64..96).contains(&iface.config.instance_id));
        if !instance.arenas.interfaces.is_empty() && ipv4_af {
            AddressFamily::Ipv4
        } else {
            AddressFamily::Ipv6
        }
    }

    fn initial_auth_seqno() -> u64 {
        // Seconds since the epoch keep the sequence number monotonic across
        // restarts without non-volatile storage.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() << 16)
            .unwrap_or(0)
    }
}
