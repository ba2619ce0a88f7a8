//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Routing protocol identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Protocol {
    Direct,
    Static,
    Rip,
    Ospfv2,
    Ospfv3,
    Bgp,
}

// ===== impl Protocol =====

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Direct => write!(f, "direct"),
            Protocol::Static => write!(f, "static"),
            Protocol::Rip => write!(f, "rip"),
            Protocol::Ospfv2 => write!(f, "ospfv2"),
            Protocol::Ospfv3 => write!(f, "ospfv3"),
            Protocol::Bgp => write!(f, "bgp"),
        }
    }
}
