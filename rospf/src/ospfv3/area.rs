//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use crate::area::{Area, AreaType, AreaVersion, OptionsLocation};
use crate::ospfv3::packet::Options;
use crate::version::Ospfv3;

#[derive(Debug, Default)]
pub struct AreaState {
    // Next LSA-IDs used for originating inter-area LSAs, whose Link State
    // IDs carry no addressing semantics in OSPFv3.
    pub next_type3_lsa_id: u32,
    pub next_type4_lsa_id: u32,
}

// ===== impl Ospfv3 =====

impl AreaVersion<Self> for Ospfv3 {
    type State = AreaState;

    fn area_options(area: &Area<Self>, location: OptionsLocation) -> Options {
        let mut options = Options::R | Options::V6;

        if area.config.area_type == AreaType::Normal {
            options.insert(Options::E);
        }
        if area.config.area_type == AreaType::Nssa {
            options.insert(Options::N);
        }

        if let OptionsLocation::Packet { auth: true, .. } = location {
            options.insert(Options::AT);
        }

        options
    }
}
