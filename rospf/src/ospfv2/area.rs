//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use crate::area::{Area, AreaType, AreaVersion, OptionsLocation};
use crate::ospfv2::packet::Options;
use crate::packet::PacketType;
use crate::version::Ospfv2;

#[derive(Debug, Default)]
pub struct AreaState {}

// ===== impl Ospfv2 =====

impl AreaVersion<Self> for Ospfv2 {
    type State = AreaState;

    fn area_options(area: &Area<Self>, location: OptionsLocation) -> Options {
        let mut options = Options::empty();

        if area.config.area_type == AreaType::Normal {
            options.insert(Options::E);
        }
        if area.config.area_type == AreaType::Nssa {
            options.insert(Options::NP);
        }

        // The O-bit is not set in packets other than Database Description
        // packets.
        if let OptionsLocation::Packet {
            pkt_type: PacketType::DbDesc,
            ..
        } = location
        {
            options.insert(Options::O);
        }

        options
    }
}
