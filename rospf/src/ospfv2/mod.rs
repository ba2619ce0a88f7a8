//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

pub mod area;
pub mod instance;
pub mod interface;
pub mod lsdb;
pub mod neighbor;
pub mod packet;
pub mod spf;
