//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

mod ospfv2;
mod ospfv3;
