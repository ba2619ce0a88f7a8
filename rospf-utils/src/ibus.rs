//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::keychain::Keychain;
use crate::southbound::{
    AddressMsg, InterfaceUpdateMsg, RouteKeyMsg, RouteMsg,
    RouteRedistributeMsg,
};
use crate::{UnboundedReceiver, UnboundedSender};

// Type aliases.
pub type IbusReceiver = UnboundedReceiver<IbusMsg>;
pub type IbusSender = UnboundedSender<IbusMsg>;

// Bus messages exchanged with the collaborating daemons: the interface
// state mirror, the key-chain manager, the redistribution source and the
// RIB.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum IbusMsg {
    InterfaceUpd(InterfaceUpdateMsg),
    InterfaceAddressAdd(AddressMsg),
    InterfaceAddressDel(AddressMsg),
    RouterIdUpdate(Option<Ipv4Addr>),
    KeychainUpd(Arc<Keychain>),
    KeychainDel(String),
    RouteRedistributeAdd(RouteRedistributeMsg),
    RouteRedistributeDel(RouteKeyMsg),
    RouteIpAdd(RouteMsg),
    RouteIpDel(RouteKeyMsg),
}
