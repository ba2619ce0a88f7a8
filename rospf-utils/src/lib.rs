//
// Copyright (c) The Rospf Project Developers
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod bytes;
pub mod crypto;
pub mod ibus;
pub mod ip;
pub mod keychain;
pub mod protocol;
pub mod southbound;
pub mod task;

// Re-export commonly used channel types.
pub use tokio::sync::mpsc::{
    Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
