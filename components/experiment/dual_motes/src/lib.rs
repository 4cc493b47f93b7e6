//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

//! Roles of the dual-motes experiment
//!
//! An observed ("black") network sends numbered test messages. Every observed node passes the
//! sequence number of what it sent or received over a parallel GPIO bus to a co-located observer
//! ("white") node, which reports it together with its own energy measurement to a sink. Comparing
//! both networks' logs afterwards shows what the observed network actually did on air.

#![cfg_attr(not(test), no_std)]

use heapless::Vec;
use rand_core::RngCore;

use experiment_api::*;

pub mod bus;
mod config;
mod context;
use crate::context::*;
pub mod energest;
mod event_log;
mod interval;
mod message;
mod node;
use crate::node::*;
mod record;
mod roles;
mod sequence;

pub use crate::{
    config::*,
    energest::{EnergestBaseline, EnergestCadence, EnergestMeter, ProcessorState, RadioState},
    interval::SendInterval,
    message::*,
    node::Node,
    record::*,
    roles::{Observer, Relay, Sender, Sink},
    sequence::SequenceCounter,
};

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
use defmt::{debug, error, info, warn};

#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
use log::{debug, error, info, warn};

/// Time as milliseconds since start
pub type TimeMs = u64;
/// Node identifier, last byte of the node's address
pub type NodeId = u8;
/// Rime channel or UDP port a frame is sent on
pub type Channel = u16;
/// Raw payload of one radio frame
pub type Frame = Vec<u8, MAX_FRAME_SIZE>;

pub type DualMotesAction = Action<TimeMs, Frame, Channel, NodeId>;
pub type DualMotesInput = Input<Frame, Channel, NodeId>;

/// IEEE 802.15.4 maximum PSDU length
pub const MAX_FRAME_SIZE: usize = 127;
/// Maximum number of data lines of the parallel bus
pub const MAX_IO_WIDTH: usize = 16;

/// Wraps defmt::write and returns Ok() to make it behave like core::write!.
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! defmt_write_wrapper {
    ($($arg:expr),*) => {{
        defmt::write!($($arg),*);
        Ok(())
    }};
}
