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

#![cfg_attr(not(test), no_std)]

use core::fmt::Display;

use rand_core::RngCore;

/// A role's action
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action<TIME, FRAME, CHANNEL, NODE> {
    /// Do nothing, call `progress` again right away
    None,
    /// Sleep until `end`. GPIO edges still wake the node up.
    Wait { end: TIME },
    /// Listen for packets until `end`, forever when `end` is `None`. GPIO edges still wake the
    /// node up.
    Receive { end: Option<TIME> },
    /// Drive `value` onto the parallel bus, then move the strobe line
    Signal { value: u16 },
    /// Read the analog input, the result is expected as [`Input::Sample`]
    Sample,
    /// Read the energest counters, the result is expected as [`Input::Energest`]
    ReadEnergest,
    /// Send frame, best effort
    Transmit {
        channel: CHANNEL,
        destination: Destination<NODE>,
        frame: FRAME,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Destination<NODE> {
    Unicast(NODE),
    Broadcast,
}

impl<NODE: PartialEq> Destination<NODE> {
    /// Whether a frame sent to this destination is meant for `node`
    pub fn accepts(&self, node: &NODE) -> bool {
        match self {
            Destination::Unicast(n) => n == node,
            Destination::Broadcast => true,
        }
    }
}

/// Something that happened to the node since the last call to `progress`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Input<FRAME, CHANNEL, NODE> {
    /// Frame received from the radio
    Packet {
        source: NODE,
        channel: CHANNEL,
        frame: FRAME,
        /// Link layer receive timestamp
        link_timestamp: u16,
    },
    /// Edge on the strobe line, `value` is what was read from the parallel bus
    Strobe { value: u16 },
    /// Analog input reading
    Sample { value: u16 },
    Energest(Energest),
}

/// Cumulative time-in-state counters of a node
///
/// All counters wrap around, differences must be computed with wrapping arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Energest {
    pub cpu: u32,
    pub lpm: u32,
    pub transmit: u32,
    pub listen: u32,
    /// Free running high resolution clock
    pub total: u32,
}

pub trait RoleRecord<R: Role + ?Sized> {
    fn get_source(&self) -> R::NodeId;
}

pub trait Role {
    type TimeMs: Copy + Eq + Ord;
    type NodeId: Copy + Eq;
    type Channel: Copy + Eq;
    type Frame: Clone;
    type Record: Clone + Display + RoleRecord<Self>;

    /// Make progress in state machine
    ///
    /// Returns the action to execute and a console record if the node is a sink. This function
    /// must be called again after the returned action has been executed.
    #[must_use]
    #[allow(clippy::type_complexity)]
    fn progress<T: RngCore>(
        &mut self,
        time: Self::TimeMs,
        input: Option<Input<Self::Frame, Self::Channel, Self::NodeId>>,
        rng: T,
    ) -> (
        Action<Self::TimeMs, Self::Frame, Self::Channel, Self::NodeId>,
        Option<Self::Record>,
    );

    /// Get the node's ID
    fn id(&self) -> Self::NodeId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_accepts() {
        assert!(Destination::Unicast(3u8).accepts(&3));
        assert!(!Destination::Unicast(3u8).accepts(&4));
        assert!(Destination::<u8>::Broadcast.accepts(&4));
    }
}
