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

//! One state machine per role
//!
//! Content of a state is what is required to produce the state's action or information for the
//! following state. Each role's `next` implements the exit functionality of its states.

mod observer;
mod relay;
mod sender;
mod sink;

pub use crate::roles::{observer::Observer, relay::Relay, sender::Sender, sink::Sink};
