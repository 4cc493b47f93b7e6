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

//! Energy estimation from time spent in processor and radio states

use crate::*;

pub use experiment_api::Energest;

/// Counters at the time of the previous report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnergestBaseline {
    previous: Energest,
}

impl EnergestBaseline {
    /// Difference between `now` and the previous report, `now` becomes the new baseline
    pub fn report(&mut self, now: Energest, sequence: u16) -> EnergestMsg {
        let previous = core::mem::replace(&mut self.previous, now);
        EnergestMsg {
            cpu: now.cpu.wrapping_sub(previous.cpu),
            lpm: now.lpm.wrapping_sub(previous.lpm),
            transmit: now.transmit.wrapping_sub(previous.transmit),
            listen: now.listen.wrapping_sub(previous.listen),
            sequence,
            total_time: now.total.wrapping_sub(previous.total),
        }
    }
}

/// Which events trigger an energest report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnergestCadence {
    Never,
    /// Every `n`th event, counted from 1
    Every(u32),
}

impl EnergestCadence {
    pub fn is_due(&self, count: u32) -> bool {
        match self {
            EnergestCadence::Never => false,
            EnergestCadence::Every(n) => *n != 0 && count % n == 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProcessorState {
    Cpu,
    Lpm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    Off,
    Listen,
    Transmit,
}

/// Energest counters in milliseconds for platforms that do not keep them
///
/// The owner reports every state change together with the current time.
#[derive(Debug, Clone)]
pub struct EnergestMeter {
    counters: Energest,
    processor: ProcessorState,
    radio: RadioState,
    since: TimeMs,
    start: TimeMs,
}

impl EnergestMeter {
    pub fn new(now: TimeMs) -> Self {
        Self {
            counters: Energest::default(),
            processor: ProcessorState::Cpu,
            radio: RadioState::Off,
            since: now,
            start: now,
        }
    }

    fn account(&mut self, now: TimeMs) {
        let elapsed = now.saturating_sub(self.since) as u32;
        let counters = &mut self.counters;
        match self.processor {
            ProcessorState::Cpu => counters.cpu = counters.cpu.wrapping_add(elapsed),
            ProcessorState::Lpm => counters.lpm = counters.lpm.wrapping_add(elapsed),
        }
        match self.radio {
            RadioState::Off => {}
            RadioState::Listen => counters.listen = counters.listen.wrapping_add(elapsed),
            RadioState::Transmit => counters.transmit = counters.transmit.wrapping_add(elapsed),
        }
        self.since = self.since.max(now);
    }

    pub fn set_processor(&mut self, state: ProcessorState, now: TimeMs) {
        self.account(now);
        self.processor = state;
    }

    pub fn set_radio(&mut self, state: RadioState, now: TimeMs) {
        self.account(now);
        self.radio = state;
    }

    pub fn snapshot(&mut self, now: TimeMs) -> Energest {
        self.account(now);
        Energest {
            total: now.saturating_sub(self.start) as u32,
            ..self.counters
        }
    }
}
