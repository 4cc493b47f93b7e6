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

use crate::*;

/// Counters a role keeps across states
#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) sequence: SequenceCounter,
    /// Test messages sent
    pub(crate) sent: u32,
    /// Frames received, truncated to 16 bits where it goes on the wire or into a record
    pub(crate) received: u32,
    pub(crate) energest: EnergestBaseline,
    pub(crate) samples: SampleAccumulator,
    /// Time of the previous observation
    pub(crate) last_report: TimeMs,
}

impl Context {
    pub(crate) fn new(sequence_width: u8) -> Self {
        Self {
            sequence: SequenceCounter::new(sequence_width),
            sent: 0,
            received: 0,
            energest: EnergestBaseline::default(),
            samples: SampleAccumulator::default(),
            last_report: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.sequence.width());
    }
}

/// Sum of ADC samples between two observations
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SampleAccumulator {
    pub(crate) sum: u32,
    pub(crate) count: u16,
}

impl SampleAccumulator {
    pub(crate) fn add(&mut self, value: u16) {
        self.sum = self.sum.wrapping_add(value as u32);
        self.count = self.count.wrapping_add(1);
    }

    /// Returns the accumulated values and starts over
    pub(crate) fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}
