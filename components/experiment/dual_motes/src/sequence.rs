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

use crate::MAX_IO_WIDTH;

/// Sequence number that fits on a bus of `width` lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    value: u16,
    width: u8,
}

impl SequenceCounter {
    /// Starts at 0, the first value handed out by [`advance`](Self::advance) is 1
    pub fn new(width: u8) -> Self {
        assert!(
            (1..=MAX_IO_WIDTH as u8).contains(&width),
            "invalid sequence width {}",
            width
        );
        Self { value: 0, width }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn modulus(&self) -> u32 {
        1 << self.width
    }

    /// Largest value the counter can take
    pub fn mask(&self) -> u16 {
        (self.modulus() - 1) as u16
    }

    pub fn current(&self) -> u16 {
        self.value
    }

    /// Increment modulo `2^width` and return the new value
    pub fn advance(&mut self) -> u16 {
        self.value = ((self.value as u32 + 1) % self.modulus()) as u16;
        self.value
    }
}
