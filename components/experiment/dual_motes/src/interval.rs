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

/// Time between two test messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendInterval {
    pub average_ms: TimeMs,
    /// Lower bound of a jittered delay
    pub min_ms: TimeMs,
    pub jitter: bool,
}

impl Default for SendInterval {
    fn default() -> Self {
        Self {
            average_ms: 1000,
            // one clock tick at 128 Hz
            min_ms: 8,
            jitter: false,
        }
    }
}

impl SendInterval {
    /// Width of the jitter window, the mean delay of a jittered interval is `average_ms`
    pub fn range_ms(&self) -> TimeMs {
        2 * self.average_ms.saturating_sub(self.min_ms)
    }

    pub fn next_delay(&self, mut rng: impl RngCore) -> TimeMs {
        if !self.jitter {
            return self.average_ms;
        }
        let range = self.range_ms();
        if range == 0 {
            return self.min_ms;
        }
        self.min_ms + (range + rng.next_u32() as TimeMs) % range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::OsRng as Rng;

    #[test]
    fn fixed_interval() {
        let interval = SendInterval {
            average_ms: 250,
            ..Default::default()
        };
        assert_eq!(interval.next_delay(Rng), 250);
    }

    #[test]
    fn jitter_stays_in_window() {
        let interval = SendInterval {
            average_ms: 1000,
            min_ms: 8,
            jitter: true,
        };
        assert_eq!(interval.range_ms(), 1984);
        for _ in 0..1000 {
            let delay = interval.next_delay(Rng);
            assert!((8..8 + 1984).contains(&delay));
        }
    }

    #[test]
    fn jitter_follows_rng() {
        let interval = SendInterval {
            average_ms: 20,
            min_ms: 10,
            jitter: true,
        };
        let mut rng = StepRng::new(0, 1);
        let delays: std::vec::Vec<_> = (0..21).map(|_| interval.next_delay(&mut rng)).collect();
        assert_eq!(delays[0], 10);
        assert_eq!(delays[19], 29);
        assert_eq!(delays[20], 10);
    }

    #[test]
    fn empty_jitter_window() {
        let interval = SendInterval {
            average_ms: 8,
            min_ms: 8,
            jitter: true,
        };
        assert_eq!(interval.next_delay(Rng), 8);
    }
}
