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

//! GPIO wires between co-located boards

use std::{cell::Cell, convert::Infallible, rc::Rc};

use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin},
};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use dual_motes::bus::{BusError, BusReader, BusWriter, Edge, PinId, PinTable, StrobeDiscipline};

#[derive(Debug, Default)]
struct Level {
    high: Cell<bool>,
    rising: Cell<u32>,
    falling: Cell<u32>,
}

/// One end of a wire, all clones see the same level
#[derive(Debug, Clone)]
pub struct SimPin {
    id: PinId,
    level: Rc<Level>,
}

impl SimPin {
    pub fn new(id: PinId) -> Self {
        Self {
            id,
            level: Rc::default(),
        }
    }

    fn set(&mut self, high: bool) {
        if self.level.high.replace(high) != high {
            let edges = if high {
                &self.level.rising
            } else {
                &self.level.falling
            };
            edges.set(edges.get().wrapping_add(1));
            trace!("{} {}", self.id, if high { "high" } else { "low" });
        }
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

impl StatefulOutputPin for SimPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level.high.get())
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level.high.get())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level.high.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level.high.get())
    }
}

/// Strobe pulses are much shorter than the simulation's time resolution
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Observing end of a bus, remembers which strobe edges it has already seen
pub struct BusTap {
    reader: BusReader<SimPin>,
    strobe: SimPin,
    edge: Edge,
    seen: (u32, u32),
}

impl BusTap {
    /// Whether the strobe moved in a way the observer reacts to since the last call
    pub fn strobed(&mut self) -> bool {
        let level = &self.strobe.level;
        let edges = (level.rising.get(), level.falling.get());
        let (rising, falling) = (edges.0 != self.seen.0, edges.1 != self.seen.1);
        self.seen = edges;
        match self.edge {
            Edge::Any => rising || falling,
            Edge::Rising => rising,
        }
    }

    pub fn read(&mut self) -> Result<u16, BusError<Infallible>> {
        self.reader.read()
    }
}

/// Name of line `i`, lines beyond the deployment table get made up names
fn pin_id(table: &PinTable, i: usize) -> PinId {
    table
        .data
        .get(i)
        .copied()
        .unwrap_or(PinId::new('X', i as u8))
}

/// Wires up `width` data lines and a strobe between two boards
pub fn connect(
    table: &PinTable,
    width: u8,
    discipline: StrobeDiscipline,
    edge: Edge,
) -> Result<(BusWriter<SimPin, SimPin>, BusTap), BusError<Infallible>> {
    let data: Vec<SimPin> = (0..width as usize)
        .map(|i| SimPin::new(pin_id(table, i)))
        .collect();
    let strobe = SimPin::new(table.strobe);
    let writer = BusWriter::new(data.clone(), strobe.clone(), discipline)?;
    let tap = BusTap {
        reader: BusReader::new(data)?,
        strobe,
        edge,
        seen: (0, 0),
    };
    Ok((writer, tap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dual_motes::bus::{BLACK_BUS, OBSERVED_BUS};

    #[test]
    fn toggled_strobe_reaches_tap() {
        let (mut writer, mut tap) =
            connect(&OBSERVED_BUS, 11, StrobeDiscipline::Toggle, Edge::Any).unwrap();
        assert!(!tap.strobed());
        for value in [5, 2047, 0] {
            writer.write(value, &mut NoDelay).unwrap();
            assert!(tap.strobed());
            assert!(!tap.strobed());
            assert_eq!(tap.read().unwrap(), value);
        }
    }

    #[test]
    fn rising_edge_only() {
        let (mut writer, mut tap) =
            connect(&OBSERVED_BUS, 11, StrobeDiscipline::Toggle, Edge::Rising).unwrap();
        writer.write(1, &mut NoDelay).unwrap();
        assert!(tap.strobed());
        writer.write(2, &mut NoDelay).unwrap();
        assert!(!tap.strobed());

        let (mut writer, mut tap) = connect(
            &BLACK_BUS,
            6,
            StrobeDiscipline::Pulse { width_us: 100 },
            Edge::Rising,
        )
        .unwrap();
        writer.write(63, &mut NoDelay).unwrap();
        assert!(tap.strobed());
        writer.write(62, &mut NoDelay).unwrap();
        assert!(tap.strobed());
        assert_eq!(tap.read().unwrap(), 62);
    }
}
