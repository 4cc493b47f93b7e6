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

//! Parallel GPIO bus between an observed node and its observer
//!
//! Bit `i` of a value is driven onto data line `i`, line 0 being the least significant bit. Once
//! all data lines are settled the strobe line is moved, which tells the observer to sample the
//! data lines.

use core::fmt::Display;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState, StatefulOutputPin};
use heapless::Vec;

use crate::MAX_IO_WIDTH;

/// Board name of a GPIO, e.g. `A6` is pin 6 of port A
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinId {
    pub port: char,
    pub pin: u8,
}

impl PinId {
    pub const fn new(port: char, pin: u8) -> Self {
        Self { port, pin }
    }
}

impl Display for PinId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}", self.port, self.pin)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PinId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}{}", self.port, self.pin)
    }
}

/// Wiring of a bus, `data[i]` carries bit `i`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinTable {
    pub data: &'static [PinId],
    pub strobe: PinId,
}

impl PinTable {
    pub fn width(&self) -> u8 {
        self.data.len() as u8
    }
}

/// 11 bit bus between the observed network's sender or relays and their observers
pub const OBSERVED_BUS: PinTable = PinTable {
    data: &[
        PinId::new('A', 6),
        PinId::new('C', 0),
        PinId::new('C', 1),
        PinId::new('C', 2),
        PinId::new('C', 3),
        PinId::new('C', 4),
        PinId::new('C', 5),
        PinId::new('C', 6),
        PinId::new('D', 0),
        PinId::new('D', 1),
        PinId::new('D', 2),
    ],
    strobe: PinId::new('A', 7),
};

/// 6 bit bus of the black receiver, its strobe is pulsed
pub const BLACK_BUS: PinTable = PinTable {
    data: &[
        PinId::new('C', 0),
        PinId::new('C', 1),
        PinId::new('C', 4),
        PinId::new('C', 5),
        PinId::new('D', 1),
        PinId::new('D', 2),
    ],
    strobe: PinId::new('A', 2),
};

/// How the strobe line announces a new value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StrobeDiscipline {
    /// Invert the strobe level
    #[default]
    Toggle,
    /// Drive the strobe high for `width_us`, then low again
    Pulse { width_us: u32 },
}

impl StrobeDiscipline {
    /// Strobe edges an observer must react to
    pub fn edge(&self) -> Edge {
        match self {
            StrobeDiscipline::Toggle => Edge::Any,
            StrobeDiscipline::Pulse { .. } => Edge::Rising,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    #[default]
    Any,
    Rising,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError<E> {
    /// GPIO driver failed
    Pin(E),
    NoPins,
    TooManyPins,
    /// Value has bits set above the bus width
    ValueOutOfRange { value: u16, width: u8 },
}

impl<E: core::fmt::Debug> Display for BusError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusError::Pin(e) => write!(f, "pin error: {:?}", e),
            BusError::NoPins => write!(f, "bus has no data pins"),
            BusError::TooManyPins => write!(f, "bus has more than {} data pins", MAX_IO_WIDTH),
            BusError::ValueOutOfRange { value, width } => {
                write!(f, "{} does not fit on a {} bit bus", value, width)
            }
        }
    }
}

/// Largest value a bus of `width` lines can carry
pub fn mask(width: u8) -> u16 {
    u16::MAX
        .checked_shr((MAX_IO_WIDTH as u32).saturating_sub(width as u32))
        .unwrap_or(0)
}

/// Levels of the data lines for `value`, least significant bit first
pub fn encode(value: u16, width: u8) -> impl Iterator<Item = bool> {
    (0..width as u32).map(move |i| value.checked_shr(i).is_some_and(|v| v & 1 == 1))
}

/// Value represented by data line levels, least significant bit first
pub fn decode(levels: impl IntoIterator<Item = bool>) -> u16 {
    levels
        .into_iter()
        .take(MAX_IO_WIDTH)
        .enumerate()
        .filter(|(_, high)| *high)
        .fold(0, |value, (i, _)| value | 1 << i)
}

fn collect_pins<P, E>(
    pins: impl IntoIterator<Item = P>,
) -> Result<Vec<P, MAX_IO_WIDTH>, BusError<E>> {
    let mut data = Vec::new();
    for pin in pins {
        data.push(pin).map_err(|_| BusError::TooManyPins)?;
    }
    if data.is_empty() {
        return Err(BusError::NoPins);
    }
    Ok(data)
}

/// Sending end of the bus
pub struct BusWriter<P, S> {
    data: Vec<P, MAX_IO_WIDTH>,
    strobe: S,
    discipline: StrobeDiscipline,
}

impl<P, S, E> BusWriter<P, S>
where
    P: OutputPin<Error = E>,
    S: StatefulOutputPin<Error = E>,
{
    /// Takes ownership of the data pins, the first one carries the least significant bit
    pub fn new(
        data: impl IntoIterator<Item = P>,
        strobe: S,
        discipline: StrobeDiscipline,
    ) -> Result<Self, BusError<E>> {
        Ok(Self {
            data: collect_pins(data)?,
            strobe,
            discipline,
        })
    }

    pub fn width(&self) -> u8 {
        self.data.len() as u8
    }

    /// Drive all lines low
    pub fn clear(&mut self) -> Result<(), BusError<E>> {
        for pin in self.data.iter_mut() {
            pin.set_low().map_err(BusError::Pin)?;
        }
        self.strobe.set_low().map_err(BusError::Pin)
    }

    /// Put `value` on the data lines, then strobe
    pub fn write(&mut self, value: u16, delay: &mut impl DelayNs) -> Result<(), BusError<E>> {
        let width = self.width();
        if value.checked_shr(width as u32).unwrap_or(0) != 0 {
            return Err(BusError::ValueOutOfRange { value, width });
        }
        for (pin, high) in self.data.iter_mut().zip(encode(value, width)) {
            pin.set_state(PinState::from(high)).map_err(BusError::Pin)?;
        }
        match self.discipline {
            StrobeDiscipline::Toggle => self.strobe.toggle().map_err(BusError::Pin),
            StrobeDiscipline::Pulse { width_us } => {
                self.strobe.set_high().map_err(BusError::Pin)?;
                delay.delay_us(width_us);
                self.strobe.set_low().map_err(BusError::Pin)
            }
        }
    }
}

/// Receiving end of the bus, the strobe line is handled by the caller
pub struct BusReader<P> {
    data: Vec<P, MAX_IO_WIDTH>,
}

impl<P, E> BusReader<P>
where
    P: InputPin<Error = E>,
{
    pub fn new(data: impl IntoIterator<Item = P>) -> Result<Self, BusError<E>> {
        Ok(Self {
            data: collect_pins(data)?,
        })
    }

    pub fn width(&self) -> u8 {
        self.data.len() as u8
    }

    /// Sample all data lines
    pub fn read(&mut self) -> Result<u16, BusError<E>> {
        let mut value = 0;
        for (i, pin) in self.data.iter_mut().enumerate() {
            if pin.is_high().map_err(BusError::Pin)? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type Trace = Rc<RefCell<std::vec::Vec<(PinId, bool)>>>;

    /// Both ends of a wire, every level change is appended to the shared trace
    #[derive(Clone)]
    struct MockPin {
        id: PinId,
        level: Rc<Cell<bool>>,
        trace: Trace,
    }

    impl MockPin {
        fn new(id: PinId, trace: &Trace) -> Self {
            Self {
                id,
                level: Rc::new(Cell::new(false)),
                trace: trace.clone(),
            }
        }

        fn set(&mut self, high: bool) {
            self.level.set(high);
            self.trace.borrow_mut().push((self.id, high));
        }
    }

    impl ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.set(true);
            Ok(())
        }
    }

    impl StatefulOutputPin for MockPin {
        fn is_set_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.level.get())
        }

        fn is_set_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.level.get())
        }
    }

    impl InputPin for MockPin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.level.get())
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.level.get())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn wire(
        table: &PinTable,
        discipline: StrobeDiscipline,
    ) -> (BusWriter<MockPin, MockPin>, BusReader<MockPin>, Trace) {
        let trace = Trace::default();
        let pins: std::vec::Vec<_> = table
            .data
            .iter()
            .map(|id| MockPin::new(*id, &trace))
            .collect();
        let writer = BusWriter::new(
            pins.clone(),
            MockPin::new(table.strobe, &trace),
            discipline,
        )
        .unwrap();
        let reader = BusReader::new(pins).unwrap();
        (writer, reader, trace)
    }

    #[test]
    fn every_value_reads_back() {
        for table in [OBSERVED_BUS, BLACK_BUS] {
            let (mut writer, mut reader, _) = wire(&table, StrobeDiscipline::Toggle);
            for value in 0..(1u16 << table.width()) {
                writer.write(value, &mut NoDelay).unwrap();
                assert_eq!(reader.read().unwrap(), value);
            }
        }
    }

    #[test]
    fn value_five_on_observed_bus() {
        let (mut writer, _, trace) = wire(&OBSERVED_BUS, StrobeDiscipline::Toggle);
        writer.write(5, &mut NoDelay).unwrap();

        let trace = trace.borrow();
        let high: std::vec::Vec<_> = trace
            .iter()
            .filter(|(id, high)| *high && *id != OBSERVED_BUS.strobe)
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(high, ["A6", "C1"]);
        assert_eq!(trace.len(), 12);
        assert_eq!(trace.last(), Some(&(PinId::new('A', 7), true)));
    }

    #[test]
    fn strobe_moves_after_data() {
        let (mut writer, _, trace) = wire(&OBSERVED_BUS, StrobeDiscipline::Toggle);
        for value in [1, 2047, 0, 1024] {
            trace.borrow_mut().clear();
            writer.write(value, &mut NoDelay).unwrap();
            let trace = trace.borrow();
            let strobes: std::vec::Vec<_> = trace
                .iter()
                .enumerate()
                .filter(|(_, (id, _))| *id == OBSERVED_BUS.strobe)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(strobes, [trace.len() - 1]);
        }
    }

    #[test]
    fn toggle_alternates_strobe_level() {
        let (mut writer, _, trace) = wire(&OBSERVED_BUS, StrobeDiscipline::Toggle);
        writer.clear().unwrap();
        for _ in 0..3 {
            writer.write(3, &mut NoDelay).unwrap();
        }
        let strobe_levels: std::vec::Vec<_> = trace
            .borrow()
            .iter()
            .filter(|(id, _)| *id == OBSERVED_BUS.strobe)
            .map(|(_, high)| *high)
            .collect();
        assert_eq!(strobe_levels, [false, true, false, true]);
    }

    #[test]
    fn pulse_returns_low() {
        let (mut writer, _, trace) = wire(&BLACK_BUS, StrobeDiscipline::Pulse { width_us: 10 });
        writer.write(63, &mut NoDelay).unwrap();
        let trace = trace.borrow();
        assert_eq!(
            trace[trace.len() - 2..],
            [(BLACK_BUS.strobe, true), (BLACK_BUS.strobe, false)]
        );
        assert_eq!(StrobeDiscipline::Pulse { width_us: 10 }.edge(), Edge::Rising);
    }

    #[test]
    fn value_wider_than_bus() {
        let (mut writer, _, trace) = wire(&BLACK_BUS, StrobeDiscipline::Toggle);
        assert_eq!(
            writer.write(64, &mut NoDelay),
            Err(BusError::ValueOutOfRange {
                value: 64,
                width: 6
            })
        );
        assert!(trace.borrow().is_empty());
    }

    #[test]
    fn pin_count_limits() {
        let trace = Trace::default();
        let too_many = (0..17).map(|i| MockPin::new(PinId::new('B', i), &trace));
        assert!(matches!(
            BusReader::new(too_many),
            Err(BusError::TooManyPins)
        ));
        assert!(matches!(
            BusReader::<MockPin>::new([]),
            Err(BusError::NoPins)
        ));
    }

    #[test]
    fn encode_decode_lsb_first() {
        let levels: std::vec::Vec<_> = encode(0b10_0110, 6).collect();
        assert_eq!(levels, [false, true, true, false, false, true]);
        assert_eq!(decode(levels), 0b10_0110);
        assert_eq!(decode(encode(u16::MAX, 16)), u16::MAX);
    }

    #[test]
    fn masks() {
        assert_eq!(mask(6), 63);
        assert_eq!(mask(11), 2047);
        assert_eq!(mask(16), u16::MAX);
    }
}
