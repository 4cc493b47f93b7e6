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

//! Radio payloads
//!
//! Payloads are the in-memory representation of the C structs the deployed motes send: little
//! endian, every field at its natural alignment and the struct padded to its largest alignment.

use core::fmt::Display;

use crate::*;

/// Test message without padding: sequence, application timestamp, MAC timestamp
pub const TEST_MSG_MIN_SIZE: usize = 6;
pub const DEFAULT_TEST_MSG_PADDING: usize = 82;
pub const ENERGEST_MSG_SIZE: usize = 24;
/// Energest message as laid out by a 16 bit platform
pub const ENERGEST_MSG_PACKED_SIZE: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireError {
    FrameTooLarge { size: usize },
    UnexpectedLength { length: usize },
}

impl Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WireError::FrameTooLarge { size } => {
                write!(f, "{} bytes exceed the maximum frame size", size)
            }
            WireError::UnexpectedLength { length } => {
                write!(f, "no message is {} bytes long", length)
            }
        }
    }
}

fn frame_of_size(size: usize) -> Result<Frame, WireError> {
    let mut frame = Frame::new();
    frame
        .resize_default(size)
        .map_err(|_| WireError::FrameTooLarge { size })?;
    Ok(frame)
}

fn put_u16(frame: &mut [u8], offset: usize, value: u16) {
    frame[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(frame: &mut [u8], offset: usize, value: u32) {
    frame[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(frame: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

fn get_u32(frame: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

/// Numbered message of the observed network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestMsg {
    pub sequence: u16,
    pub app_timestamp: u16,
    /// Number of filler bytes, makes the frame as long as required by the experiment
    pub padding: usize,
    /// Filled in by the MAC layer of some platforms
    pub mac_timestamp: i16,
}

impl TestMsg {
    pub fn size(&self) -> usize {
        TEST_MSG_MIN_SIZE + self.padding
    }

    /// `padding` must be even to keep the MAC timestamp aligned
    pub fn encode(&self) -> Result<Frame, WireError> {
        let size = self.size();
        if self.padding % 2 != 0 {
            return Err(WireError::UnexpectedLength { length: size });
        }
        let mut frame = frame_of_size(size)?;
        put_u16(&mut frame, 0, self.sequence);
        put_u16(&mut frame, 2, self.app_timestamp);
        put_u16(&mut frame, size - 2, self.mac_timestamp as u16);
        Ok(frame)
    }

    /// Padding is whatever lies between the timestamps
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let length = frame.len();
        if length < TEST_MSG_MIN_SIZE || length % 2 != 0 {
            return Err(WireError::UnexpectedLength { length });
        }
        Ok(Self {
            sequence: get_u16(frame, 0),
            app_timestamp: get_u16(frame, 2),
            padding: length - TEST_MSG_MIN_SIZE,
            mac_timestamp: get_u16(frame, length - 2) as i16,
        })
    }
}

/// Duty cycle of a node since its previous energest message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnergestMsg {
    pub cpu: u32,
    pub lpm: u32,
    pub transmit: u32,
    pub listen: u32,
    pub sequence: u16,
    pub total_time: u32,
}

impl EnergestMsg {
    pub fn encode(&self) -> Result<Frame, WireError> {
        let mut frame = frame_of_size(ENERGEST_MSG_SIZE)?;
        put_u32(&mut frame, 0, self.cpu);
        put_u32(&mut frame, 4, self.lpm);
        put_u32(&mut frame, 8, self.transmit);
        put_u32(&mut frame, 12, self.listen);
        put_u16(&mut frame, 16, self.sequence);
        put_u32(&mut frame, 20, self.total_time);
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let total_time_offset = match frame.len() {
            ENERGEST_MSG_SIZE => 20,
            ENERGEST_MSG_PACKED_SIZE => 18,
            length => return Err(WireError::UnexpectedLength { length }),
        };
        Ok(Self {
            cpu: get_u32(frame, 0),
            lpm: get_u32(frame, 4),
            transmit: get_u32(frame, 8),
            listen: get_u32(frame, 12),
            sequence: get_u16(frame, 16),
            total_time: get_u32(frame, total_time_offset),
        })
    }
}

/// Size of the application timestamp in a [`WhiteMsg`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimestampWidth {
    /// Clock ticks truncated to 16 bit, used on Rime networks
    #[default]
    U16,
    /// Used on IPv6 networks
    U32,
}

impl TimestampWidth {
    pub fn message_size(&self) -> usize {
        match self {
            TimestampWidth::U16 => 16,
            TimestampWidth::U32 => 20,
        }
    }
}

/// Observation of an observed node's bus together with the observer's energy measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WhiteMsg {
    /// Value read from the bus
    pub observed_sequence: u16,
    pub observer_sequence: u16,
    /// Sum of the ADC samples since the previous observation
    pub energy: u32,
    pub sample_count: u16,
    /// Time since the previous observation
    pub app_timestamp: u32,
    pub mac_timestamp: u16,
}

impl WhiteMsg {
    /// The application timestamp is truncated to `width`
    pub fn encode(&self, width: TimestampWidth) -> Result<Frame, WireError> {
        let mut frame = frame_of_size(width.message_size())?;
        put_u16(&mut frame, 0, self.observed_sequence);
        put_u16(&mut frame, 2, self.observer_sequence);
        put_u32(&mut frame, 4, self.energy);
        put_u16(&mut frame, 8, self.sample_count);
        match width {
            TimestampWidth::U16 => {
                put_u16(&mut frame, 10, self.app_timestamp as u16);
                put_u16(&mut frame, 12, self.mac_timestamp);
            }
            TimestampWidth::U32 => {
                put_u32(&mut frame, 12, self.app_timestamp);
                put_u16(&mut frame, 16, self.mac_timestamp);
            }
        }
        Ok(frame)
    }

    /// The timestamp width follows from the frame length. 14 bytes is the layout of 16 bit
    /// platforms, their observed sequence is a single byte followed by padding.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let (observed_sequence, app_timestamp, mac_timestamp) = match frame.len() {
            14 => (frame[0] as u16, get_u16(frame, 10) as u32, get_u16(frame, 12)),
            16 => (get_u16(frame, 0), get_u16(frame, 10) as u32, get_u16(frame, 12)),
            20 => (get_u16(frame, 0), get_u32(frame, 12), get_u16(frame, 16)),
            length => return Err(WireError::UnexpectedLength { length }),
        };
        Ok(Self {
            observed_sequence,
            observer_sequence: get_u16(frame, 2),
            energy: get_u32(frame, 4),
            sample_count: get_u16(frame, 8),
            app_timestamp,
            mac_timestamp,
        })
    }
}

/// Any payload, for the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Test(TestMsg),
    Energest(EnergestMsg),
    White(WhiteMsg),
}

/// message as JSON to make it parseable
macro_rules! message_to_json_string {
    ($fmt:expr,$write:tt,$message:expr) => {
        match $message {
            Message::Test(TestMsg {
                sequence,
                app_timestamp,
                padding,
                mac_timestamp,
            }) => $write!(
                $fmt,
                "{{\"kind\":\"test\",\"sequence\":{},\"app_timestamp\":{},\"padding\":{},\"mac_timestamp\":{}}}",
                sequence,
                app_timestamp,
                padding,
                mac_timestamp
            ),
            Message::Energest(EnergestMsg {
                cpu,
                lpm,
                transmit,
                listen,
                sequence,
                total_time,
            }) => $write!(
                $fmt,
                "{{\"kind\":\"energest\",\"sequence\":{},\"cpu\":{},\"lpm\":{},\"transmit\":{},\"listen\":{},\"total_time\":{}}}",
                sequence,
                cpu,
                lpm,
                transmit,
                listen,
                total_time
            ),
            Message::White(WhiteMsg {
                observed_sequence,
                observer_sequence,
                energy,
                sample_count,
                app_timestamp,
                mac_timestamp,
            }) => $write!(
                $fmt,
                "{{\"kind\":\"white\",\"observed_sequence\":{},\"observer_sequence\":{},\"energy\":{},\"sample_count\":{},\"app_timestamp\":{},\"mac_timestamp\":{}}}",
                observed_sequence,
                observer_sequence,
                energy,
                sample_count,
                app_timestamp,
                mac_timestamp
            ),
        }
    };
}

impl Display for Message {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        message_to_json_string!(fmt, write, self)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Message {
    fn format(&self, fmt: defmt::Formatter) {
        fn wrapper(msg: &Message, fmt: defmt::Formatter) -> core::fmt::Result {
            message_to_json_string!(fmt, defmt_write_wrapper, msg)
        }
        let _ = wrapper(self, fmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_layout() {
        let msg = TestMsg {
            sequence: 0x0102,
            app_timestamp: 0x0304,
            padding: 44,
            mac_timestamp: -2,
        };
        let frame = msg.encode().unwrap();
        assert_eq!(frame.len(), 50);
        assert_eq!(frame[..4], [0x02, 0x01, 0x04, 0x03]);
        assert!(frame[4..48].iter().all(|b| *b == 0));
        assert_eq!(frame[48..], [0xfe, 0xff]);
        assert_eq!(TestMsg::decode(&frame), Ok(msg));
    }

    #[test]
    fn test_msg_padding_from_length() {
        let frame = [5, 0, 0, 0, 0xaa, 0xbb, 0xcc, 0xdd, 7, 0];
        let msg = TestMsg::decode(&frame).unwrap();
        assert_eq!(msg.sequence, 5);
        assert_eq!(msg.padding, 4);
        assert_eq!(msg.mac_timestamp, 7);
    }

    #[test]
    fn test_msg_size_limits() {
        let too_large = TestMsg {
            sequence: 0,
            app_timestamp: 0,
            padding: 122,
            mac_timestamp: 0,
        };
        assert_eq!(
            too_large.encode(),
            Err(WireError::FrameTooLarge { size: 128 })
        );
        assert_eq!(
            TestMsg::decode(&[1, 2, 3]),
            Err(WireError::UnexpectedLength { length: 3 })
        );
        assert_eq!(
            TestMsg::decode(&[0; 7]),
            Err(WireError::UnexpectedLength { length: 7 })
        );
    }

    #[test]
    fn energest_msg_layout() {
        let msg = EnergestMsg {
            cpu: 30,
            lpm: 20,
            transmit: 5,
            listen: 15,
            sequence: 100,
            total_time: 0x01020304,
        };
        let frame = msg.encode().unwrap();
        assert_eq!(frame.len(), ENERGEST_MSG_SIZE);
        assert_eq!(frame[16..], [100, 0, 0, 0, 4, 3, 2, 1]);
        assert_eq!(EnergestMsg::decode(&frame), Ok(msg));
    }

    #[test]
    fn energest_msg_packed() {
        let mut frame = [0u8; ENERGEST_MSG_PACKED_SIZE];
        frame[0] = 1;
        frame[16] = 9;
        frame[18] = 0xff;
        let msg = EnergestMsg::decode(&frame).unwrap();
        assert_eq!((msg.cpu, msg.sequence, msg.total_time), (1, 9, 0xff));
    }

    #[test]
    fn white_msg_layouts() {
        let msg = WhiteMsg {
            observed_sequence: 2047,
            observer_sequence: 3,
            energy: 70_000,
            sample_count: 128,
            app_timestamp: 1000,
            mac_timestamp: 0,
        };
        let rime = msg.encode(TimestampWidth::U16).unwrap();
        assert_eq!(rime.len(), 16);
        assert_eq!(rime[10..12], 1000u16.to_le_bytes());
        assert_eq!(WhiteMsg::decode(&rime), Ok(msg));

        let ipv6 = msg.encode(TimestampWidth::U32).unwrap();
        assert_eq!(ipv6.len(), 20);
        assert_eq!(ipv6[12..16], 1000u32.to_le_bytes());
        assert_eq!(WhiteMsg::decode(&ipv6), Ok(msg));
    }

    #[test]
    fn white_msg_short_layout_skips_padding() {
        let mut frame = [0u8; 14];
        frame[0] = 0x2a;
        // padding byte with whatever was on the stack
        frame[1] = 0x5c;
        frame[2..4].copy_from_slice(&7u16.to_le_bytes());
        frame[10..12].copy_from_slice(&300u16.to_le_bytes());
        let msg = WhiteMsg::decode(&frame).unwrap();
        assert_eq!(msg.observed_sequence, 0x2a);
        assert_eq!(msg.observer_sequence, 7);
        assert_eq!(msg.app_timestamp, 300);
    }

    #[test]
    fn white_msg_truncates_timestamp() {
        let msg = WhiteMsg {
            observed_sequence: 1,
            observer_sequence: 1,
            energy: 0,
            sample_count: 0,
            app_timestamp: 0x1_0005,
            mac_timestamp: 0,
        };
        let decoded = WhiteMsg::decode(&msg.encode(TimestampWidth::U16).unwrap()).unwrap();
        assert_eq!(decoded.app_timestamp, 5);
    }

    #[test]
    fn message_as_json() {
        let msg = Message::Test(TestMsg {
            sequence: 5,
            app_timestamp: 1,
            padding: 44,
            mac_timestamp: 0,
        });
        assert_eq!(
            msg.to_string(),
            "{\"kind\":\"test\",\"sequence\":5,\"app_timestamp\":1,\"padding\":44,\"mac_timestamp\":0}"
        );
    }
}
