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

//! Role parameters
//!
//! Defaults are the values of the deployed test network.

use core::fmt::Display;

use crate::bus::{Edge, StrobeDiscipline};
use crate::*;

/// Rime channel of the unicast connections
pub const DATA_CHANNEL: Channel = 133;
/// Rime channel the sender broadcasts on
pub const BROADCAST_CHANNEL: Channel = 129;
/// Rime channel of the 6 bit rig
pub const BLACK_CHANNEL: Channel = 134;
/// UDP port the relays listen on in IPv6 networks
pub const DATA_PORT: Channel = 5678;
/// UDP port the energest sink listens on in IPv6 networks
pub const ENERGEST_PORT: Channel = 4567;

pub const RELAY_ID: NodeId = 0xe5;
pub const ENERGEST_SINK_ID: NodeId = 0x9b;
pub const OBSERVATION_SINK_ID: NodeId = 0xe4;

/// Strobe pulse width of the 6 bit rig
pub const BLACK_PULSE_WIDTH_US: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    IoWidth(u8),
    /// Average interval is zero or below the minimum
    Interval,
    Padding(usize),
    /// Every(0) never triggers, use Never
    Cadence,
    PulseWidth,
    SampleInterval,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::IoWidth(width) => {
                write!(f, "io width {} not in 1..={}", width, MAX_IO_WIDTH)
            }
            ConfigError::Interval => write!(f, "send interval must be at least its minimum"),
            ConfigError::Padding(padding) => write!(
                f,
                "padding {} must be even and fit into a {} byte frame",
                padding, MAX_FRAME_SIZE
            ),
            ConfigError::Cadence => write!(f, "energest cadence must be positive"),
            ConfigError::PulseWidth => write!(f, "strobe pulse width must be positive"),
            ConfigError::SampleInterval => write!(f, "sample interval must be positive"),
        }
    }
}

fn validate_io_width(width: u8) -> Result<(), ConfigError> {
    if (1..=MAX_IO_WIDTH as u8).contains(&width) {
        Ok(())
    } else {
        Err(ConfigError::IoWidth(width))
    }
}

fn validate_strobe(strobe: &StrobeDiscipline) -> Result<(), ConfigError> {
    match strobe {
        StrobeDiscipline::Pulse { width_us: 0 } => Err(ConfigError::PulseWidth),
        _ => Ok(()),
    }
}

fn validate_cadence(cadence: &EnergestCadence) -> Result<(), ConfigError> {
    match cadence {
        EnergestCadence::Every(0) => Err(ConfigError::Cadence),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioConfig {
    pub tx_power_dbm: i8,
    /// Signal level below which the channel counts as clear, weaker frames are dropped
    pub cca_threshold_dbm: i8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            tx_power_dbm: 0,
            cca_threshold_dbm: -90,
        }
    }
}

impl RadioConfig {
    /// Whether a frame received with `rssi_dbm` is strong enough to be handed to the role
    pub fn accepts(&self, rssi_dbm: i16) -> bool {
        rssi_dbm >= self.cca_threshold_dbm as i16
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenderConfig {
    pub io_width: u8,
    /// Whether an observer is attached to the bus
    pub signal_bus: bool,
    pub strobe: StrobeDiscipline,
    pub interval: SendInterval,
    pub channel: Channel,
    pub destination: Destination<NodeId>,
    pub padding: usize,
    /// Counted in sent test messages
    pub energest: EnergestCadence,
    pub energest_channel: Channel,
    pub energest_destination: Destination<NodeId>,
    pub radio: RadioConfig,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            io_width: 11,
            signal_bus: true,
            strobe: StrobeDiscipline::Toggle,
            interval: SendInterval::default(),
            channel: DATA_CHANNEL,
            destination: Destination::Unicast(RELAY_ID),
            padding: DEFAULT_TEST_MSG_PADDING,
            energest: EnergestCadence::Every(100),
            energest_channel: DATA_CHANNEL,
            energest_destination: Destination::Unicast(ENERGEST_SINK_ID),
            radio: RadioConfig::default(),
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_io_width(self.io_width)?;
        validate_strobe(&self.strobe)?;
        validate_cadence(&self.energest)?;
        let interval = &self.interval;
        if interval.average_ms == 0 || interval.average_ms < interval.min_ms {
            return Err(ConfigError::Interval);
        }
        if self.padding % 2 != 0 || TEST_MSG_MIN_SIZE + self.padding > MAX_FRAME_SIZE {
            return Err(ConfigError::Padding(self.padding));
        }
        Ok(())
    }
}

/// Observed node that receives test messages and passes their sequence number to its observer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelayConfig {
    /// Sequence numbers are truncated to this many bits
    pub io_width: u8,
    pub strobe: StrobeDiscipline,
    pub channel: Channel,
    pub broadcast_channel: Option<Channel>,
    /// Counted in received frames
    pub energest: EnergestCadence,
    pub energest_channel: Channel,
    pub energest_destination: Destination<NodeId>,
    pub radio: RadioConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            io_width: 11,
            strobe: StrobeDiscipline::Toggle,
            channel: DATA_CHANNEL,
            broadcast_channel: Some(BROADCAST_CHANNEL),
            energest: EnergestCadence::Every(100),
            energest_channel: DATA_CHANNEL,
            energest_destination: Destination::Unicast(ENERGEST_SINK_ID),
            radio: RadioConfig {
                cca_threshold_dbm: -77,
                ..Default::default()
            },
        }
    }
}

impl RelayConfig {
    /// Receiver of the 6 bit rig, pulses its strobe and sends no energest
    pub fn black() -> Self {
        Self {
            io_width: 6,
            strobe: StrobeDiscipline::Pulse {
                width_us: BLACK_PULSE_WIDTH_US,
            },
            channel: BLACK_CHANNEL,
            broadcast_channel: None,
            energest: EnergestCadence::Never,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_io_width(self.io_width)?;
        validate_strobe(&self.strobe)?;
        validate_cadence(&self.energest)
    }

    pub fn listens_on(&self, channel: Channel) -> bool {
        channel == self.channel || Some(channel) == self.broadcast_channel
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObserverConfig {
    pub io_width: u8,
    /// Strobe edges that trigger an observation
    pub edge: Edge,
    pub sample_interval_ms: TimeMs,
    pub channel: Channel,
    pub destination: Destination<NodeId>,
    pub timestamp_width: TimestampWidth,
    pub radio: RadioConfig,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            io_width: 11,
            edge: Edge::Any,
            // 128 Hz
            sample_interval_ms: 8,
            channel: DATA_CHANNEL,
            destination: Destination::Unicast(OBSERVATION_SINK_ID),
            timestamp_width: TimestampWidth::U16,
            radio: RadioConfig::default(),
        }
    }
}

impl ObserverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_io_width(self.io_width)?;
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::SampleInterval);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SinkKind {
    /// Prints [`EnergestRecord`]s
    Energest,
    /// Prints [`ObservationRecord`]s
    Observation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub channel: Channel,
    pub radio: RadioConfig,
}

impl SinkConfig {
    pub fn new(kind: SinkKind) -> Self {
        Self {
            kind,
            channel: DATA_CHANNEL,
            radio: RadioConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SenderConfig::default().validate(), Ok(()));
        assert_eq!(RelayConfig::default().validate(), Ok(()));
        assert_eq!(RelayConfig::black().validate(), Ok(()));
        assert_eq!(ObserverConfig::default().validate(), Ok(()));
    }

    #[test]
    fn invalid_sender() {
        let config = SenderConfig {
            io_width: 17,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::IoWidth(17)));

        let config = SenderConfig {
            padding: 43,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Padding(43)));

        let config = SenderConfig {
            padding: 122,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Padding(122)));

        let config = SenderConfig {
            energest: EnergestCadence::Every(0),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Cadence));

        let config = SenderConfig {
            interval: SendInterval {
                average_ms: 4,
                min_ms: 8,
                jitter: true,
            },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Interval));
    }

    #[test]
    fn invalid_relay() {
        let config = RelayConfig {
            strobe: StrobeDiscipline::Pulse { width_us: 0 },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::PulseWidth));
    }

    #[test]
    fn radio_thresholds() {
        let radio = RadioConfig::default();
        assert_eq!(radio.tx_power_dbm, 0);
        assert!(radio.accepts(-90));
        assert!(!radio.accepts(-91));

        let relay = RelayConfig::default().radio;
        assert!(relay.accepts(-77));
        assert!(!relay.accepts(-80));
        assert_eq!(RelayConfig::black().radio, relay);
    }

    #[test]
    fn relay_channels() {
        let config = RelayConfig::default();
        assert!(config.listens_on(DATA_CHANNEL));
        assert!(config.listens_on(BROADCAST_CHANNEL));
        assert!(!config.listens_on(BLACK_CHANNEL));
        assert!(!RelayConfig::black().listens_on(BROADCAST_CHANNEL));
    }
}
