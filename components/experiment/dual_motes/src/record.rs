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

//! Console lines of the sinks
//!
//! The lines are parsed by existing spreadsheets, their format must not change.

use core::fmt::{Display, Write};

use crate::*;

/// One energest message as received by the energest sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EnergestRecord {
    pub source: NodeId,
    pub report: EnergestMsg,
}

impl Display for EnergestRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let r = &self.report;
        write!(
            f,
            "{:x},{},{},{},{},{},{}",
            self.source, r.sequence, r.cpu, r.lpm, r.transmit, r.listen, r.total_time
        )
    }
}

/// One observation as received by the observation sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObservationRecord {
    pub source: NodeId,
    /// Number of frames the sink received so far
    pub sink_sequence: u16,
    pub observation: WhiteMsg,
    /// Link layer timestamp of the frame
    pub packet_timestamp: u16,
    /// Sink's clock at reception
    pub rtime: u32,
}

impl Display for ObservationRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let o = &self.observation;
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{}",
            self.source,
            self.sink_sequence,
            o.observed_sequence,
            o.observer_sequence,
            o.energy,
            o.sample_count,
            o.app_timestamp,
            o.mac_timestamp,
            self.packet_timestamp,
            self.rtime
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Record {
    Energest(EnergestRecord),
    Observation(ObservationRecord),
}

impl Record {
    /// Line terminator the analysis tools expect after the record
    pub fn line_ending(&self) -> &'static str {
        match self {
            Record::Energest(_) => "\n\r",
            Record::Observation(_) => "\n",
        }
    }

    /// Write the complete console line
    pub fn write_line(&self, w: &mut impl Write) -> core::fmt::Result {
        write!(w, "{}{}", self, self.line_ending())
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Record::Energest(r) => Display::fmt(r, f),
            Record::Observation(r) => Display::fmt(r, f),
        }
    }
}

impl RoleRecord<Node> for Record {
    fn get_source(&self) -> NodeId {
        match self {
            Record::Energest(r) => r.source,
            Record::Observation(r) => r.source,
        }
    }
}
