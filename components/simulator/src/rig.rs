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

//! Boards of the two test rigs and how they are wired

use anyhow::{anyhow, Context};

use dual_motes::{
    bus::{StrobeDiscipline, BLACK_BUS, OBSERVED_BUS},
    EnergestCadence, Observer, ObserverConfig, Relay, RelayConfig, SendInterval, Sender,
    SenderConfig, Sink, SinkConfig, SinkKind, BLACK_CHANNEL, ENERGEST_SINK_ID,
    OBSERVATION_SINK_ID, RELAY_ID,
};
use experiment_api::Destination;

use crate::sim::SimNode;
use crate::wire;
use crate::*;

pub const SENDER_ID: NodeId = 0x01;
pub const SENDER_OBSERVER_ID: NodeId = 0x11;
pub const RELAY_OBSERVER_ID: NodeId = 0x15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RigKind {
    /// Sender and relay both signal on the 11 bit bus, both are observed
    #[default]
    Observed,
    /// Only the relay is observed, over the 6 bit bus with a pulsed strobe
    Black,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigOptions {
    pub kind: RigKind,
    /// Ignored by the black rig
    pub io_width: u8,
    pub interval: SendInterval,
    pub energest: EnergestCadence,
    /// Ignored by the black rig
    pub strobe: StrobeDiscipline,
}

impl Default for RigOptions {
    fn default() -> Self {
        Self {
            kind: RigKind::Observed,
            io_width: OBSERVED_BUS.width(),
            interval: SendInterval::default(),
            energest: EnergestCadence::Every(100),
            strobe: StrobeDiscipline::Toggle,
        }
    }
}

/// Observer reacting to the strobe edges `strobe` produces
fn observer(id: NodeId, io_width: u8, strobe: StrobeDiscipline) -> anyhow::Result<Observer> {
    let config = ObserverConfig {
        io_width,
        edge: strobe.edge(),
        ..Default::default()
    };
    Observer::new(id, config).map_err(|e| anyhow!("invalid observer config: {e}"))
}

/// Creates the boards of a rig, the vector index is used to address them in the simulation
pub fn build(options: &RigOptions) -> anyhow::Result<Vec<SimNode>> {
    match options.kind {
        RigKind::Observed => build_observed(options),
        RigKind::Black => build_black(options),
    }
}

fn build_observed(options: &RigOptions) -> anyhow::Result<Vec<SimNode>> {
    let sender = Sender::new(
        SENDER_ID,
        SenderConfig {
            io_width: options.io_width,
            strobe: options.strobe,
            interval: options.interval,
            energest: options.energest,
            ..Default::default()
        },
    )
    .map_err(|e| anyhow!("invalid sender config: {e}"))?;
    let relay = Relay::new(
        RELAY_ID,
        RelayConfig {
            io_width: options.io_width,
            strobe: options.strobe,
            energest: options.energest,
            ..Default::default()
        },
    )
    .map_err(|e| anyhow!("invalid relay config: {e}"))?;

    let edge = options.strobe.edge();
    let (sender_bus, sender_tap) =
        wire::connect(&OBSERVED_BUS, options.io_width, options.strobe, edge)
            .map_err(|e| anyhow!("{e}"))
            .context("could not wire sender")?;
    let (relay_bus, relay_tap) =
        wire::connect(&OBSERVED_BUS, options.io_width, options.strobe, edge)
            .map_err(|e| anyhow!("{e}"))
            .context("could not wire relay")?;

    Ok(vec![
        SimNode::new(sender).with_bus(sender_bus),
        SimNode::new(observer(SENDER_OBSERVER_ID, options.io_width, options.strobe)?)
            .with_tap(sender_tap, 0),
        SimNode::new(relay).with_bus(relay_bus),
        SimNode::new(observer(RELAY_OBSERVER_ID, options.io_width, options.strobe)?)
            .with_tap(relay_tap, 2),
        SimNode::new(Sink::new(
            OBSERVATION_SINK_ID,
            SinkConfig::new(SinkKind::Observation),
        )),
        SimNode::new(Sink::new(ENERGEST_SINK_ID, SinkConfig::new(SinkKind::Energest))),
    ])
}

fn build_black(options: &RigOptions) -> anyhow::Result<Vec<SimNode>> {
    let sender = Sender::new(
        SENDER_ID,
        SenderConfig {
            signal_bus: false,
            interval: options.interval,
            channel: BLACK_CHANNEL,
            destination: Destination::Unicast(RELAY_ID),
            padding: 44,
            energest: EnergestCadence::Never,
            ..Default::default()
        },
    )
    .map_err(|e| anyhow!("invalid sender config: {e}"))?;
    let relay_config = RelayConfig::black();
    let (relay_bus, relay_tap) = wire::connect(
        &BLACK_BUS,
        relay_config.io_width,
        relay_config.strobe,
        relay_config.strobe.edge(),
    )
    .map_err(|e| anyhow!("{e}"))
    .context("could not wire relay")?;
    let observer = observer(RELAY_OBSERVER_ID, relay_config.io_width, relay_config.strobe)?;
    let relay = Relay::new(RELAY_ID, relay_config)
        .map_err(|e| anyhow!("invalid relay config: {e}"))?;

    Ok(vec![
        SimNode::new(sender),
        SimNode::new(relay).with_bus(relay_bus),
        SimNode::new(observer).with_tap(relay_tap, 1),
        SimNode::new(Sink::new(
            OBSERVATION_SINK_ID,
            SinkConfig::new(SinkKind::Observation),
        )),
    ])
}
