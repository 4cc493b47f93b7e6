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

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum State {
    #[default]
    Reset,
    Listen,
    Signal {
        value: u16,
    },
    ReadEnergest,
    SendEnergest {
        channel: Channel,
        destination: Destination<NodeId>,
        frame: Frame,
    },
}

impl State {
    /// Returns a state's action
    pub(crate) fn get_action(&self) -> DualMotesAction {
        match self {
            State::Reset => Action::None,
            State::Listen => Action::Receive { end: None },
            State::Signal { value } => Action::Signal { value: *value },
            State::ReadEnergest => Action::ReadEnergest,
            State::SendEnergest {
                channel,
                destination,
                frame,
            } => Action::Transmit {
                channel: *channel,
                destination: *destination,
                frame: frame.clone(),
            },
        }
    }

    fn state_as_string(&self) -> &str {
        match self {
            State::Reset => "Reset",
            State::Listen => "Listen",
            State::Signal { .. } => "Signal",
            State::ReadEnergest => "ReadEnergest",
            State::SendEnergest { .. } => "SendEnergest",
        }
    }
}

impl core::fmt::Display for State {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(fmt, "{}", self.state_as_string())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for State {
    fn format(&self, fmt: defmt::Formatter) {
        use defmt::write;
        write!(fmt, "{}", self.state_as_string())
    }
}

/// Observed receiver, shows the sequence number of every received test message to its observer
#[derive(Debug)]
pub struct Relay {
    pub(crate) id: NodeId,
    pub(crate) config: RelayConfig,
    pub(crate) state: State,
    pub(crate) context: Context,
}

impl Relay {
    pub fn new(id: NodeId, config: RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id,
            state: State::default(),
            context: Context::new(config.io_width),
            config,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Number of frames received on the relay's channels
    pub fn received(&self) -> u32 {
        self.context.received
    }

    #[must_use]
    pub fn progress(
        &mut self,
        time: TimeMs,
        input: Option<DualMotesInput>,
        _rng: impl RngCore,
    ) -> (DualMotesAction, Option<Record>) {
        if let Some(input) = &input {
            event_log_input!(time, self.id, DisplayableInput(input));
        }

        let next_state = self.next(time, input);
        event_log_state!(time, self.id, &next_state);
        self.state = next_state;

        let action = self.state.get_action();
        event_log_action!(time, self.id, DisplayableAction(&action, time));
        (action, None)
    }

    /// Get next state
    #[must_use]
    pub(crate) fn next(&mut self, time: TimeMs, input: Option<DualMotesInput>) -> State {
        match (core::mem::take(&mut self.state), input) {
            (State::Reset, _) => {
                event_log_reset!(time, self.id, "relay");
                self.context.reset();
                State::Listen
            }

            (
                State::Listen,
                Some(Input::Packet {
                    source,
                    channel,
                    frame,
                    ..
                }),
            ) => {
                if !self.config.listens_on(channel) {
                    debug!("ignoring frame on channel {}", channel);
                    return State::Listen;
                }
                self.context.received = self.context.received.wrapping_add(1);
                match TestMsg::decode(&frame) {
                    Ok(msg) => {
                        event_log_msg!(time, self.id, Message::Test(msg));
                        State::Signal {
                            value: msg.sequence & bus::mask(self.config.io_width),
                        }
                    }
                    Err(e) => {
                        warn!("dropping frame from {}: {}", source, e);
                        self.after_arrival()
                    }
                }
            }
            // strobes and samples are not wired up
            (State::Listen, _) => State::Listen,

            (State::Signal { .. }, None) => self.after_arrival(),

            (State::ReadEnergest, Some(Input::Energest(counters))) => {
                let report = self
                    .context
                    .energest
                    .report(counters, self.context.received as u16);
                event_log_msg!(time, self.id, Message::Energest(report));
                match report.encode() {
                    Ok(frame) => State::SendEnergest {
                        channel: self.config.energest_channel,
                        destination: self.config.energest_destination,
                        frame,
                    },
                    Err(e) => {
                        error!("could not encode energest message: {}", e);
                        State::Listen
                    }
                }
            }

            (State::SendEnergest { .. }, None) => State::Listen,

            (state, input) => {
                warn!("unexpected input {:?} in state {}", input, state);
                State::Listen
            }
        }
    }

    fn after_arrival(&self) -> State {
        if self.config.energest.is_due(self.context.received) {
            State::ReadEnergest
        } else {
            State::Listen
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng as Rng;

    fn packet(channel: Channel, frame: &[u8]) -> DualMotesInput {
        Input::Packet {
            source: 1,
            channel,
            frame: Frame::from_slice(frame).unwrap(),
            link_timestamp: 0,
        }
    }

    fn test_msg(sequence: u16) -> DualMotesInput {
        let msg = TestMsg {
            sequence,
            app_timestamp: 0,
            padding: 44,
            mac_timestamp: 0,
        };
        packet(DATA_CHANNEL, &msg.encode().unwrap())
    }

    /// Feeds one frame and answers all actions until the relay listens again
    fn deliver(relay: &mut Relay, input: DualMotesInput) -> std::vec::Vec<DualMotesAction> {
        let mut actions = std::vec::Vec::new();
        let mut input = Some(input);
        loop {
            let (action, record) = relay.progress(0, input.take(), Rng);
            assert!(record.is_none());
            match action {
                Action::Receive { end: None } => return actions,
                Action::ReadEnergest => {
                    input = Some(Input::Energest(Energest {
                        cpu: 7 * relay.received(),
                        ..Default::default()
                    }))
                }
                _ => {}
            }
            actions.push(action);
        }
    }

    fn new_relay(config: RelayConfig) -> Relay {
        let mut relay = Relay::new(0xe5, config).unwrap();
        assert_eq!(
            relay.progress(0, None, Rng).0,
            Action::Receive { end: None }
        );
        relay
    }

    #[test]
    fn signals_received_sequence() {
        let mut relay = new_relay(RelayConfig::default());
        assert_eq!(
            deliver(&mut relay, test_msg(42)),
            [Action::Signal { value: 42 }]
        );
    }

    #[test]
    fn sequence_is_truncated_to_bus() {
        let mut relay = new_relay(RelayConfig::black());
        let frame = TestMsg {
            sequence: 0x47,
            app_timestamp: 0,
            padding: 44,
            mac_timestamp: 0,
        }
        .encode()
        .unwrap();
        assert_eq!(
            deliver(&mut relay, packet(BLACK_CHANNEL, &frame)),
            [Action::Signal { value: 0x07 }]
        );
    }

    #[test]
    fn energest_every_kth_arrival() {
        for k in [5, 7, 10, 100] {
            let mut relay = new_relay(RelayConfig {
                energest: EnergestCadence::Every(k),
                ..Default::default()
            });
            for received in 1..=3 * k {
                let actions = deliver(&mut relay, test_msg(received as u16));
                let reports: std::vec::Vec<_> = actions
                    .iter()
                    .filter_map(|a| match a {
                        Action::Transmit {
                            frame, destination, ..
                        } => {
                            assert_eq!(*destination, Destination::Unicast(ENERGEST_SINK_ID));
                            Some(EnergestMsg::decode(frame).unwrap())
                        }
                        _ => None,
                    })
                    .collect();
                if received % k == 0 {
                    assert_eq!(actions.len(), 3);
                    assert_eq!(reports.len(), 1);
                    assert_eq!(reports[0].sequence, received as u16);
                    assert_eq!(reports[0].cpu, 7 * k);
                } else {
                    assert!(reports.is_empty());
                }
            }
        }
    }

    #[test]
    fn energest_cadence_survives_16_bit_wrap() {
        let mut relay = new_relay(RelayConfig {
            energest: EnergestCadence::Every(7),
            ..Default::default()
        });
        relay.context.received = 65530;
        for arrival in 65531..=65544u32 {
            let actions = deliver(&mut relay, test_msg(arrival as u16));
            let reports: std::vec::Vec<_> = actions
                .iter()
                .filter_map(|a| match a {
                    Action::Transmit { frame, .. } => Some(EnergestMsg::decode(frame).unwrap()),
                    _ => None,
                })
                .collect();
            if arrival % 7 == 0 {
                assert_eq!(reports.len(), 1, "no report at {}", arrival);
                assert_eq!(reports[0].sequence, arrival as u16);
            } else {
                assert!(reports.is_empty(), "report at {}", arrival);
            }
        }
        assert_eq!(relay.received(), 65544);
    }

    #[test]
    fn undecodable_frame_still_counts() {
        let mut relay = new_relay(RelayConfig {
            energest: EnergestCadence::Every(2),
            ..Default::default()
        });
        assert!(deliver(&mut relay, packet(DATA_CHANNEL, &[1, 2, 3])).is_empty());
        let actions = deliver(&mut relay, test_msg(9));
        assert_eq!(actions[0], Action::Signal { value: 9 });
        assert_eq!(actions[1], Action::ReadEnergest);
        assert_eq!(relay.received(), 2);
    }

    #[test]
    fn broadcast_and_foreign_channels() {
        let mut relay = new_relay(RelayConfig::default());
        let frame = TestMsg {
            sequence: 3,
            app_timestamp: 0,
            padding: 44,
            mac_timestamp: 0,
        }
        .encode()
        .unwrap();
        assert_eq!(
            deliver(&mut relay, packet(BROADCAST_CHANNEL, &frame)),
            [Action::Signal { value: 3 }]
        );
        assert!(deliver(&mut relay, packet(BLACK_CHANNEL, &frame)).is_empty());
        assert_eq!(relay.received(), 1);
    }
}
