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
    Idle {
        end: TimeMs,
    },
    Signal {
        value: u16,
    },
    SendData {
        channel: Channel,
        destination: Destination<NodeId>,
        frame: Frame,
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
            State::Idle { end } => Action::Wait { end: *end },
            State::Signal { value } => Action::Signal { value: *value },
            State::SendData {
                channel,
                destination,
                frame,
            }
            | State::SendEnergest {
                channel,
                destination,
                frame,
            } => Action::Transmit {
                channel: *channel,
                destination: *destination,
                frame: frame.clone(),
            },
            State::ReadEnergest => Action::ReadEnergest,
        }
    }

    fn state_as_string(&self) -> &str {
        match self {
            State::Reset => "Reset",
            State::Idle { .. } => "Idle",
            State::Signal { .. } => "Signal",
            State::SendData { .. } => "SendData",
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

/// Periodically sends a numbered test message and shows its number to the observer
#[derive(Debug)]
pub struct Sender {
    pub(crate) id: NodeId,
    pub(crate) config: SenderConfig,
    pub(crate) state: State,
    pub(crate) context: Context,
}

impl Sender {
    pub fn new(id: NodeId, config: SenderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id,
            state: State::default(),
            context: Context::new(config.io_width),
            config,
        })
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Sequence number of the latest test message
    pub fn sequence(&self) -> u16 {
        self.context.sequence.current()
    }

    #[must_use]
    pub fn progress(
        &mut self,
        time: TimeMs,
        input: Option<DualMotesInput>,
        rng: impl RngCore,
    ) -> (DualMotesAction, Option<Record>) {
        if let Some(input) = &input {
            event_log_input!(time, self.id, DisplayableInput(input));
        }

        let next_state = self.next(time, input, rng);
        event_log_state!(time, self.id, &next_state);
        self.state = next_state;

        let action = self.state.get_action();
        event_log_action!(time, self.id, DisplayableAction(&action, time));
        (action, None)
    }

    /// Get next state
    #[must_use]
    pub(crate) fn next(
        &mut self,
        time: TimeMs,
        input: Option<DualMotesInput>,
        mut rng: impl RngCore,
    ) -> State {
        match (core::mem::take(&mut self.state), input) {
            (State::Reset, _) => {
                event_log_reset!(time, self.id, "sender");
                self.context.reset();
                self.idle(time, &mut rng)
            }

            (State::Idle { .. }, None) => {
                let sequence = self.context.sequence.advance();
                self.context.sent = self.context.sent.wrapping_add(1);
                if self.config.signal_bus {
                    State::Signal { value: sequence }
                } else {
                    self.send_data(time, &mut rng)
                }
            }
            // woken up early, nothing to do
            (State::Idle { end }, Some(_)) => State::Idle { end },

            (State::Signal { .. }, None) => self.send_data(time, &mut rng),

            (State::SendData { .. }, None) => {
                if self.config.energest.is_due(self.context.sent) {
                    State::ReadEnergest
                } else {
                    self.idle(time, &mut rng)
                }
            }

            (State::ReadEnergest, Some(Input::Energest(counters))) => {
                let report = self
                    .context
                    .energest
                    .report(counters, self.context.sequence.current());
                event_log_msg!(time, self.id, Message::Energest(report));
                match report.encode() {
                    Ok(frame) => State::SendEnergest {
                        channel: self.config.energest_channel,
                        destination: self.config.energest_destination,
                        frame,
                    },
                    Err(e) => {
                        error!("could not encode energest message: {}", e);
                        self.idle(time, &mut rng)
                    }
                }
            }

            (State::SendEnergest { .. }, None) => self.idle(time, &mut rng),

            (state, input) => {
                warn!("unexpected input {:?} in state {}", input, state);
                self.idle(time, &mut rng)
            }
        }
    }

    fn idle(&self, time: TimeMs, rng: impl RngCore) -> State {
        State::Idle {
            end: time + self.config.interval.next_delay(rng),
        }
    }

    fn send_data(&self, time: TimeMs, rng: impl RngCore) -> State {
        let msg = TestMsg {
            sequence: self.context.sequence.current(),
            app_timestamp: time as u16,
            padding: self.config.padding,
            mac_timestamp: 0,
        };
        match msg.encode() {
            Ok(frame) => {
                event_log_msg!(time, self.id, Message::Test(msg));
                State::SendData {
                    channel: self.config.channel,
                    destination: self.config.destination,
                    frame,
                }
            }
            Err(e) => {
                error!("could not encode test message: {}", e);
                self.idle(time, rng)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng as Rng;

    #[derive(Default)]
    struct Trace {
        signals: std::vec::Vec<u16>,
        data: std::vec::Vec<TestMsg>,
        energest: std::vec::Vec<(usize, EnergestMsg)>,
    }

    /// Runs until `sends` test messages went out, energest counters grow by 10 per read
    fn run(sender: &mut Sender, sends: usize) -> Trace {
        let mut trace = Trace::default();
        let mut time = 0;
        let mut input = None;
        let mut counters = Energest::default();
        while trace.data.len() < sends || !matches!(sender.state, State::Idle { .. }) {
            let (action, record) = sender.progress(time, input.take(), Rng);
            assert!(record.is_none());
            match action {
                Action::None => {}
                Action::Wait { end } => time = end,
                Action::Signal { value } => trace.signals.push(value),
                Action::Transmit { frame, .. } if frame.len() == ENERGEST_MSG_SIZE => trace
                    .energest
                    .push((trace.data.len(), EnergestMsg::decode(&frame).unwrap())),
                Action::Transmit { frame, .. } => trace.data.push(TestMsg::decode(&frame).unwrap()),
                Action::ReadEnergest => {
                    counters.cpu += 10;
                    counters.total += 10;
                    input = Some(Input::Energest(counters));
                }
                action => panic!("unexpected action {:?}", action),
            }
        }
        trace
    }

    #[test]
    fn tick_signals_before_sending() {
        let mut sender = Sender::new(1, SenderConfig::default()).unwrap();
        assert_eq!(sender.progress(0, None, Rng).0, Action::Wait { end: 1000 });
        assert_eq!(
            sender.progress(1000, None, Rng).0,
            Action::Signal { value: 1 }
        );
        let (action, _) = sender.progress(1000, None, Rng);
        let Action::Transmit {
            channel,
            destination,
            frame,
        } = action
        else {
            panic!("expected transmit");
        };
        assert_eq!(channel, DATA_CHANNEL);
        assert_eq!(destination, Destination::Unicast(RELAY_ID));
        assert_eq!(frame.len(), 88);
        let msg = TestMsg::decode(&frame).unwrap();
        assert_eq!((msg.sequence, msg.app_timestamp), (1, 1000));
        assert_eq!(sender.progress(1000, None, Rng).0, Action::Wait { end: 2000 });
    }

    #[test]
    fn signalled_sequence_wraps_with_bus() {
        let mut sender = Sender::new(
            1,
            SenderConfig {
                io_width: 6,
                energest: EnergestCadence::Never,
                ..Default::default()
            },
        )
        .unwrap();
        let trace = run(&mut sender, 70);
        let expected: std::vec::Vec<u16> = (1..64).chain(0..7).collect();
        assert_eq!(trace.signals, expected);
        let sent: std::vec::Vec<u16> = trace.data.iter().map(|m| m.sequence).collect();
        assert_eq!(sent, expected);
    }

    #[test]
    fn energest_every_kth_send() {
        let mut sender = Sender::new(
            1,
            SenderConfig {
                energest: EnergestCadence::Every(5),
                ..Default::default()
            },
        )
        .unwrap();
        let trace = run(&mut sender, 15);
        let after: std::vec::Vec<_> = trace.energest.iter().map(|(n, _)| *n).collect();
        assert_eq!(after, [5, 10, 15]);
        let (_, first) = trace.energest[0];
        assert_eq!((first.sequence, first.cpu, first.total_time), (5, 10, 10));
        let (_, second) = trace.energest[1];
        assert_eq!((second.sequence, second.cpu), (10, 10));
    }

    #[test]
    fn without_bus() {
        let mut sender = Sender::new(
            1,
            SenderConfig {
                signal_bus: false,
                ..Default::default()
            },
        )
        .unwrap();
        let trace = run(&mut sender, 3);
        assert!(trace.signals.is_empty());
        assert_eq!(trace.data.len(), 3);
        assert_eq!(sender.sequence(), 3);
    }

    #[test]
    fn jittered_ticks() {
        let mut sender = Sender::new(
            1,
            SenderConfig {
                interval: SendInterval {
                    average_ms: 100,
                    min_ms: 8,
                    jitter: true,
                },
                ..Default::default()
            },
        )
        .unwrap();
        for _ in 0..20 {
            let Action::Wait { end } = sender.progress(0, None, Rng).0 else {
                panic!("expected wait");
            };
            assert!((8..8 + 184).contains(&end));
            sender.state = State::Reset;
        }
    }

    #[test]
    fn invalid_config() {
        let config = SenderConfig {
            io_width: 0,
            ..Default::default()
        };
        assert_eq!(Sender::new(1, config).unwrap_err(), ConfigError::IoWidth(0));
    }
}
