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

/// Width of the observer's own sequence number
const OBSERVER_SEQUENCE_WIDTH: u8 = 16;

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum State {
    #[default]
    Reset,
    Idle {
        next_sample: TimeMs,
    },
    Sample {
        next_sample: TimeMs,
    },
    SendObservation {
        channel: Channel,
        destination: Destination<NodeId>,
        frame: Frame,
        next_sample: TimeMs,
    },
}

impl State {
    /// Returns a state's action
    pub(crate) fn get_action(&self) -> DualMotesAction {
        match self {
            State::Reset => Action::None,
            State::Idle { next_sample } => Action::Wait { end: *next_sample },
            State::Sample { .. } => Action::Sample,
            State::SendObservation {
                channel,
                destination,
                frame,
                next_sample: _,
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
            State::Idle { .. } => "Idle",
            State::Sample { .. } => "Sample",
            State::SendObservation { .. } => "SendObservation",
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

/// Samples its ADC and reports every value the observed node shows on the bus
#[derive(Debug)]
pub struct Observer {
    pub(crate) id: NodeId,
    pub(crate) config: ObserverConfig,
    pub(crate) state: State,
    pub(crate) context: Context,
}

impl Observer {
    pub fn new(id: NodeId, config: ObserverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id,
            state: State::default(),
            context: Context::new(OBSERVER_SEQUENCE_WIDTH),
            config,
        })
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
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
                event_log_reset!(time, self.id, "observer");
                self.context.reset();
                self.context.last_report = time;
                State::Idle {
                    next_sample: time + self.config.sample_interval_ms,
                }
            }

            (State::Idle { next_sample }, None) => State::Sample { next_sample },
            (State::Idle { next_sample }, Some(Input::Strobe { value })) => {
                self.observe(time, value, next_sample)
            }
            (State::Idle { next_sample }, Some(_)) => State::Idle { next_sample },

            (State::Sample { next_sample }, Some(Input::Sample { value })) => {
                self.context.samples.add(value);
                State::Idle {
                    next_sample: self.schedule_after(next_sample, time),
                }
            }

            (State::SendObservation { next_sample, .. }, None) => State::Idle {
                next_sample: next_sample.max(time),
            },

            (state, input) => {
                warn!("unexpected input {:?} in state {}", input, state);
                State::Idle {
                    next_sample: time + self.config.sample_interval_ms,
                }
            }
        }
    }

    /// Next sample time on the grid started at reset, skipping samples that are already late
    fn schedule_after(&self, previous: TimeMs, time: TimeMs) -> TimeMs {
        let interval = self.config.sample_interval_ms;
        let next = previous + interval;
        if next > time {
            next
        } else {
            next + (time - next) / interval * interval + interval
        }
    }

    fn observe(&mut self, time: TimeMs, value: u16, next_sample: TimeMs) -> State {
        let samples = self.context.samples.take();
        let msg = WhiteMsg {
            observed_sequence: value & bus::mask(self.config.io_width),
            observer_sequence: self.context.sequence.advance(),
            energy: samples.sum,
            sample_count: samples.count,
            app_timestamp: time.wrapping_sub(self.context.last_report) as u32,
            mac_timestamp: 0,
        };
        self.context.last_report = time;
        event_log_msg!(time, self.id, Message::White(msg));
        match msg.encode(self.config.timestamp_width) {
            Ok(frame) => State::SendObservation {
                channel: self.config.channel,
                destination: self.config.destination,
                frame,
                next_sample,
            },
            Err(e) => {
                error!("could not encode observation: {}", e);
                State::Idle { next_sample }
            }
        }
    }
}
