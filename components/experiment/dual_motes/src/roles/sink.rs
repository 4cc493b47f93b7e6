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
}

impl State {
    /// Returns a state's action
    pub(crate) fn get_action(&self) -> DualMotesAction {
        match self {
            State::Reset => Action::None,
            State::Listen => Action::Receive { end: None },
        }
    }

    fn state_as_string(&self) -> &str {
        match self {
            State::Reset => "Reset",
            State::Listen => "Listen",
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

/// Turns every received frame into a console record
#[derive(Debug)]
pub struct Sink {
    pub(crate) id: NodeId,
    pub(crate) config: SinkConfig,
    pub(crate) state: State,
    pub(crate) context: Context,
    /// Record of the frame handled by the last state transition
    pub(crate) record: Option<Record>,
}

impl Sink {
    pub fn new(id: NodeId, config: SinkConfig) -> Self {
        Self {
            id,
            config,
            state: State::default(),
            context: Context::new(MAX_IO_WIDTH as u8),
            record: None,
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Number of frames received on the sink's channel
    pub fn received(&self) -> u16 {
        self.context.received as u16
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

        let record = self.record.take();
        if let Some(record) = &record {
            event_log_record!(time, self.id, record);
        }

        let action = self.state.get_action();
        event_log_action!(time, self.id, DisplayableAction(&action, time));
        (action, record)
    }

    /// Get next state
    #[must_use]
    pub(crate) fn next(&mut self, time: TimeMs, input: Option<DualMotesInput>) -> State {
        match (core::mem::take(&mut self.state), input) {
            (State::Reset, _) => {
                event_log_reset!(time, self.id, "sink");
                self.context.reset();
                State::Listen
            }

            (
                State::Listen,
                Some(Input::Packet {
                    source,
                    channel,
                    frame,
                    link_timestamp,
                }),
            ) if channel == self.config.channel => {
                self.context.received = self.context.received.wrapping_add(1);
                let record = match self.config.kind {
                    SinkKind::Energest => EnergestMsg::decode(&frame).map(|report| {
                        event_log_msg!(time, self.id, Message::Energest(report));
                        Record::Energest(EnergestRecord { source, report })
                    }),
                    SinkKind::Observation => WhiteMsg::decode(&frame).map(|observation| {
                        event_log_msg!(time, self.id, Message::White(observation));
                        Record::Observation(ObservationRecord {
                            source,
                            sink_sequence: self.context.received as u16,
                            observation,
                            packet_timestamp: link_timestamp,
                            rtime: time as u32,
                        })
                    }),
                };
                match record {
                    Ok(record) => self.record = Some(record),
                    Err(e) => warn!("dropping frame from {}: {}", source, e),
                }
                State::Listen
            }

            (State::Listen, input) => {
                if let Some(input) = input {
                    debug!("ignoring {:?}", input);
                }
                State::Listen
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng as Rng;

    fn packet(channel: Channel, frame: &[u8]) -> DualMotesInput {
        Input::Packet {
            source: 0xe5,
            channel,
            frame: Frame::from_slice(frame).unwrap(),
            link_timestamp: 77,
        }
    }

    fn started(kind: SinkKind) -> Sink {
        let mut sink = Sink::new(0x9b, SinkConfig::new(kind));
        assert_eq!(sink.progress(0, None, Rng), (Action::Receive { end: None }, None));
        sink
    }

    #[test]
    fn energest_records() {
        let mut sink = started(SinkKind::Energest);
        let report = EnergestMsg {
            cpu: 1,
            lpm: 2,
            transmit: 3,
            listen: 4,
            sequence: 100,
            total_time: 10,
        };
        let (action, record) =
            sink.progress(5, Some(packet(DATA_CHANNEL, &report.encode().unwrap())), Rng);
        assert_eq!(action, Action::Receive { end: None });
        let record = record.unwrap();
        assert_eq!(record.to_string(), "e5,100,1,2,3,4,10");
        assert_eq!(RoleRecord::<Node>::get_source(&record), 0xe5);
    }

    #[test]
    fn observation_records_count_arrivals() {
        let mut sink = started(SinkKind::Observation);
        let observation = WhiteMsg {
            observed_sequence: 5,
            observer_sequence: 2,
            energy: 100,
            sample_count: 10,
            app_timestamp: 80,
            mac_timestamp: 0,
        };
        let frame = observation.encode(TimestampWidth::U16).unwrap();
        let _ = sink.progress(10, Some(packet(DATA_CHANNEL, &[0; 3])), Rng);
        let (_, record) = sink.progress(1234, Some(packet(DATA_CHANNEL, &frame)), Rng);
        assert_eq!(
            record,
            Some(Record::Observation(ObservationRecord {
                source: 0xe5,
                sink_sequence: 2,
                observation,
                packet_timestamp: 77,
                rtime: 1234,
            }))
        );
        assert_eq!(sink.received(), 2);
    }

    #[test]
    fn other_channels_are_ignored() {
        let mut sink = started(SinkKind::Observation);
        let (_, record) = sink.progress(1, Some(packet(BROADCAST_CHANNEL, &[0; 16])), Rng);
        assert!(record.is_none());
        assert_eq!(sink.received(), 0);
    }
}
