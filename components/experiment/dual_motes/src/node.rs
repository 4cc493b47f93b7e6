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

/// A mote of the experiment in one of its roles
#[derive(Debug)]
pub enum Node {
    Sender(Sender),
    Relay(Relay),
    Observer(Observer),
    Sink(Sink),
}

impl experiment_api::Role for Node {
    type TimeMs = TimeMs;
    type NodeId = NodeId;
    type Channel = Channel;
    type Frame = Frame;
    type Record = Record;

    fn progress<T: RngCore>(
        &mut self,
        time: Self::TimeMs,
        input: Option<DualMotesInput>,
        rng: T,
    ) -> (DualMotesAction, Option<Self::Record>) {
        match self {
            Node::Sender(n) => n.progress(time, input, rng),
            Node::Relay(n) => n.progress(time, input, rng),
            Node::Observer(n) => n.progress(time, input, rng),
            Node::Sink(n) => n.progress(time, input, rng),
        }
    }

    fn id(&self) -> Self::NodeId {
        match self {
            Node::Sender(n) => n.id,
            Node::Relay(n) => n.id,
            Node::Observer(n) => n.id,
            Node::Sink(n) => n.id,
        }
    }
}

impl Node {
    pub fn role(&self) -> &'static str {
        match self {
            Node::Sender(_) => "sender",
            Node::Relay(_) => "relay",
            Node::Observer(_) => "observer",
            Node::Sink(n) => match n.config.kind {
                SinkKind::Energest => "energest_sink",
                SinkKind::Observation => "observation_sink",
            },
        }
    }

    /// Radio parameters of the node's role
    pub fn radio(&self) -> RadioConfig {
        match self {
            Node::Sender(n) => n.config.radio,
            Node::Relay(n) => n.config.radio,
            Node::Observer(n) => n.config.radio,
            Node::Sink(n) => n.config.radio,
        }
    }
}

impl From<Sender> for Node {
    fn from(n: Sender) -> Self {
        Node::Sender(n)
    }
}

impl From<Relay> for Node {
    fn from(n: Relay) -> Self {
        Node::Relay(n)
    }
}

impl From<Observer> for Node {
    fn from(n: Observer) -> Self {
        Node::Observer(n)
    }
}

impl From<Sink> for Node {
    fn from(n: Sink) -> Self {
        Node::Sink(n)
    }
}

pub(crate) struct DisplayableAction<'a>(pub(crate) &'a DualMotesAction, pub(crate) TimeMs);

/// action as JSON to make it parseable
macro_rules! action_to_json_string {
    ($fmt:expr,$write:tt,$action:expr,$time:expr) => {
        match $action {
            Action::None => $write!($fmt, "{{\"kind\":\"none\"}}"),
            Action::Wait { end } => $write!(
                $fmt,
                "{{\"kind\":\"wait\",\"duration\":{}}}",
                *end as i64 - $time as i64
            ),
            Action::Receive { end: Some(end) } => $write!(
                $fmt,
                "{{\"kind\":\"receive\",\"duration\":{}}}",
                *end as i64 - $time as i64
            ),
            Action::Receive { end: None } => $write!($fmt, "{{\"kind\":\"receive\"}}"),
            Action::Signal { value } => {
                $write!($fmt, "{{\"kind\":\"signal\",\"value\":{}}}", value)
            }
            Action::Sample => $write!($fmt, "{{\"kind\":\"sample\"}}"),
            Action::ReadEnergest => $write!($fmt, "{{\"kind\":\"read_energest\"}}"),
            Action::Transmit {
                channel,
                destination: Destination::Unicast(destination),
                frame,
            } => $write!(
                $fmt,
                "{{\"kind\":\"transmit\",\"channel\":{},\"destination\":{},\"size\":{}}}",
                channel,
                destination,
                frame.len()
            ),
            Action::Transmit {
                channel,
                destination: Destination::Broadcast,
                frame,
            } => $write!(
                $fmt,
                "{{\"kind\":\"transmit\",\"channel\":{},\"destination\":\"broadcast\",\"size\":{}}}",
                channel,
                frame.len()
            ),
        }
    };
}

impl core::fmt::Display for DisplayableAction<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        action_to_json_string!(f, write, self.0, self.1)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DisplayableAction<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        use defmt::write;
        action_to_json_string!(fmt, write, self.0, self.1)
    }
}

pub(crate) struct DisplayableInput<'a>(pub(crate) &'a DualMotesInput);

/// input as JSON to make it parseable
macro_rules! input_to_json_string {
    ($fmt:expr,$write:tt,$input:expr) => {
        match $input {
            Input::Packet {
                source,
                channel,
                frame,
                link_timestamp,
            } => $write!(
                $fmt,
                "{{\"kind\":\"packet\",\"source\":{},\"channel\":{},\"size\":{},\"link_timestamp\":{}}}",
                source,
                channel,
                frame.len(),
                link_timestamp
            ),
            Input::Strobe { value } => {
                $write!($fmt, "{{\"kind\":\"strobe\",\"value\":{}}}", value)
            }
            Input::Sample { value } => {
                $write!($fmt, "{{\"kind\":\"sample\",\"value\":{}}}", value)
            }
            Input::Energest(Energest {
                cpu,
                lpm,
                transmit,
                listen,
                total,
            }) => $write!(
                $fmt,
                "{{\"kind\":\"energest\",\"cpu\":{},\"lpm\":{},\"transmit\":{},\"listen\":{},\"total\":{}}}",
                cpu,
                lpm,
                transmit,
                listen,
                total
            ),
        }
    };
}

impl core::fmt::Display for DisplayableInput<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        input_to_json_string!(f, write, self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DisplayableInput<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        use defmt::write;
        input_to_json_string!(fmt, write, self.0)
    }
}
