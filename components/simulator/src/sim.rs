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

use std::{cmp::Ordering, collections::BinaryHeap, convert::Infallible, time::Duration};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use rand::RngCore;

use dual_motes::{
    bus::{BusError, BusWriter},
    EnergestMeter, ProcessorState, RadioState, MAX_FRAME_SIZE,
};
use experiment_api::{Action, Destination, Input, Role};

use crate::wire::{BusTap, NoDelay, SimPin};
use crate::*;

/// Transmission time of one byte at 250 kbit/s
const BYTE_TIME_US: u64 = 32;
/// Preamble, start of frame delimiter, length and checksum
const PHY_OVERHEAD_BYTES: u64 = 8;

/// Time a frame of `size` bytes spends in the air, rounded up to whole milliseconds
pub fn time_on_air(size: usize) -> TimeMs {
    ((size.min(MAX_FRAME_SIZE) as u64 + PHY_OVERHEAD_BYTES) * BYTE_TIME_US).div_ceil(1000)
}

/// What the node is doing while no event is scheduled for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Executing an action, inputs other than its result are held back
    Busy,
    Waiting,
    Listening,
}

/// Node with the hardware around it
pub struct SimNode {
    node: Node,
    activity: Activity,
    /// Invalidates scheduled wake ups of an earlier action
    generation: u32,
    bus: Option<BusWriter<SimPin, SimPin>>,
    tap: Option<BusTap>,
    strobe_pending: bool,
    /// Board whose radio the analog input measures
    measures: Option<usize>,
    radio: RadioState,
    meter: EnergestMeter,
}

impl SimNode {
    pub fn new(node: impl Into<Node>) -> Self {
        Self {
            node: node.into(),
            activity: Activity::Busy,
            generation: 0,
            bus: None,
            tap: None,
            strobe_pending: false,
            measures: None,
            radio: RadioState::Off,
            meter: EnergestMeter::new(0),
        }
    }

    pub fn with_bus(mut self, bus: BusWriter<SimPin, SimPin>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Attaches the observing end of a bus and the analog input to board `observed`
    pub fn with_tap(mut self, tap: BusTap, observed: usize) -> Self {
        self.tap = Some(tap);
        self.measures = Some(observed);
        self
    }

    #[doc(alias = "dual_motes::Node::id")]
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn role(&self) -> &'static str {
        self.node.role()
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    /// Latches a strobe edge seen on the tap, returns whether a delivery has to be scheduled
    fn notice_strobe(&mut self) -> bool {
        let strobed = self.tap.as_mut().is_some_and(|tap| tap.strobed());
        if strobed && !self.strobe_pending {
            self.strobe_pending = true;
            return true;
        }
        false
    }

    /// Reads the bus for a latched strobe once the node is idle, the latest value wins
    fn take_strobe(&mut self) -> Option<Result<u16, BusError<Infallible>>> {
        if !self.strobe_pending || self.activity == Activity::Busy {
            return None;
        }
        self.strobe_pending = false;
        self.tap.as_mut().map(|tap| tap.read())
    }

    fn set_radio(&mut self, radio: RadioState, time: TimeMs) {
        self.radio = radio;
        self.meter.set_radio(radio, time);
    }

    #[must_use]
    #[doc(alias = "dual_motes::Node::progress")]
    pub fn progress(
        &mut self,
        time: TimeMs,
        input: Option<DualMotesInput>,
        rng: impl RngCore,
    ) -> (DualMotesAction, Option<Record>) {
        self.meter.set_processor(ProcessorState::Cpu, time);
        let (action, record) = self.node.progress(time, input, rng);

        self.generation = self.generation.wrapping_add(1);
        self.activity = match action {
            Action::Wait { .. } => Activity::Waiting,
            Action::Receive { .. } => Activity::Listening,
            _ => Activity::Busy,
        };
        match self.activity {
            Activity::Busy => {}
            Activity::Waiting => {
                self.meter.set_processor(ProcessorState::Lpm, time);
                self.set_radio(RadioState::Off, time);
            }
            Activity::Listening => {
                self.meter.set_processor(ProcessorState::Lpm, time);
                self.set_radio(RadioState::Listen, time);
            }
        }

        (action, record)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// End of a wait or receive window
    Wake { generation: u32 },
    /// Result of the node's previous action
    Answer(DualMotesInput),
    Strobe,
    /// Frame left the node's antenna completely
    TransmitDone {
        channel: Channel,
        destination: Destination<NodeId>,
        frame: Frame,
    },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub time: TimeMs,
    /// Keeps events of the same time in the order they were scheduled
    seq: u64,
    pub node: usize,
    pub kind: EventKind,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed to make the max-heap pop the earliest event first
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.seq) == (other.time, other.seq)
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    seq: u64,
}

impl EventQueue {
    pub fn push(&mut self, time: TimeMs, node: usize, kind: EventKind) {
        self.seq += 1;
        self.heap.push(Event {
            time,
            seq: self.seq,
            node,
            kind,
        });
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }
}

/// Radio channel shared by all nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Radio {
    /// Probability of losing a frame in parts per thousand
    pub loss_ppt: u32,
}

/// Sink record together with when and where it was printed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintedRecord {
    pub time: TimeMs,
    pub sink: NodeId,
    pub record: Record,
}

/// Analog reading of a board's supply current, depends on what its radio does
fn adc_sample(radio: RadioState, mut rng: impl RngCore) -> u16 {
    let level = match radio {
        RadioState::Off => 120,
        RadioState::Listen => 1800,
        RadioState::Transmit => 2400,
    };
    level + (rng.next_u32() % 32) as u16
}

/// Runs all nodes for `minutes` of simulated time
pub fn run(
    nodes: &mut [SimNode],
    minutes: u64,
    radio: Radio,
    mut rng: impl RngCore,
    mut check_visibility: impl FnMut(&SimNode, &SimNode) -> bool,
    mut on_record: impl FnMut(&PrintedRecord),
) -> Vec<PrintedRecord> {
    let mut queue = EventQueue::default();
    let mut records = Vec::new();
    let end = minutes * 60 * 1000;

    for i in 0..nodes.len() {
        queue.push(0, i, EventKind::Wake { generation: 0 });
    }

    while let Some(event) = queue.pop() {
        let time = event.time;
        if time > end {
            break;
        }
        let i = event.node;

        let input = match event.kind {
            EventKind::Wake { generation } => {
                if generation != nodes[i].generation {
                    // the node was woken up earlier by an input
                    continue;
                }
                None
            }
            EventKind::Answer(input @ Input::Packet { .. })
                if nodes[i].activity != Activity::Listening =>
            {
                debug!("node {:x} stopped listening, dropping {:?}", nodes[i].id(), input);
                continue;
            }
            EventKind::Answer(input) => Some(input),
            // a busy node reads the bus once it is idle again
            EventKind::Strobe => match nodes[i].take_strobe() {
                Some(Ok(value)) => Some(Input::Strobe { value }),
                Some(Err(e)) => {
                    error!("node {:x} could not read bus: {}", nodes[i].id(), e);
                    continue;
                }
                None => continue,
            },
            EventKind::TransmitDone {
                channel,
                destination,
                frame,
            } => {
                nodes[i].set_radio(RadioState::Off, time);
                deliver(
                    time,
                    i,
                    channel,
                    destination,
                    &frame,
                    nodes,
                    &mut queue,
                    radio,
                    &mut check_visibility,
                    &mut rng,
                );
                None
            }
        };

        info!(
            "{:=^30}{:=^30}",
            format!(" node {:x} ", nodes[i].id()),
            format!(" {:>9?} ({}ms) ", Duration::from_millis(time), time)
        );

        let (action, record) = nodes[i].progress(time, input, &mut rng);

        if let Some(record) = record {
            let printed = PrintedRecord {
                time,
                sink: nodes[i].id(),
                record,
            };
            on_record(&printed);
            records.push(printed);
        }

        let generation = nodes[i].generation;
        match action {
            Action::None => queue.push(time, i, EventKind::Wake { generation }),
            Action::Wait { end } | Action::Receive { end: Some(end) } => {
                assert!(end >= time, "end of action is in the past ({end} < {time})");
                queue.push(end, i, EventKind::Wake { generation });
            }
            Action::Receive { end: None } => {}
            Action::Signal { value } => {
                let node = &mut nodes[i];
                match node.bus.as_mut().map(|bus| bus.write(value, &mut NoDelay)) {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!("node {:x} could not signal: {}", node.id(), e),
                    None => debug!("node {:x} has no bus attached", node.id()),
                }
                queue.push(time, i, EventKind::Wake { generation });
                // the observers notice the strobe
                for (j, observer) in nodes.iter_mut().enumerate() {
                    if observer.notice_strobe() {
                        queue.push(time, j, EventKind::Strobe);
                    }
                }
            }
            Action::Sample => {
                let radio = nodes[i]
                    .measures
                    .map(|observed| nodes[observed].radio)
                    .unwrap_or(RadioState::Off);
                let value = adc_sample(radio, &mut rng);
                queue.push(time, i, EventKind::Answer(Input::Sample { value }));
            }
            Action::ReadEnergest => {
                let counters = nodes[i].meter.snapshot(time);
                queue.push(time, i, EventKind::Answer(Input::Energest(counters)));
            }
            Action::Transmit {
                channel,
                destination,
                frame,
            } => {
                nodes[i].set_radio(RadioState::Transmit, time);
                queue.push(
                    time + time_on_air(frame.len()),
                    i,
                    EventKind::TransmitDone {
                        channel,
                        destination,
                        frame,
                    },
                );
            }
        }

        if nodes[i].activity != Activity::Busy && nodes[i].strobe_pending {
            queue.push(time, i, EventKind::Strobe);
        }
    }

    records
}

/// Hands a frame to every node in range that listens
#[allow(clippy::too_many_arguments)]
fn deliver(
    time: TimeMs,
    sender: usize,
    channel: Channel,
    destination: Destination<NodeId>,
    frame: &Frame,
    nodes: &[SimNode],
    queue: &mut EventQueue,
    radio: Radio,
    mut check_visibility: impl FnMut(&SimNode, &SimNode) -> bool,
    mut rng: impl RngCore,
) {
    let source = nodes[sender].id();
    for (j, node) in nodes.iter().enumerate() {
        if j == sender
            || node.activity != Activity::Listening
            || !destination.accepts(&node.id())
            || !check_visibility(&nodes[sender], node)
        {
            continue;
        }
        if rng.next_u32() % 1000 < radio.loss_ppt {
            warn!("packet error simulation: dropping frame from {source:x} to {:x}", node.id());
            continue;
        }
        debug!("forwarding frame from {:x} to {:x}", source, node.id());
        queue.push(
            time,
            j,
            EventKind::Answer(Input::Packet {
                source,
                channel,
                frame: frame.clone(),
                link_timestamp: time as u16,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire;
    use dual_motes::{
        bus::{Edge, StrobeDiscipline, OBSERVED_BUS},
        Observer, ObserverConfig,
    };
    use rand::rngs::mock::StepRng;

    #[test]
    fn frames_take_milliseconds() {
        assert_eq!(time_on_air(0), 1);
        assert_eq!(time_on_air(24), 2);
        assert_eq!(time_on_air(88), 4);
        assert_eq!(time_on_air(127), 5);
    }

    #[test]
    fn queue_is_fifo_among_equal_times() {
        let mut queue = EventQueue::default();
        queue.push(5, 1, EventKind::Strobe);
        queue.push(3, 2, EventKind::Strobe);
        queue.push(5, 3, EventKind::Strobe);
        queue.push(3, 4, EventKind::Strobe);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|e| (e.time, e.node))
            .collect();
        assert_eq!(order, [(3, 2), (3, 4), (5, 1), (5, 3)]);
    }

    #[test]
    fn strobe_while_busy_is_kept() {
        let (mut bus, tap) =
            wire::connect(&OBSERVED_BUS, 11, StrobeDiscipline::Toggle, Edge::Any).unwrap();
        let observer = Observer::new(0x11, ObserverConfig::default()).unwrap();
        let mut node = SimNode::new(observer).with_tap(tap, 0);
        assert_eq!(node.activity(), Activity::Busy);

        bus.write(3, &mut NoDelay).unwrap();
        assert!(node.notice_strobe());
        assert!(node.take_strobe().is_none());

        // a second edge before the node is idle replaces the value
        bus.write(4, &mut NoDelay).unwrap();
        assert!(!node.notice_strobe());

        let (action, _) = node.progress(0, None, StepRng::new(0, 1));
        assert_eq!(action, Action::Wait { end: 8 });
        assert!(matches!(node.take_strobe(), Some(Ok(4))));
        assert!(node.take_strobe().is_none());
    }
}
