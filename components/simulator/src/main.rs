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

use anyhow::{bail, Context};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use rand::{RngCore, SeedableRng};
use std::{collections::BTreeMap, env};

use dual_motes::{bus::StrobeDiscipline, EnergestCadence, BLACK_PULSE_WIDTH_US};
use experiment_api::Role;
use experiment_event_writer::RecordFileWriter;

pub use dual_motes::{DualMotesAction, DualMotesInput, Frame, Node, Record};

type Channel = <Node as Role>::Channel;
type NodeId = <Node as Role>::NodeId;
type TimeMs = <Node as Role>::TimeMs;

mod logger;
mod rig;
mod sim;
mod wire;

use crate::rig::{RigKind, RigOptions};
use crate::sim::{PrintedRecord, Radio};

const EVENT_FILE_PATH: &str = "/tmp/dual_motes_events.csv";
const RECORD_FILE_PATH: &str = "/tmp/dual_motes_records.csv";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut rng_seed: u64 = 0;
    let mut simulation_minutes: u64 = 10;
    let mut log_level = log::Level::Info;
    let mut options = RigOptions::default();
    let mut radio = Radio { loss_ppt: 0 };

    if args.len() % 2 == 0 {
        bail!("arguments must be `--flag value` pairs");
    }

    for chunk in args[1..].chunks_exact(2) {
        let (arg, val) = (&chunk[0], &chunk[1]);
        match arg.as_str() {
            "--seed" => {
                rng_seed = val.parse().context("invalid rng seed")?;
            }
            "--time_min" => {
                simulation_minutes = val
                    .parse()
                    .context("invalid number of simulation minutes")?;
            }
            "--log_level" => {
                log_level = val.parse().context("invalid log level")?;
            }
            "--rig" => {
                options.kind = match val.as_str() {
                    "observed" => RigKind::Observed,
                    "black" => RigKind::Black,
                    _ => bail!("unknown rig: {val} (observed, black)"),
                };
            }
            "--io_width" => {
                options.io_width = val.parse().context("invalid io width")?;
            }
            "--energest_every" => {
                options.energest = match val.parse().context("invalid energest cadence")? {
                    0 => EnergestCadence::Never,
                    n => EnergestCadence::Every(n),
                };
            }
            "--jitter" => {
                options.interval.jitter = val.parse().context("jitter must be true or false")?;
            }
            "--interval_ms" => {
                options.interval.average_ms = val.parse().context("invalid send interval")?;
            }
            "--loss_ppt" => {
                radio.loss_ppt = val.parse().context("invalid packet error rate")?;
                if radio.loss_ppt > 1000 {
                    bail!("packet error rate is given in parts per thousand");
                }
            }
            "--strobe" => {
                options.strobe = match val.as_str() {
                    "toggle" => StrobeDiscipline::Toggle,
                    "pulse" => StrobeDiscipline::Pulse {
                        width_us: BLACK_PULSE_WIDTH_US,
                    },
                    _ => bail!("unknown strobe discipline: {val} (toggle, pulse)"),
                };
            }
            _ => bail!("unknown argument: {arg}"),
        }
    }

    let mut nodes = rig::build(&options)?;

    logger::init(log_level, Some(EVENT_FILE_PATH))?;

    let mut record_file = RecordFileWriter::create(RECORD_FILE_PATH)
        .with_context(|| format!("could not create record file {RECORD_FILE_PATH}"))?;

    let records = sim::run(
        &mut nodes,
        simulation_minutes,
        radio,
        get_rng(rng_seed),
        |_, _| true,
        |printed| {
            let line = format!("{}{}", printed.record, printed.record.line_ending());
            print!("{line}");
            if let Err(e) = record_file.write_record(&line) {
                error!("could not write record: {e}");
            }
        },
    );

    record_file.flush().context("could not write record file")?;
    info!(
        "{} records written to {}",
        record_file.records(),
        RECORD_FILE_PATH
    );
    log::logger().flush();

    for ((sink, source), count) in count_records(&records) {
        println!("sink {sink:x} printed {count} records from {source:x}");
    }
    Ok(())
}

fn get_rng(rng_seed: u64) -> impl RngCore {
    println!("RNG seed: {rng_seed:#x}");
    rand_chacha::ChaCha8Rng::seed_from_u64(rng_seed)
}

/// Number of records per sink and source
fn count_records(records: &[PrintedRecord]) -> BTreeMap<(NodeId, NodeId), usize> {
    let mut counts = BTreeMap::new();
    for printed in records {
        let source = experiment_api::RoleRecord::<Node>::get_source(&printed.record);
        *counts.entry((printed.sink, source)).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use crate::rig::*;
    use crate::*;
    use dual_motes::{EnergestMsg, SendInterval, RELAY_ID};

    fn simulate(options: &RigOptions, minutes: u64, loss_ppt: u32) -> Vec<PrintedRecord> {
        // logger::init(log::Level::Trace, Some(EVENT_FILE_PATH)).unwrap();
        let mut nodes = rig::build(options).unwrap();
        sim::run(
            &mut nodes,
            minutes,
            Radio { loss_ppt },
            get_rng(0),
            |_, _| true,
            |_| {},
        )
    }

    /// Sequence numbers the observation sink printed for one observer
    fn observed(records: &[PrintedRecord], observer: NodeId) -> Vec<u16> {
        records
            .iter()
            .filter_map(|p| match p.record {
                Record::Observation(r) if r.source == observer => {
                    Some(r.observation.observed_sequence)
                }
                _ => None,
            })
            .collect()
    }

    fn energest_reports(records: &[PrintedRecord], source: NodeId) -> Vec<EnergestMsg> {
        records
            .iter()
            .filter_map(|p| match p.record {
                Record::Energest(r) if r.source == source => Some(r.report),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn observers_agree_with_sender() {
        let records = simulate(&RigOptions::default(), 2, 0);

        let sent = observed(&records, SENDER_OBSERVER_ID);
        assert!(sent.len() >= 110, "only {} observations", sent.len());
        assert_eq!(sent, (1..=sent.len() as u16).collect::<Vec<_>>());

        let received = observed(&records, RELAY_OBSERVER_ID);
        assert!(received.len() + 1 >= sent.len());
        assert_eq!(received[..], sent[..received.len()]);

        let observer_sequences: Vec<u16> = records
            .iter()
            .filter_map(|p| match p.record {
                Record::Observation(r) if r.source == SENDER_OBSERVER_ID => {
                    Some(r.observation.observer_sequence)
                }
                _ => None,
            })
            .collect();
        assert_eq!(observer_sequences, sent);
    }

    #[test]
    fn energest_every_kth_message() {
        let options = RigOptions {
            energest: EnergestCadence::Every(10),
            ..Default::default()
        };
        let records = simulate(&options, 2, 0);

        for source in [rig::SENDER_ID, RELAY_ID] {
            let reports = energest_reports(&records, source);
            assert!(reports.len() >= 10, "{} reports from {:x}", reports.len(), source);
            for (n, report) in reports.iter().enumerate() {
                assert_eq!(report.sequence, 10 * (n as u16 + 1));
                assert_eq!(report.cpu + report.lpm, report.total_time);
            }
        }
        let sender = energest_reports(&records, rig::SENDER_ID);
        assert!(sender.iter().all(|r| r.transmit >= 40));
        let relay = energest_reports(&records, RELAY_ID);
        assert!(relay.iter().all(|r| r.listen > 0));
    }

    #[test]
    fn losses_show_as_gaps() {
        let records = simulate(&RigOptions::default(), 2, 200);
        for observer in [SENDER_OBSERVER_ID, RELAY_OBSERVER_ID] {
            let seen = observed(&records, observer);
            assert!(!seen.is_empty());
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
        }
        assert!(observed(&records, RELAY_OBSERVER_ID).len() < 110);
    }

    #[test]
    fn black_rig_wraps_at_six_bits() {
        let options = RigOptions {
            kind: RigKind::Black,
            interval: SendInterval {
                average_ms: 500,
                ..Default::default()
            },
            ..Default::default()
        };
        let records = simulate(&options, 1, 0);
        let seen = observed(&records, RELAY_OBSERVER_ID);
        assert!(seen.len() >= 100, "only {} observations", seen.len());
        let expected: Vec<u16> = (1..=seen.len()).map(|s| (s % 64) as u16).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn counts_per_sink_and_source() {
        let records = simulate(&RigOptions::default(), 1, 0);
        let counts = count_records(&records);
        assert!(counts[&(dual_motes::OBSERVATION_SINK_ID, SENDER_OBSERVER_ID)] >= 55);
        assert!(counts.keys().all(|(sink, _)| *sink == dual_motes::OBSERVATION_SINK_ID));
    }
}
