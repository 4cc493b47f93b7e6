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

//! Writers for the files an experiment run leaves behind

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

/// Prefix of log lines that carry a parseable event
pub const EVENT_INDICATOR_CHAR: char = '$';

const EVENT_FILE_HEADER: &str = "uptime;node_id;kind;content";

/// Collects `$`-prefixed event log lines in a `;` separated file
pub struct ExperimentEventFileWriter<W: Write = BufWriter<File>> {
    out: W,
}

impl ExperimentEventFileWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> ExperimentEventFileWriter<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "{EVENT_FILE_HEADER}")?;
        Ok(Self { out })
    }

    /// Writes an event log line, lines without the indicator char are skipped
    pub fn write_event(&mut self, line: &str) -> io::Result<()> {
        match line.strip_prefix(EVENT_INDICATOR_CHAR) {
            Some(event) => writeln!(self.out, "{event}"),
            None => Ok(()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Appends sink records to a file exactly as the sink prints them
pub struct RecordFileWriter<W: Write = BufWriter<File>> {
    out: W,
    records: usize,
}

impl RecordFileWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> RecordFileWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, records: 0 }
    }

    /// `record` must already carry its line ending
    pub fn write_record(&mut self, record: &str) -> io::Result<()> {
        self.out.write_all(record.as_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_lose_indicator() {
        let mut writer = ExperimentEventFileWriter::new(Vec::new()).unwrap();
        writer.write_event("$12;3;state;\"Idle\"").unwrap();
        writer.write_event("plain log line").unwrap();
        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out, "uptime;node_id;kind;content\n12;3;state;\"Idle\"\n");
    }

    #[test]
    fn records_are_verbatim() {
        let mut writer = RecordFileWriter::new(Vec::new());
        writer.write_record("e5,5,1,2,3,4,10\n\r").unwrap();
        writer.write_record("e5,6,1,2,3,4,10\n\r").unwrap();
        assert_eq!(writer.records(), 2);
        assert_eq!(
            writer.into_inner(),
            b"e5,5,1,2,3,4,10\n\re5,6,1,2,3,4,10\n\r"
        );
    }
}
