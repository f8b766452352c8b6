// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the ring buffer which keeps the last ticks for post-mortem inspection.
use std::collections::VecDeque;

use crate::controller::control_types::{JointState, Torques};

/// One row of the log contains the joint state of a tick and the command computed from it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Record<const N: usize> {
    /// Joint state the command was computed from.
    pub state: JointState<N>,
    /// Command after saturation. All zero for a tick which failed closed.
    pub command: Torques<N>,
    /// Time step used for the tick in \[s\].
    pub dt: f64,
    /// Whether the tick failed closed.
    pub failed_closed: bool,
}

impl<const N: usize> Record<N> {
    /// creates a string representation based on the debug formatter
    pub fn log(&self) -> String {
        format!("{:?}", self)
    }
}

#[derive(Debug)]
pub(crate) struct Logger<const N: usize> {
    records: VecDeque<Record<N>>,
    log_size: usize,
}

impl<const N: usize> Logger<N> {
    pub fn new(log_size: usize) -> Self {
        Logger {
            records: VecDeque::with_capacity(log_size),
            log_size,
        }
    }
    pub fn log(&mut self, record: Record<N>) {
        if self.log_size == 0 {
            return;
        }
        if self.records.len() == self.log_size {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }
    /// Returns all records, oldest first, and empties the log.
    pub fn flush(&mut self) -> Vec<Record<N>> {
        self.records.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::controller::control_types::{JointState, Torques};
    use crate::controller::logger::{Logger, Record};
    use crate::utils::JointVector;

    fn record(i: u64) -> Record<1> {
        Record {
            state: JointState::new(
                JointVector::<1>::zeros(),
                JointVector::<1>::zeros(),
                Duration::from_millis(i),
            ),
            command: Torques::new(JointVector::<1>::new(i as f64)),
            dt: 0.001,
            failed_closed: false,
        }
    }

    #[test]
    fn keeps_the_newest_records() {
        let mut logger = Logger::<1>::new(3);
        for i in 0..5 {
            logger.log(record(i));
        }
        let records = logger.flush();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].command.tau_J[0], 2.);
        assert_eq!(records[2].state.time, Duration::from_millis(4));
        assert!(logger.flush().is_empty());
        assert!(records[1].log().contains("failed_closed: false"));
    }
}
