//! A simulated line-access layer for exercising the control loops without
//! hardware.
//!
//! Every operation is appended to one shared event log, sleeps included, so a
//! test can check the exact order of writes and delays. The recording sleeper
//! can request shutdown after a given number of sleeps to stand in for Ctrl-C.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use crate::line::{GpioBackend, LineRequestConfig, OutputLine};
use crate::shutdown::{Shutdown, Sleeper};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    OpenChip { chip: String },
    Request { chip: String, offset: u32, consumer: String },
    Set { chip: String, offset: u32, value: u8 },
    Release { chip: String, offset: u32 },
    Sleep(Duration),
}

#[derive(thiserror::Error, Debug)]
pub enum SimError {
    #[error("no such chip {0}")]
    NoSuchChip(String),
    #[error("offset {offset} out of range for {chip}")]
    InvalidOffset { chip: String, offset: u32 },
    #[error("line {offset} on {chip} is already claimed")]
    Busy { chip: String, offset: u32 },
    #[error("write to line {offset} on {chip} failed")]
    WriteFailed { chip: String, offset: u32 },
}

#[derive(Default)]
struct SimState {
    chips: HashMap<String, u32>,
    claimed: HashSet<(String, u32)>,
    faulty: HashSet<(String, u32)>,
    events: Vec<Event>,
    sleeps: usize,
    interrupt: Option<(usize, Shutdown)>,
}

#[derive(Clone, Default)]
pub struct SimGpio {
    state: Rc<RefCell<SimState>>,
}

pub struct SimChip {
    path: String,
    lines: u32,
}

pub struct SimLineRef {
    chip: String,
    offset: u32,
}

pub struct SimLine {
    chip: String,
    offset: u32,
    state: Rc<RefCell<SimState>>,
}

pub struct SimSleeper {
    state: Rc<RefCell<SimState>>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chip with `lines` lines at `path`.
    pub fn with_chip(self, path: &str, lines: u32) -> Self {
        self.state.borrow_mut().chips.insert(path.to_string(), lines);
        self
    }

    /// Mark a line as held by another process.
    pub fn claim_externally(&self, chip: &str, offset: u32) {
        self.state
            .borrow_mut()
            .claimed
            .insert((chip.to_string(), offset));
    }

    /// Make every subsequent write to the line fail.
    pub fn fail_writes(&self, chip: &str, offset: u32) {
        self.state
            .borrow_mut()
            .faulty
            .insert((chip.to_string(), offset));
    }

    /// Request `shutdown` once `sleeps` sleeps have been recorded.
    pub fn interrupt_after_sleeps(&self, sleeps: usize, shutdown: &Shutdown) {
        self.state.borrow_mut().interrupt = Some((sleeps, shutdown.clone()));
    }

    pub fn sleeper(&self) -> SimSleeper {
        SimSleeper {
            state: self.state.clone(),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// Values written to one line, in order.
    pub fn values(&self, chip: &str, offset: u32) -> Vec<u8> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Set {
                    chip: c,
                    offset: o,
                    value,
                } if c == chip && *o == offset => Some(*value),
                _ => None,
            })
            .collect()
    }

    pub fn set_count(&self) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, Event::Set { .. }))
            .count()
    }

    pub fn releases(&self, chip: &str, offset: u32) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, Event::Release { chip: c, offset: o } if c == chip && *o == offset))
            .count()
    }

    pub fn is_claimed(&self, chip: &str, offset: u32) -> bool {
        self.state
            .borrow()
            .claimed
            .contains(&(chip.to_string(), offset))
    }
}

impl GpioBackend for SimGpio {
    type Chip = SimChip;
    type Line = SimLineRef;
    type Handle = SimLine;
    type Error = SimError;

    fn open_chip(&mut self, path: &str) -> Result<SimChip, SimError> {
        let mut state = self.state.borrow_mut();
        let lines = *state
            .chips
            .get(path)
            .ok_or_else(|| SimError::NoSuchChip(path.to_string()))?;
        state.events.push(Event::OpenChip {
            chip: path.to_string(),
        });
        Ok(SimChip {
            path: path.to_string(),
            lines,
        })
    }

    fn get_line(&mut self, chip: &mut SimChip, offset: u32) -> Result<SimLineRef, SimError> {
        if offset >= chip.lines {
            return Err(SimError::InvalidOffset {
                chip: chip.path.clone(),
                offset,
            });
        }
        Ok(SimLineRef {
            chip: chip.path.clone(),
            offset,
        })
    }

    fn request(
        &mut self,
        line: SimLineRef,
        config: &LineRequestConfig,
    ) -> Result<SimLine, SimError> {
        let mut state = self.state.borrow_mut();
        if !state.claimed.insert((line.chip.clone(), line.offset)) {
            return Err(SimError::Busy {
                chip: line.chip,
                offset: line.offset,
            });
        }
        state.events.push(Event::Request {
            chip: line.chip.clone(),
            offset: line.offset,
            consumer: config.consumer.clone(),
        });
        Ok(SimLine {
            chip: line.chip,
            offset: line.offset,
            state: self.state.clone(),
        })
    }
}

impl OutputLine for SimLine {
    type Error = SimError;

    fn set_value(&mut self, value: u8) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        if state.faulty.contains(&(self.chip.clone(), self.offset)) {
            return Err(SimError::WriteFailed {
                chip: self.chip.clone(),
                offset: self.offset,
            });
        }
        state.events.push(Event::Set {
            chip: self.chip.clone(),
            offset: self.offset,
            value,
        });
        Ok(())
    }

    fn release(self) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        state.claimed.remove(&(self.chip.clone(), self.offset));
        state.events.push(Event::Release {
            chip: self.chip,
            offset: self.offset,
        });
        Ok(())
    }
}

impl Sleeper for SimSleeper {
    fn sleep(&mut self, duration: Duration) {
        let mut state = self.state.borrow_mut();
        state.events.push(Event::Sleep(duration));
        state.sleeps += 1;
        if let Some((after, shutdown)) = &state.interrupt {
            if state.sleeps >= *after {
                shutdown.request();
            }
        }
    }
}
