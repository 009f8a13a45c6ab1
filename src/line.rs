//! Line access: the five primitives the demos need from the host GPIO layer
//! (open chip, get line, request, set value, release) and the guard that
//! keeps a requested line from outliving its owner unreleased.

use std::fmt;

use gpio_cdev::{errors::Error as GpioError, Chip, Line, LineHandle, LineRequestFlags};
use log::{debug, info, warn};

use crate::config::LinePin;
use crate::{BoxError, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level as u8
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "LOW"),
            Level::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Output,
}

impl Direction {
    fn flags(self) -> LineRequestFlags {
        match self {
            Direction::Output => LineRequestFlags::OUTPUT,
        }
    }
}

/// How a line is claimed: consumer label, direction and the level driven
/// the moment the request succeeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRequestConfig {
    pub consumer: String,
    pub direction: Direction,
    pub initial: Level,
}

impl LineRequestConfig {
    pub fn output(consumer: &str) -> Self {
        LineRequestConfig {
            consumer: consumer.to_string(),
            direction: Direction::Output,
            initial: Level::Low,
        }
    }
}

/// A claimed output line.
pub trait OutputLine {
    type Error: std::error::Error + Send + Sync + 'static;

    fn set_value(&mut self, value: u8) -> Result<(), Self::Error>;

    /// Give the claim back so other processes may request the line.
    fn release(self) -> Result<(), Self::Error>;
}

/// Chip and line acquisition.
pub trait GpioBackend {
    type Chip;
    type Line;
    type Handle: OutputLine;
    type Error: std::error::Error + Send + Sync + 'static;

    fn open_chip(&mut self, path: &str) -> Result<Self::Chip, Self::Error>;

    fn get_line(&mut self, chip: &mut Self::Chip, offset: u32) -> Result<Self::Line, Self::Error>;

    fn request(
        &mut self,
        line: Self::Line,
        config: &LineRequestConfig,
    ) -> Result<Self::Handle, Self::Error>;
}

/// The kernel GPIO character device, via `gpio-cdev`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cdev;

pub struct CdevLine {
    handle: LineHandle,
}

impl OutputLine for CdevLine {
    type Error = GpioError;

    fn set_value(&mut self, value: u8) -> Result<(), GpioError> {
        self.handle.set_value(value)
    }

    fn release(self) -> Result<(), GpioError> {
        // closing the request fd is what hands the line back to the kernel
        drop(self.handle);
        Ok(())
    }
}

impl GpioBackend for Cdev {
    type Chip = Chip;
    type Line = Line;
    type Handle = CdevLine;
    type Error = GpioError;

    fn open_chip(&mut self, path: &str) -> Result<Chip, GpioError> {
        Chip::new(path)
    }

    fn get_line(&mut self, chip: &mut Chip, offset: u32) -> Result<Line, GpioError> {
        chip.get_line(offset)
    }

    fn request(&mut self, line: Line, config: &LineRequestConfig) -> Result<CdevLine, GpioError> {
        let handle = line.request(
            config.direction.flags(),
            config.initial.into(),
            &config.consumer,
        )?;
        Ok(CdevLine { handle })
    }
}

fn boxed<E: std::error::Error + Send + Sync + 'static>(e: E) -> BoxError {
    Box::new(e)
}

/// A requested line that is released exactly once: by [`ClaimedLine::release`]
/// or, failing that, when the guard is dropped.
pub struct ClaimedLine<H: OutputLine> {
    // only taken by release() and drop(), both of which end the guard
    handle: Option<H>,
    pin: LinePin,
}

impl<H: OutputLine> ClaimedLine<H> {
    pub fn new(handle: H, pin: LinePin) -> Self {
        ClaimedLine {
            handle: Some(handle),
            pin,
        }
    }

    pub fn pin(&self) -> &LinePin {
        &self.pin
    }

    pub fn set(&mut self, level: Level) -> Result<(), Error> {
        let pin = &self.pin;
        if let Some(handle) = self.handle.as_mut() {
            handle
                .set_value(level.into())
                .map_err(|e| Error::LineSetError {
                    source: boxed(e),
                    chip: pin.chip.clone(),
                    offset: pin.offset,
                })?;
        }
        Ok(())
    }

    pub fn release(mut self) -> Result<(), Error> {
        match self.handle.take() {
            Some(handle) => self.release_handle(handle),
            None => Ok(()),
        }
    }

    fn release_handle(&self, handle: H) -> Result<(), Error> {
        handle.release().map_err(|e| Error::LineReleaseError {
            source: boxed(e),
            chip: self.pin.chip.clone(),
            offset: self.pin.offset,
        })?;
        debug!("Released GPIO line {}", self.pin);
        Ok(())
    }
}

impl<H: OutputLine> Drop for ClaimedLine<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.release_handle(handle) {
                warn!("{}", e);
            }
        }
    }
}

/// Chips opened while acquiring lines, opened once per distinct path.
pub struct ChipSet<B: GpioBackend> {
    chips: Vec<(String, B::Chip)>,
}

impl<B: GpioBackend> Default for ChipSet<B> {
    fn default() -> Self {
        ChipSet { chips: Vec::new() }
    }
}

impl<B: GpioBackend> ChipSet<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    fn chip(&mut self, backend: &mut B, path: &str) -> Result<&mut B::Chip, Error> {
        let index = match self.chips.iter().position(|(p, _)| p == path) {
            Some(index) => index,
            None => {
                let chip = backend.open_chip(path).map_err(|e| Error::ChipError {
                    source: boxed(e),
                    chip: path.to_string(),
                })?;
                info!("Opened GPIO chip: {}", path);
                self.chips.push((path.to_string(), chip));
                self.chips.len() - 1
            }
        };
        Ok(&mut self.chips[index].1)
    }

    /// Open the pin's chip if needed, get the line and request it.
    pub fn claim(
        &mut self,
        backend: &mut B,
        pin: &LinePin,
        config: &LineRequestConfig,
    ) -> Result<ClaimedLine<B::Handle>, Error> {
        let chip = self.chip(backend, &pin.chip)?;
        let line = backend
            .get_line(chip, pin.offset)
            .map_err(|e| Error::LineGetError {
                source: boxed(e),
                chip: pin.chip.clone(),
                offset: pin.offset,
            })?;
        debug!("Accessing GPIO line: {}", pin);
        let handle = backend
            .request(line, config)
            .map_err(|e| Error::LineReqError {
                source: boxed(e),
                chip: pin.chip.clone(),
                offset: pin.offset,
            })?;
        info!("GPIO line {} set as output ({})", pin, config.consumer);
        Ok(ClaimedLine::new(handle, pin.clone()))
    }
}
