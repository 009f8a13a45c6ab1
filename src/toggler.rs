use std::time::Duration;

use log::info;

use crate::config::TogglerConfig;
use crate::line::{ChipSet, ClaimedLine, GpioBackend, Level, OutputLine};
use crate::shutdown::{Shutdown, Sleeper};
use crate::Error;

/// Drives one output line HIGH then LOW, forever or for a fixed number of
/// cycles. The line is released when the toggler is released or dropped.
pub struct LineToggler<H: OutputLine> {
    line: ClaimedLine<H>,
    high_time: Duration,
    low_time: Duration,
    max_cycles: Option<u64>,
}

impl<H: OutputLine> LineToggler<H> {
    pub fn new<B>(backend: &mut B, config: &TogglerConfig) -> Result<Self, Error>
    where
        B: GpioBackend<Handle = H>,
    {
        config.validate()?;
        let mut chips = ChipSet::new();
        let line = chips.claim(backend, &config.line, &config.request())?;
        Ok(LineToggler {
            line,
            high_time: config.high_time,
            low_time: config.low_time,
            max_cycles: config.max_cycles,
        })
    }

    /// Toggle until shutdown is requested or the cycle limit is reached.
    /// Returns the number of completed HIGH/LOW cycles.
    pub fn run<S: Sleeper>(&mut self, sleeper: &mut S, shutdown: &Shutdown) -> Result<u64, Error> {
        let mut cycles = 0;
        while !shutdown.is_requested() && self.max_cycles.map_or(true, |max| cycles < max) {
            self.line.set(Level::High)?;
            info!("Line HIGH");
            sleeper.sleep(self.high_time);
            if shutdown.is_requested() {
                break;
            }

            self.line.set(Level::Low)?;
            info!("Line LOW");
            sleeper.sleep(self.low_time);
            cycles += 1;
        }
        Ok(cycles)
    }

    pub fn release(self) -> Result<(), Error> {
        let pin = self.line.pin().clone();
        self.line.release()?;
        info!("GPIO line {} released", pin);
        Ok(())
    }
}
