//! Open-loop step/direction motor control by bit-banging.
//!
//! Each pulse is a HIGH write, a sleep, a LOW write and another sleep, all
//! from user space. Nothing compensates for scheduling latency, so pulse
//! width and spacing wander under load; this is what the demo shows on a
//! scope and must not be replaced by hardware PWM or a real-time thread.

use std::time::Duration;

use log::{error, info, trace};

use crate::config::StepperConfig;
use crate::line::{ChipSet, ClaimedLine, GpioBackend, Level, OutputLine};
use crate::shutdown::{Shutdown, Sleeper};
use crate::Error;

// The enable input is active-low.
const ENABLED: Level = Level::Low;
const DISABLED: Level = Level::High;
const FORWARD: Level = Level::Low;
const REVERSE: Level = Level::High;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Complete enable/forward/reverse/disable cycles.
    pub cycles: u64,
    /// Pulses emitted, including those of an interrupted cycle.
    pub pulses: u64,
}

#[derive(Clone, Copy, Debug)]
struct Timing {
    pulses_per_rotation: u32,
    half_period: Duration,
    reversal_delay: Duration,
    disable_delay: Duration,
    idle_time: Duration,
}

enum Halt {
    Interrupted,
    Failed(Error),
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Halt::Failed(e)
    }
}

fn checkpoint(shutdown: &Shutdown) -> Result<(), Halt> {
    if shutdown.is_requested() {
        Err(Halt::Interrupted)
    } else {
        Ok(())
    }
}

fn pause<S: Sleeper>(sleeper: &mut S, shutdown: &Shutdown, duration: Duration) -> Result<(), Halt> {
    checkpoint(shutdown)?;
    sleeper.sleep(duration);
    Ok(())
}

struct MotorLines<H: OutputLine> {
    pulse: ClaimedLine<H>,
    direction: ClaimedLine<H>,
    enable: ClaimedLine<H>,
}

impl<H: OutputLine> MotorLines<H> {
    fn cycle<S: Sleeper>(
        &mut self,
        timing: &Timing,
        sleeper: &mut S,
        shutdown: &Shutdown,
        summary: &mut RunSummary,
    ) -> Result<(), Halt> {
        checkpoint(shutdown)?;
        self.enable.set(ENABLED)?;
        info!("Motor Enabled (Enable Line = 0)");

        checkpoint(shutdown)?;
        self.direction.set(FORWARD)?;
        info!("Direction: Forward");
        self.pulse_train(timing, sleeper, shutdown, summary)?;

        pause(sleeper, shutdown, timing.reversal_delay)?;

        checkpoint(shutdown)?;
        self.direction.set(REVERSE)?;
        info!("Direction: Backward");
        self.pulse_train(timing, sleeper, shutdown, summary)?;

        pause(sleeper, shutdown, timing.disable_delay)?;

        checkpoint(shutdown)?;
        self.enable.set(DISABLED)?;
        info!("Motor Disabled (Enable Line = 1)");

        pause(sleeper, shutdown, timing.idle_time)
    }

    /// Emit one rotation of 50% duty pulses. An interrupt is honoured between
    /// pulses, never inside one.
    fn pulse_train<S: Sleeper>(
        &mut self,
        timing: &Timing,
        sleeper: &mut S,
        shutdown: &Shutdown,
        summary: &mut RunSummary,
    ) -> Result<(), Halt> {
        for n in 0..timing.pulses_per_rotation {
            checkpoint(shutdown)?;
            self.pulse.set(Level::High)?;
            sleeper.sleep(timing.half_period);
            self.pulse.set(Level::Low)?;
            sleeper.sleep(timing.half_period);
            summary.pulses += 1;
            trace!("pulse {}", n + 1);
        }
        Ok(())
    }

    /// Drive every line to its safe level, then release all three. Keeps
    /// going past failures and reports the first.
    fn park(self) -> Result<(), Error> {
        let MotorLines {
            mut pulse,
            mut direction,
            mut enable,
        } = self;
        let mut first_err = None;

        info!("Disabling motor and setting pins to LOW before exit.");
        for (line, level) in [
            (&mut pulse, Level::Low),
            (&mut direction, FORWARD),
            (&mut enable, DISABLED),
        ] {
            if let Err(e) = line.set(level) {
                error!("{}", e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        for line in [pulse, direction, enable] {
            if let Err(e) = line.release() {
                error!("{}", e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                info!("GPIO lines released and motor stopped.");
                Ok(())
            }
        }
    }
}

/// A step/direction driver on three output lines.
///
/// Whatever ends the run, the lines are parked exactly once: pulse and
/// direction LOW, enable HIGH (drive de-energised), then released. That
/// happens in [`StepperMotor::park`] or, failing that, on drop.
pub struct StepperMotor<H: OutputLine> {
    lines: Option<MotorLines<H>>,
    timing: Timing,
    max_cycles: Option<u64>,
}

impl<H: OutputLine> StepperMotor<H> {
    /// Validate the configuration and claim the pulse, direction and enable
    /// lines, in that order. If any claim fails the lines already claimed
    /// are released without ever being written.
    pub fn new<B>(backend: &mut B, config: &StepperConfig) -> Result<Self, Error>
    where
        B: GpioBackend<Handle = H>,
    {
        config.validate()?;
        let half_period = config.half_period()?;
        let request = config.request();

        let mut chips = ChipSet::new();
        let pulse = chips.claim(backend, &config.pulse, &request)?;
        let direction = chips.claim(backend, &config.direction, &request)?;
        let enable = chips.claim(backend, &config.enable, &request)?;
        info!(
            "Accessed GPIO lines: pulse {}, direction {}, enable {}",
            config.pulse, config.direction, config.enable
        );

        Ok(StepperMotor {
            lines: Some(MotorLines {
                pulse,
                direction,
                enable,
            }),
            timing: Timing {
                pulses_per_rotation: config.pulses_per_rotation,
                half_period,
                reversal_delay: config.reversal_delay,
                disable_delay: config.disable_delay,
                idle_time: config.idle_time,
            },
            max_cycles: config.max_cycles,
        })
    }

    /// Cycle enable, forward, reverse, disable until shutdown is requested or
    /// the cycle limit is reached. An interrupt is a normal return.
    pub fn run<S: Sleeper>(
        &mut self,
        sleeper: &mut S,
        shutdown: &Shutdown,
    ) -> Result<RunSummary, Error> {
        let mut summary = RunSummary::default();
        let lines = match self.lines.as_mut() {
            Some(lines) => lines,
            None => return Ok(summary),
        };
        while self.max_cycles.map_or(true, |max| summary.cycles < max) {
            match lines.cycle(&self.timing, sleeper, shutdown, &mut summary) {
                Ok(()) => summary.cycles += 1,
                Err(Halt::Interrupted) => break,
                Err(Halt::Failed(e)) => return Err(e),
            }
        }
        Ok(summary)
    }

    /// Put the lines in their safe state and release them.
    pub fn park(mut self) -> Result<(), Error> {
        match self.lines.take() {
            Some(lines) => lines.park(),
            None => Ok(()),
        }
    }
}

impl<H: OutputLine> Drop for StepperMotor<H> {
    fn drop(&mut self) {
        if let Some(lines) = self.lines.take() {
            if let Err(e) = lines.park() {
                error!("Cleanup failed: {}", e);
            }
        }
    }
}
