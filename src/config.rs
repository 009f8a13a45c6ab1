use std::fmt;
use std::time::Duration;

use crate::line::LineRequestConfig;
use crate::Error;

/// A line identified by its chip device path and offset on that chip.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinePin {
    pub chip: String,
    pub offset: u32,
}

impl LinePin {
    pub fn new(chip: &str, offset: u32) -> Self {
        LinePin {
            chip: chip.to_string(),
            offset,
        }
    }
}

impl fmt::Display for LinePin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chip, self.offset)
    }
}

/// Line Toggler settings. The default is P8_12 on a BeagleBone Black.
#[derive(Clone, Debug, PartialEq)]
pub struct TogglerConfig {
    pub line: LinePin,
    pub consumer: String,
    pub high_time: Duration,
    pub low_time: Duration,
    /// Stop after this many HIGH/LOW cycles; `None` runs until interrupted.
    pub max_cycles: Option<u64>,
}

impl Default for TogglerConfig {
    fn default() -> Self {
        TogglerConfig {
            line: LinePin::new("/dev/gpiochip0", 12),
            consumer: "gpio_toggle".to_string(),
            high_time: Duration::from_millis(500),
            low_time: Duration::from_millis(500),
            max_cycles: None,
        }
    }
}

impl TogglerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        check_consumer(&self.consumer)?;
        if self.high_time.is_zero() || self.low_time.is_zero() {
            return Err(Error::Config(
                "HIGH and LOW times must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request(&self) -> LineRequestConfig {
        LineRequestConfig::output(&self.consumer)
    }
}

/// Stepper Driver settings: three output lines and the open-loop timing.
///
/// The defaults drive a step/dir driver from P8_12 (pulse), P8_10
/// (direction) and P8_8 (active-low enable) on a BeagleBone Black.
#[derive(Clone, Debug, PartialEq)]
pub struct StepperConfig {
    pub pulse: LinePin,
    pub direction: LinePin,
    pub enable: LinePin,
    pub consumer: String,
    pub pulses_per_rotation: u32,
    /// Pulse frequency in Hz.
    pub frequency: f64,
    /// Settling time between the forward and reverse pulse trains.
    pub reversal_delay: Duration,
    /// Time between the end of the reverse train and disabling the drive.
    pub disable_delay: Duration,
    /// Time spent disabled before the next cycle.
    pub idle_time: Duration,
    /// Stop after this many cycles; `None` runs until interrupted.
    pub max_cycles: Option<u64>,
}

impl Default for StepperConfig {
    fn default() -> Self {
        StepperConfig {
            pulse: LinePin::new("/dev/gpiochip0", 12),
            direction: LinePin::new("/dev/gpiochip1", 4),
            enable: LinePin::new("/dev/gpiochip1", 3),
            consumer: "motor_control".to_string(),
            pulses_per_rotation: 400,
            frequency: 100.0,
            reversal_delay: Duration::from_millis(500),
            disable_delay: Duration::from_millis(500),
            idle_time: Duration::from_secs(1),
            max_cycles: None,
        }
    }
}

impl StepperConfig {
    pub fn validate(&self) -> Result<(), Error> {
        check_consumer(&self.consumer)?;
        if self.pulses_per_rotation == 0 {
            return Err(Error::Config(
                "pulses per rotation must be at least 1".to_string(),
            ));
        }
        self.half_period()?;
        let roles = [
            ("pulse", &self.pulse),
            ("direction", &self.direction),
            ("enable", &self.enable),
        ];
        for (i, (name, pin)) in roles.iter().enumerate() {
            for (other, other_pin) in &roles[i + 1..] {
                if pin == other_pin {
                    return Err(Error::Config(format!(
                        "{} and {} lines are both {}",
                        name, other, pin
                    )));
                }
            }
        }
        Ok(())
    }

    /// Half of the pulse period, 1 / (2 × frequency), for a 50% duty cycle.
    pub fn half_period(&self) -> Result<Duration, Error> {
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(Error::Config(format!(
                "frequency must be a positive number of Hz, got {}",
                self.frequency
            )));
        }
        let half_period = Duration::try_from_secs_f64(0.5 / self.frequency).map_err(|_| {
            Error::Config(format!("frequency {} Hz is too low", self.frequency))
        })?;
        if half_period.is_zero() {
            return Err(Error::Config(format!(
                "frequency {} Hz is too high",
                self.frequency
            )));
        }
        Ok(half_period)
    }

    pub fn request(&self) -> LineRequestConfig {
        LineRequestConfig::output(&self.consumer)
    }
}

fn check_consumer(consumer: &str) -> Result<(), Error> {
    if consumer.is_empty() {
        return Err(Error::Config("consumer label must not be empty".to_string()));
    }
    Ok(())
}
