//! Sleep-timed GPIO bit-banging demos over the Linux GPIO character device.
//!
//! Two programs are built on this library: a single-line toggler and an
//! open-loop stepper driver (pulse, direction and active-low enable lines).
//! Pulse timing comes from blocking sleeps between individual line writes,
//! so it jitters with the host scheduler.

pub mod config;
pub mod line;
pub mod shutdown;
pub mod sim;
pub mod stepper;
pub mod toggler;

pub use config::{LinePin, StepperConfig, TogglerConfig};
pub use line::{Cdev, ChipSet, ClaimedLine, Direction, GpioBackend, Level, LineRequestConfig, OutputLine};
pub use shutdown::{Shutdown, Sleeper, ThreadSleeper};
pub use stepper::{RunSummary, StepperMotor};
pub use toggler::LineToggler;

use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Error reported by a line-access backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to open GPIO chip {chip}")]
    ChipError {
        source: BoxError,
        chip: String,
    },
    #[error("Failed to access line {offset} on chip {chip}")]
    LineGetError {
        source: BoxError,
        chip: String,
        offset: u32,
    },
    #[error("Failed to request line {offset} on chip {chip}")]
    LineReqError {
        source: BoxError,
        chip: String,
        offset: u32,
    },
    #[error("Failed to set line {offset} on chip {chip}")]
    LineSetError {
        source: BoxError,
        chip: String,
        offset: u32,
    },
    #[error("Failed to release line {offset} on chip {chip}")]
    LineReleaseError {
        source: BoxError,
        chip: String,
        offset: u32,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to initialise logging")]
    Logger(#[from] log::SetLoggerError),
    #[error("Control loop terminated abnormally")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// True for failures to obtain a chip or line, which abort before any
    /// output is driven.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            Error::ChipError { .. } | Error::LineGetError { .. } | Error::LineReqError { .. }
        )
    }
}

/// Install the console logger. `verbosity` counts `-v` flags.
pub fn init_logging(verbosity: u8) -> Result<(), Error> {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new().with_level(level).init()?;
    Ok(())
}

/// Log an error followed by each of its causes.
pub fn log_error_chain(err: &(dyn std::error::Error + 'static)) {
    log::error!("{}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        log::error!("  caused by: {}", cause);
        source = cause.source();
    }
}
