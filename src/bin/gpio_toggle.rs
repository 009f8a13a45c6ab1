use std::time::Duration;

use gpio_bitbang::{
    init_logging, log_error_chain, Cdev, Error, LinePin, LineToggler, Shutdown, ThreadSleeper,
    TogglerConfig,
};
use log::info;
use structopt::StructOpt;

/// Toggle one GPIO line HIGH and LOW until interrupted.
#[derive(StructOpt, Debug)]
#[structopt(name = "gpio-toggle")]
struct Opt {
    /// GPIO chip device path [default: /dev/gpiochip0]
    #[structopt(long)]
    chip: Option<String>,
    /// Line offset on the chip [default: 12]
    #[structopt(long)]
    line: Option<u32>,
    /// Time spent HIGH and time spent LOW, in milliseconds [default: 500]
    #[structopt(long = "half-period-ms")]
    half_period_ms: Option<u64>,
    /// Stop after this many HIGH/LOW cycles instead of running until Ctrl-C
    #[structopt(long)]
    cycles: Option<u64>,
    /// Log more (-v debug, -vv trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

impl Opt {
    fn config(&self) -> TogglerConfig {
        let mut config = TogglerConfig::default();
        if let Some(chip) = &self.chip {
            config.line.chip = chip.clone();
        }
        if let Some(offset) = self.line {
            config.line.offset = offset;
        }
        if let Some(ms) = self.half_period_ms {
            config.high_time = Duration::from_millis(ms);
            config.low_time = Duration::from_millis(ms);
        }
        config.max_cycles = self.cycles;
        config
    }
}

async fn run(config: TogglerConfig) -> Result<(), Error> {
    config.validate()?;
    let pin: LinePin = config.line.clone();

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    let cycles = tokio::task::spawn_blocking(move || -> Result<u64, Error> {
        let mut toggler = LineToggler::new(&mut Cdev, &config)?;
        let cycles = toggler.run(&mut ThreadSleeper, &shutdown)?;
        toggler.release()?;
        Ok(cycles)
    })
    .await??;

    info!("Toggled {} {} times", pin, cycles);
    Ok(())
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();
    if let Err(e) = init_logging(opt.verbose) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    if let Err(e) = run(opt.config()).await {
        log_error_chain(&e);
        std::process::exit(1);
    }
}
