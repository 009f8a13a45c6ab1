use gpio_bitbang::{
    init_logging, log_error_chain, Cdev, Error, LinePin, RunSummary, Shutdown, StepperConfig,
    StepperMotor, ThreadSleeper,
};
use log::info;
use structopt::StructOpt;

/// Bit-bang a step/direction motor driver: one rotation forward, one back,
/// idle, repeat until interrupted.
#[derive(StructOpt, Debug)]
#[structopt(name = "motor-control")]
struct Opt {
    /// Pulse line as CHIP:OFFSET [default: /dev/gpiochip0:12]
    #[structopt(long, parse(try_from_str = parse_pin))]
    pulse: Option<LinePin>,
    /// Direction line as CHIP:OFFSET [default: /dev/gpiochip1:4]
    #[structopt(long, parse(try_from_str = parse_pin))]
    direction: Option<LinePin>,
    /// Active-low enable line as CHIP:OFFSET [default: /dev/gpiochip1:3]
    #[structopt(long, parse(try_from_str = parse_pin))]
    enable: Option<LinePin>,
    /// Pulses per rotation [default: 400]
    #[structopt(long)]
    pulses: Option<u32>,
    /// Pulse frequency in Hz [default: 100]
    #[structopt(long)]
    frequency: Option<f64>,
    /// Stop after this many cycles instead of running until Ctrl-C
    #[structopt(long)]
    cycles: Option<u64>,
    /// Log more (-v debug, -vv trace per pulse)
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn parse_pin(s: &str) -> Result<LinePin, String> {
    let (chip, offset) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected CHIP:OFFSET, got {}", s))?;
    let offset = offset
        .parse::<u32>()
        .map_err(|e| format!("bad offset in {}: {}", s, e))?;
    Ok(LinePin::new(chip, offset))
}

impl Opt {
    fn config(&self) -> StepperConfig {
        let mut config = StepperConfig::default();
        if let Some(pin) = &self.pulse {
            config.pulse = pin.clone();
        }
        if let Some(pin) = &self.direction {
            config.direction = pin.clone();
        }
        if let Some(pin) = &self.enable {
            config.enable = pin.clone();
        }
        if let Some(pulses) = self.pulses {
            config.pulses_per_rotation = pulses;
        }
        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }
        config.max_cycles = self.cycles;
        config
    }
}

async fn run(config: StepperConfig) -> Result<(), Error> {
    config.validate()?;

    let shutdown = Shutdown::new();
    shutdown.listen_for_ctrl_c();

    let summary = tokio::task::spawn_blocking(move || -> Result<RunSummary, Error> {
        let mut motor = StepperMotor::new(&mut Cdev, &config)?;
        // on error the motor is dropped, which parks it
        let summary = motor.run(&mut ThreadSleeper, &shutdown)?;
        motor.park()?;
        Ok(summary)
    })
    .await??;

    info!(
        "Completed {} cycles, {} pulses",
        summary.cycles, summary.pulses
    );
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
