use std::time::Duration;

use gpio_bitbang::sim::{Event, SimGpio};
use gpio_bitbang::{Error, LinePin, RunSummary, Shutdown, StepperConfig, StepperMotor};

const CHIP0: &str = "/dev/gpiochip0";
const CHIP1: &str = "/dev/gpiochip1";

const PULSE: (&str, u32) = (CHIP0, 12);
const DIRECTION: (&str, u32) = (CHIP1, 4);
const ENABLE: (&str, u32) = (CHIP1, 3);

fn sim() -> SimGpio {
    SimGpio::new().with_chip(CHIP0, 32).with_chip(CHIP1, 32)
}

fn config(pulses: u32) -> StepperConfig {
    StepperConfig {
        pulses_per_rotation: pulses,
        ..StepperConfig::default()
    }
}

fn is_set(event: &Event, (chip, offset): (&str, u32), value: u8) -> bool {
    *event
        == Event::Set {
            chip: chip.to_string(),
            offset,
            value,
        }
}

/// Number of sleeps in one full cycle with `pulses` pulses per rotation.
fn sleeps_per_cycle(pulses: usize) -> usize {
    4 * pulses + 3
}

#[test]
fn forward_train_precedes_reverse() {
    let pulses = 7;
    let mut sim = sim();
    let mut motor = StepperMotor::new(
        &mut sim,
        &StepperConfig {
            max_cycles: Some(1),
            ..config(pulses)
        },
    )
    .unwrap();
    sim.clear_events();
    motor.run(&mut sim.sleeper(), &Shutdown::new()).unwrap();

    let events = sim.events();
    let reverse_at = events
        .iter()
        .position(|e| is_set(e, DIRECTION, 1))
        .unwrap();
    let forward_at = events
        .iter()
        .position(|e| is_set(e, DIRECTION, 0))
        .unwrap();
    assert!(forward_at < reverse_at);

    let forward = &events[forward_at..reverse_at];
    let highs = forward.iter().filter(|e| is_set(e, PULSE, 1)).count();
    let lows = forward.iter().filter(|e| is_set(e, PULSE, 0)).count();
    assert_eq!((highs, lows), (pulses as usize, pulses as usize));

    let reverse = &events[reverse_at..];
    let highs = reverse.iter().filter(|e| is_set(e, PULSE, 1)).count();
    assert_eq!(highs, pulses as usize);
}

#[test]
fn enable_low_during_both_trains() {
    let mut sim = sim();
    let mut motor = StepperMotor::new(
        &mut sim,
        &StepperConfig {
            max_cycles: Some(2),
            ..config(4)
        },
    )
    .unwrap();
    sim.clear_events();
    motor.run(&mut sim.sleeper(), &Shutdown::new()).unwrap();

    let mut enable = None;
    for event in sim.events() {
        if is_set(&event, ENABLE, 0) {
            enable = Some(0);
        } else if is_set(&event, ENABLE, 1) {
            enable = Some(1);
        } else if is_set(&event, PULSE, 1) || is_set(&event, PULSE, 0) {
            assert_eq!(enable, Some(0), "pulse while motor disabled");
        }
    }
    assert_eq!(enable, Some(1));
}

#[test]
fn disabled_only_for_idle_window() {
    let mut sim = sim();
    let mut motor = StepperMotor::new(
        &mut sim,
        &StepperConfig {
            max_cycles: Some(1),
            ..config(2)
        },
    )
    .unwrap();
    sim.clear_events();
    motor.run(&mut sim.sleeper(), &Shutdown::new()).unwrap();

    let events = sim.events();
    let disabled_at = events.iter().position(|e| is_set(e, ENABLE, 1)).unwrap();
    assert_eq!(
        &events[disabled_at + 1..],
        &[Event::Sleep(Duration::from_secs(1))]
    );
    assert_eq!(events[disabled_at - 1], Event::Sleep(Duration::from_millis(500)));
}

#[test]
fn interrupt_in_any_phase_parks_once() {
    let pulses = 3;
    let cycle = sleeps_per_cycle(pulses);
    // forward train, reversal delay, reverse train, disable delay, idle,
    // and a few sleeps into the second cycle
    for after in 1..=cycle + 4 {
        let mut sim = sim();
        let shutdown = Shutdown::new();
        sim.interrupt_after_sleeps(after, &shutdown);
        {
            let mut motor = StepperMotor::new(&mut sim, &config(pulses as u32)).unwrap();
            motor.run(&mut sim.sleeper(), &shutdown).unwrap();
            sim.clear_events();
            motor.park().unwrap();
        }

        let tail = sim.events();
        assert_eq!(
            tail,
            vec![
                Event::Set {
                    chip: CHIP0.to_string(),
                    offset: 12,
                    value: 0
                },
                Event::Set {
                    chip: CHIP1.to_string(),
                    offset: 4,
                    value: 0
                },
                Event::Set {
                    chip: CHIP1.to_string(),
                    offset: 3,
                    value: 1
                },
                Event::Release {
                    chip: CHIP0.to_string(),
                    offset: 12
                },
                Event::Release {
                    chip: CHIP1.to_string(),
                    offset: 4
                },
                Event::Release {
                    chip: CHIP1.to_string(),
                    offset: 3
                },
            ],
            "interrupted after {} sleeps",
            after
        );
    }
}

#[test]
fn drop_without_park_still_parks() {
    let mut sim = sim();
    let shutdown = Shutdown::new();
    sim.interrupt_after_sleeps(5, &shutdown);
    {
        let mut motor = StepperMotor::new(&mut sim, &config(10)).unwrap();
        let summary = motor.run(&mut sim.sleeper(), &shutdown).unwrap();
        assert_eq!(summary.cycles, 0);
    }
    assert_eq!(sim.values(CHIP1, 3).last(), Some(&1));
    for (chip, offset) in [PULSE, DIRECTION, ENABLE] {
        assert_eq!(sim.releases(chip, offset), 1);
        assert!(!sim.is_claimed(chip, offset));
    }
}

#[test]
fn write_failure_mid_run_still_parks() {
    let mut sim = sim();
    let mut motor = StepperMotor::new(&mut sim, &config(2)).unwrap();
    sim.fail_writes(CHIP1, 4);
    let err = motor.run(&mut sim.sleeper(), &Shutdown::new()).unwrap_err();
    assert!(matches!(err, Error::LineSetError { offset: 4, .. }));
    drop(motor);
    assert_eq!(sim.values(CHIP1, 3), vec![0, 1]);
    for (chip, offset) in [PULSE, DIRECTION, ENABLE] {
        assert!(!sim.is_claimed(chip, offset));
    }
}

#[test]
fn busy_line_aborts_without_writes() {
    for busy in [PULSE, DIRECTION, ENABLE] {
        let mut sim = sim();
        sim.claim_externally(busy.0, busy.1);
        let err = StepperMotor::new(&mut sim, &config(4)).err().unwrap();
        assert!(err.is_acquisition());
        match err {
            Error::LineReqError { chip, offset, .. } => assert_eq!((chip.as_str(), offset), busy),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sim.set_count(), 0);
        for line in [PULSE, DIRECTION, ENABLE] {
            if line != busy {
                assert!(!sim.is_claimed(line.0, line.1));
            }
        }
    }
}

#[test]
fn bad_offset_names_the_chip() {
    let mut sim = SimGpio::new().with_chip(CHIP0, 32).with_chip(CHIP1, 4);
    let bad = StepperConfig {
        direction: LinePin::new(CHIP1, 9),
        ..config(4)
    };
    let err = StepperMotor::new(&mut sim, &bad).err().unwrap();
    assert_eq!(
        err.to_string(),
        "Failed to access line 9 on chip /dev/gpiochip1"
    );
    assert_eq!(sim.set_count(), 0);
}

#[test]
fn invalid_timing_rejected_before_opening_chips() {
    let mut sim = sim();
    for bad in [
        config(0),
        StepperConfig {
            frequency: 0.0,
            ..config(4)
        },
        StepperConfig {
            frequency: -5.0,
            ..config(4)
        },
    ] {
        let err = StepperMotor::new(&mut sim, &bad).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
    assert!(sim.events().is_empty());
}

#[test]
fn second_cycle_repeats_first() {
    let pulses = 5;
    let mut sim = sim();
    let mut motor = StepperMotor::new(
        &mut sim,
        &StepperConfig {
            max_cycles: Some(2),
            ..config(pulses as u32)
        },
    )
    .unwrap();
    sim.clear_events();
    let summary = motor.run(&mut sim.sleeper(), &Shutdown::new()).unwrap();
    assert_eq!(
        summary,
        RunSummary {
            cycles: 2,
            pulses: 4 * pulses as u64
        }
    );

    let events = sim.events();
    assert_eq!(events.len() % 2, 0);
    let (first, second) = events.split_at(events.len() / 2);
    assert_eq!(first, second);
    let sleeps = first
        .iter()
        .filter(|e| matches!(e, Event::Sleep(_)))
        .count();
    assert_eq!(sleeps, sleeps_per_cycle(pulses));
}
