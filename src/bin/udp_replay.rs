//! Synthetic telemetry replay
//!
//! Generates laps for one or more cars on a track and sends them to a
//! relay as UDP datagrams, either JSON or positional CSV. Malformed
//! datagrams can be interleaved to exercise the parser's failure path.
//!
//! # Usage
//! ```bash
//! ./udp-replay --target 127.0.0.1:20777 --track "Road America" --cars 3 --rate 20
//! ./udp-replay --format csv --garbage-every 50 --laps 0
//! ```

use std::f64::consts::TAU;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use rand::prelude::*;

use racewire::tracks::normalize_track;
use racewire::types::TelemetrySample;

/// Track length used when the track is not in the table (metres).
const DEFAULT_LAP_LENGTH: f64 = 5_000.0;

const LAP_LENGTHS: &[(&str, f64)] = &[
    ("barber", 3_830.0),
    ("cota", 5_513.0),
    ("indianapolis", 3_925.0),
    ("road_america", 6_515.0),
    ("sebring", 6_019.0),
    ("sonoma", 4_050.0),
    ("vir", 5_263.0),
];

/// Corners per lap in the synthetic speed profile.
const CORNERS_PER_LAP: f64 = 9.0;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "udp-replay")]
#[command(about = "Send synthetic race telemetry to a racewire relay")]
#[command(version)]
struct Args {
    /// Relay UDP address
    #[arg(long, default_value = "127.0.0.1:20777")]
    target: String,

    /// Track name (any alias)
    #[arg(long, default_value = "road_america")]
    track: String,

    /// Number of cars
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u32).range(1..=64))]
    cars: u32,

    /// Samples per second per car
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..=1000))]
    rate: u32,

    /// Laps per car (0 = run until interrupted)
    #[arg(long, default_value = "3")]
    laps: u32,

    /// Datagram format
    #[arg(long, value_enum, default_value = "json")]
    format: Format,

    /// Send a malformed datagram every N samples (0 = never)
    #[arg(long, default_value = "0")]
    garbage_every: u64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

struct Car {
    chassis: String,
    lap: u32,
    distance: f64,
    speed: f64,
    /// Pace multiplier so cars separate over a stint.
    pace: f64,
}

struct Simulation {
    track: String,
    lap_length: f64,
    cars: Vec<Car>,
    rng: StdRng,
}

impl Simulation {
    fn new(track: &str, cars: u32, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let track = normalize_track(track);
        let lap_length = LAP_LENGTHS
            .iter()
            .find(|(name, _)| *name == track)
            .map_or(DEFAULT_LAP_LENGTH, |(_, length)| *length);

        let cars = (0..cars)
            .map(|i| Car {
                chassis: format!("GR86-{:03}", i + 1),
                lap: 1,
                distance: f64::from(i) * 40.0,
                speed: 120.0,
                pace: rng.gen_range(0.97..1.03),
            })
            .collect();

        Self {
            track,
            lap_length,
            cars,
            rng,
        }
    }

    /// Advance one car by `dt` and return its reading.
    fn step(&mut self, index: usize, dt: f64) -> TelemetrySample {
        let phase = self.cars[index].distance / self.lap_length;
        let corner = (phase * CORNERS_PER_LAP * TAU).sin();
        let noise: f64 = self.rng.gen_range(-1.5..1.5);
        let lateral_noise: f64 = self.rng.gen_range(-0.05..0.05);

        let car = &mut self.cars[index];
        let target_speed = (150.0 + 45.0 * corner) * car.pace + noise;
        let previous = car.speed;
        car.speed = target_speed.max(40.0);
        let accel_x = ((car.speed - previous) / 3.6) / dt.max(1e-3) / 9.81;
        // lateral load peaks where the car is slowest
        let accel_y = (1.0 - corner).mul_add(0.9, lateral_noise) * if index % 2 == 0 { 1.0 } else { -1.0 };

        car.distance += car.speed / 3.6 * dt;
        if car.distance >= self.lap_length {
            car.distance -= self.lap_length;
            car.lap += 1;
        }

        TelemetrySample {
            timestamp: Utc::now(),
            track: self.track.clone(),
            chassis: car.chassis.clone(),
            lap: car.lap,
            lap_distance: car.distance,
            speed: car.speed,
            accel_x: accel_x.clamp(-3.0, 3.0),
            accel_y,
            steering_angle: Some(accel_y * 35.0),
            brake_pressure: Some(if accel_x < -0.2 { -accel_x * 60.0 } else { 0.0 }),
            rpm: Some(3_000.0 + car.speed * 28.0),
            slip: None,
            tire_stress: None,
        }
    }

    fn finished(&self, laps: u32) -> bool {
        laps > 0 && self.cars.iter().all(|c| c.lap > laps)
    }
}

fn encode(sample: &TelemetrySample, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => Ok(serde_json::to_vec(sample)?),
        Format::Csv => Ok(format!(
            "{},{},{},{},{:.2},{:.2},{:.3},{:.3},{:.1},{:.1},{:.0}",
            sample.timestamp.timestamp_millis(),
            sample.track,
            sample.chassis,
            sample.lap,
            sample.lap_distance,
            sample.speed,
            sample.accel_x,
            sample.accel_y,
            sample.steering_angle.unwrap_or_default(),
            sample.brake_pressure.unwrap_or_default(),
            sample.rpm.unwrap_or_default(),
        )
        .into_bytes()),
    }
}

fn garbage(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(4..48);
    (0..len).map(|_| rng.gen_range(0x80u8..=0xff)).collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind local UDP socket")?;
    socket
        .connect(&args.target)
        .with_context(|| format!("Invalid target {}", args.target))?;

    let mut sim = Simulation::new(&args.track, args.cars, args.seed);
    let tick = Duration::from_secs_f64(1.0 / f64::from(args.rate));
    let dt = tick.as_secs_f64();

    eprintln!(
        "udp-replay: {} car(s) on {} ({:.0} m) at {} Hz -> {} ({:?})",
        args.cars, sim.track, sim.lap_length, args.rate, args.target, args.format
    );

    let started = Instant::now();
    let mut sent: u64 = 0;
    let mut garbage_sent: u64 = 0;
    let mut next_tick = Instant::now();

    while !sim.finished(args.laps) {
        for index in 0..sim.cars.len() {
            let sample = sim.step(index, dt);
            let datagram = encode(&sample, args.format)?;
            if let Err(e) = socket.send(&datagram) {
                eprintln!("udp-replay: send failed: {e}");
            }
            sent += 1;

            if args.garbage_every > 0 && sent % args.garbage_every == 0 {
                let junk = garbage(&mut sim.rng);
                let _ = socket.send(&junk);
                garbage_sent += 1;
            }
        }

        next_tick += tick;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    eprintln!(
        "udp-replay: sent {} samples and {} malformed datagrams in {:.1}s",
        sent,
        garbage_sent,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
