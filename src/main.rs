use phantom_traffic::{Disturbance, Simulation, SimulationConfig, Target};
use std::time::Instant;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let num_frames: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(3000);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);

    let config = SimulationConfig {
        seed,
        ..Default::default()
    };
    let mut sim = match Simulation::new(&config) {
        Ok(sim) => sim,
        Err(err) => {
            log::error!("invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = sim.inject_perturbation(Target::Random, Disturbance::pulse(0.5)) {
        log::warn!("could not perturb the traffic: {}", err);
    }

    println!("Simulating...");
    let start = Instant::now();
    for (frame, result) in sim.snapshots(num_frames).enumerate() {
        match result {
            Ok(snapshot) if frame % 100 == 99 => {
                let stats = snapshot.stats();
                println!(
                    "t = {:>6.1} s: mean {:5.2} m/s, min {:5.2} m/s, min gap {:5.2} m, {} braking{}",
                    snapshot.time,
                    stats.mean_vel,
                    stats.min_vel,
                    stats.min_gap,
                    stats.num_braking,
                    if stats.congested { " (congested)" } else { "" },
                );
            }
            Ok(_) => {}
            Err(err) => {
                log::error!("{}", err);
                std::process::exit(1);
            }
        }
    }
    println!(
        "Avg. frame: {:?} ({} vehicles)",
        start.elapsed() / num_frames.max(1) as u32,
        sim.road().num_vehicles(),
    );
}
