use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use shared_resources::clock;
use shared_resources::config::SimulationConfig;
use shared_resources::logging;

use simulator::debug;
use simulator::dispatcher::Dispatcher;
use simulator::elevator::Elevator;
use simulator::generator::{self, SimulationControl};

struct Args {
    nogui: bool,
    speed: Option<f64>,
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let mut parsed = Args {
        nogui: false,
        speed: None,
        config_path: None,
    };

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--nogui" | "-nogui" => parsed.nogui = true,
            "--speed" if i + 1 < args.len() => {
                i += 1;
                match args[i].parse::<f64>() {
                    Ok(speed) => parsed.speed = Some(speed),
                    Err(_) => println!("speed {} is not a number, skipping...", args[i]),
                }
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                parsed.config_path = Some(args[i].clone());
            }
            other => println!("illegal argument {}, skipping...", other),
        }
        i += 1;
    }
    parsed
}

fn main() {
    println!("=== SYSTEM BOOT ===\n");

    let args = parse_args();

    let config = Arc::new(match &args.config_path {
        Some(path) => SimulationConfig::load(path),
        None => SimulationConfig::get(),
    });
    if let Some(speed) = args.speed {
        clock::set_speed(speed);
    }

    // DISPATCHER
    let dispatcher = Arc::new(Dispatcher::new(config.clone()));

    // ELEVATORS, ALL STARTING AT THE GROUND FLOOR
    let mut elevators = Vec::new();
    for id in 1..=config.building.elevators_count as usize {
        let elevator = Arc::new(Elevator::new(
            id,
            1,
            config.building.elevator_capacity,
            config.clone(),
            dispatcher.clone(),
        ));
        dispatcher.register_elevator(elevator.clone());
        elevators.push(elevator);
    }

    let mut handles = Vec::new();
    {
        let dispatcher = dispatcher.clone();
        handles.push(
            thread::Builder::new()
                .name("dispatcher".to_string())
                .spawn(move || dispatcher.run())
                .unwrap(),
        );
    }
    for elevator in &elevators {
        let elevator = elevator.clone();
        handles.push(
            thread::Builder::new()
                .name(format!("elevator-{}", elevator.id()))
                .spawn(move || elevator.run())
                .unwrap(),
        );
    }

    // PASSENGER GENERATOR
    let control = Arc::new(SimulationControl::new(
        config.simulation.passenger_limit,
        config.simulation.request_interval_min,
        config.simulation.request_interval_max,
    ));
    let generator_handle = {
        let dispatcher = dispatcher.clone();
        let control = control.clone();
        thread::Builder::new()
            .name("passenger-generator".to_string())
            .spawn(move || generator::main(dispatcher, control))
            .unwrap()
    };

    // STATUS VIEW
    let (view_shutdown_tx, view_shutdown_rx) = unbounded();
    let view_handle = if !args.nogui {
        let dispatcher = dispatcher.clone();
        let elevators = elevators.clone();
        let control = control.clone();
        Some(
            thread::Builder::new()
                .name("status-view".to_string())
                .spawn(move || debug::main(dispatcher, elevators, control, view_shutdown_rx))
                .unwrap(),
        )
    } else {
        None
    };

    println!("--- SIMULATION STARTED ---\n");

    generator_handle.join().unwrap();

    drain(&dispatcher, &elevators, config.simulation.drain_timeout_ms);

    dispatcher.shutdown();
    for elevator in &elevators {
        elevator.shutdown();
    }
    view_shutdown_tx.send(()).ok();

    for handle in handles {
        handle.join().unwrap();
    }
    if let Some(view_handle) = view_handle {
        view_handle.join().unwrap().ok();
    }

    println!("\n--- SIMULATION FINISHED ---");
}

/// Wait until every passenger is delivered and every car parks, bounded by
/// the drain timeout so the program always terminates.
fn drain(dispatcher: &Arc<Dispatcher>, elevators: &[Arc<Elevator>], timeout_ms: u64) {
    let start = Instant::now();
    loop {
        let all_idle = elevators.iter().all(|e| e.is_truly_idle());
        if all_idle && dispatcher.is_idle() {
            break;
        }

        if start.elapsed() > Duration::from_millis(timeout_ms) {
            logging::log_line(
                "SYSTEM",
                "SHUTDOWN",
                &format!("Drain timeout reached ({} ms). Forcing shutdown.", timeout_ms),
            );
            break;
        }

        thread::sleep(Duration::from_millis(200));
    }
}
