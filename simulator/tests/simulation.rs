use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use shared_resources::clock;
use shared_resources::config::SimulationConfig;
use shared_resources::passenger::Passenger;
use simulator::dispatcher::Dispatcher;
use simulator::elevator::Elevator;

/// Full system minus the generator and the status view: dispatcher worker
/// plus one thread per car, millisecond timings, clock at full speed.
struct Sim {
    dispatcher: Arc<Dispatcher>,
    elevators: Vec<Arc<Elevator>>,
    handles: Vec<thread::JoinHandle<()>>,
}

fn fast_config(floors: u8, cars: u8, capacity: usize) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.building.floors = floors;
    config.building.elevators_count = cars;
    config.building.elevator_capacity = capacity;
    // Short but observable at 30x: a floor crossing takes a handful of
    // real milliseconds, so intermediate states are visible to the polls.
    config.timing.time_move_one_floor = 300;
    config.timing.time_doors = 150;
    config.timing.time_boarding = 60;
    config.zoning.zoning_enabled = false;
    config
}

fn start(config: SimulationConfig) -> Sim {
    clock::set_speed(30.0);
    let config = Arc::new(config);
    let dispatcher = Arc::new(Dispatcher::new(config.clone()));

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
        handles.push(thread::spawn(move || dispatcher.run()));
    }
    for elevator in &elevators {
        let elevator = elevator.clone();
        handles.push(thread::spawn(move || elevator.run()));
    }

    Sim {
        dispatcher,
        elevators,
        handles,
    }
}

impl Sim {
    fn delivered(&self) -> usize {
        self.elevators.iter().map(|e| e.delivered_count()).sum()
    }

    fn all_idle(&self) -> bool {
        self.elevators.iter().all(|e| e.is_truly_idle())
    }

    fn wait_for(&self, timeout: Duration, pred: impl Fn(&Sim) -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if pred(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn stop(self) {
        self.dispatcher.shutdown();
        for elevator in &self.elevators {
            elevator.shutdown();
        }
        for handle in self.handles {
            handle.join().unwrap();
        }
    }
}

#[test]
fn single_passenger_single_car() {
    let sim = start(fast_config(10, 1, 5));

    sim.dispatcher.submit_request(Passenger::new(1, 1, 7));

    assert!(
        sim.wait_for(Duration::from_secs(20), |s| s.delivered() == 1 && s.all_idle()),
        "passenger was not delivered"
    );
    // The final elevator-update events may still be in flight.
    assert!(sim.wait_for(Duration::from_secs(5), |s| s.dispatcher.is_idle()));
    assert_eq!(sim.dispatcher.total_waiting(), 0);
    assert_eq!(sim.elevators[0].snapshot().load, 0);

    sim.stop();
}

#[test]
fn on_the_way_call_is_merged_into_the_trip() {
    let sim = start(fast_config(10, 1, 5));

    sim.dispatcher.submit_request(Passenger::new(1, 1, 9));
    // Wait until the first passenger is aboard and the car sweeps up.
    assert!(
        sim.wait_for(Duration::from_secs(20), |s| s.elevators[0].snapshot().load == 1),
        "first passenger never boarded"
    );

    sim.dispatcher.submit_request(Passenger::new(2, 5, 8));

    assert!(
        sim.wait_for(Duration::from_secs(20), |s| s.delivered() == 2 && s.all_idle()),
        "both passengers should be delivered"
    );
    assert_eq!(sim.dispatcher.total_waiting(), 0);

    sim.stop();
}

#[test]
fn capacity_backpressure_leaves_third_call_pending() {
    let sim = start(fast_config(5, 1, 2));

    sim.dispatcher.submit_request(Passenger::new(1, 1, 5));
    sim.dispatcher.submit_request(Passenger::new(2, 2, 5));
    sim.dispatcher.submit_request(Passenger::new(3, 3, 5));

    // The capacity bound must hold at every observation.
    let start_time = Instant::now();
    while start_time.elapsed() < Duration::from_secs(30) {
        let s = sim.elevators[0].snapshot();
        assert!(s.load <= s.capacity, "capacity exceeded: {}/{}", s.load, s.capacity);
        if sim.delivered() == 3 && sim.all_idle() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(sim.delivered(), 3, "all passengers eventually delivered");
    assert_eq!(sim.dispatcher.total_waiting(), 0);

    sim.stop();
}

#[test]
fn opposite_direction_call_is_served_after_the_trip() {
    let sim = start(fast_config(10, 1, 5));

    sim.dispatcher.submit_request(Passenger::new(1, 3, 5));
    assert!(
        sim.wait_for(Duration::from_secs(20), |s| s.elevators[0].snapshot().load == 1),
        "first passenger never boarded"
    );

    // Down call behind the car while it still carries an upward passenger.
    sim.dispatcher.submit_request(Passenger::new(2, 4, 2));

    assert!(
        sim.wait_for(Duration::from_secs(30), |s| s.delivered() == 2 && s.all_idle()),
        "down passenger should be served after the up trip finishes"
    );
    assert_eq!(sim.dispatcher.total_waiting(), 0);

    sim.stop();
}

#[test]
fn no_passenger_is_lost_under_random_load() {
    let sim = start(fast_config(12, 3, 5));
    let mut rng = rand::thread_rng();

    let total = 20;
    for id in 1..=total {
        let from = rng.gen_range(1..=12u8);
        let mut to = rng.gen_range(1..=12u8);
        while to == from {
            to = rng.gen_range(1..=12u8);
        }
        sim.dispatcher.submit_request(Passenger::new(id, from, to));
    }

    assert!(
        sim.wait_for(Duration::from_secs(60), |s| {
            s.delivered() == total && s.all_idle() && s.dispatcher.is_idle()
        }),
        "submitted = delivered once the system drains (delivered {} of {})",
        sim.delivered(),
        total
    );
    assert_eq!(sim.dispatcher.total_waiting(), 0);

    sim.stop();
}

#[test]
fn drained_system_reports_idle() {
    let sim = start(fast_config(8, 2, 4));

    assert!(sim.wait_for(Duration::from_secs(5), |s| s.all_idle()));
    assert!(sim.wait_for(Duration::from_secs(5), |s| s.dispatcher.is_idle()));

    sim.dispatcher.submit_request(Passenger::new(1, 2, 6));
    assert!(
        sim.wait_for(Duration::from_secs(20), |s| s.delivered() == 1 && s.all_idle()),
        "single request should drain"
    );
    assert!(sim.wait_for(Duration::from_secs(5), |s| s.dispatcher.is_idle()));

    sim.stop();
}
