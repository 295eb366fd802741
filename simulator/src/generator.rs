use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use shared_resources::clock;
use shared_resources::logging;
use shared_resources::passenger::Passenger;

use crate::dispatcher::Dispatcher;

/// Live-adjustable generator settings shared with the status view: the
/// passenger limit and the request interval bounds can change mid-run.
pub struct SimulationControl {
    generated: AtomicUsize,
    passenger_limit: AtomicUsize,
    interval_min_ms: AtomicU64,
    interval_max_ms: AtomicU64,
}

impl SimulationControl {
    pub fn new(passenger_limit: usize, interval_min_ms: u64, interval_max_ms: u64) -> Self {
        SimulationControl {
            generated: AtomicUsize::new(0),
            passenger_limit: AtomicUsize::new(passenger_limit),
            interval_min_ms: AtomicU64::new(interval_min_ms),
            interval_max_ms: AtomicU64::new(interval_max_ms.max(interval_min_ms)),
        }
    }

    pub fn passenger_limit(&self) -> usize {
        self.passenger_limit.load(Ordering::SeqCst)
    }

    /// Raising the limit resumes generation; lowering it below what was
    /// already generated is ignored.
    pub fn set_passenger_limit(&self, new_limit: usize) {
        if new_limit <= self.generated.load(Ordering::SeqCst) {
            return;
        }
        self.passenger_limit.store(new_limit, Ordering::SeqCst);
    }

    pub fn generated_count(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    pub fn next_passenger_id(&self) -> usize {
        self.generated.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn should_generate_more(&self) -> bool {
        self.generated.load(Ordering::SeqCst) < self.passenger_limit.load(Ordering::SeqCst)
    }

    pub fn intervals(&self) -> (u64, u64) {
        (
            self.interval_min_ms.load(Ordering::SeqCst),
            self.interval_max_ms.load(Ordering::SeqCst),
        )
    }

    pub fn set_intervals(&self, min_ms: u64, max_ms: u64) {
        self.interval_min_ms.store(min_ms, Ordering::SeqCst);
        self.interval_max_ms.store(max_ms.max(min_ms), Ordering::SeqCst);
    }
}

/// Random passenger stream: uniform (from, to) pairs with from != to,
/// paced by a uniform interval through the simulated clock.
pub fn main(dispatcher: Arc<Dispatcher>, control: Arc<SimulationControl>) {
    let total_floors = dispatcher.total_floors();
    let mut rng = rand::thread_rng();

    while control.should_generate_more() {
        let id = control.next_passenger_id();

        let from = rng.gen_range(1..=total_floors);
        let mut to = rng.gen_range(1..=total_floors);
        while to == from {
            to = rng.gen_range(1..=total_floors);
        }

        dispatcher.submit_request(Passenger::new(id, from, to));

        let (min_ms, max_ms) = control.intervals();
        clock::sleep(rng.gen_range(min_ms..=max_ms));
    }

    logging::log_line(
        "GENERATOR",
        "SYSTEM",
        &format!("Generated {} passengers. No more new requests.", control.generated_count()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_cannot_drop_below_generated() {
        let control = SimulationControl::new(5, 10, 20);
        assert_eq!(control.next_passenger_id(), 1);
        assert_eq!(control.next_passenger_id(), 2);

        control.set_passenger_limit(1);
        assert_eq!(control.passenger_limit(), 5);
        control.set_passenger_limit(8);
        assert_eq!(control.passenger_limit(), 8);
    }

    #[test]
    fn intervals_stay_ordered() {
        let control = SimulationControl::new(5, 10, 20);
        control.set_intervals(50, 30);
        assert_eq!(control.intervals(), (50, 50));
    }

    #[test]
    fn generation_stops_at_the_limit() {
        let control = SimulationControl::new(2, 0, 0);
        assert!(control.should_generate_more());
        control.next_passenger_id();
        control.next_passenger_id();
        assert!(!control.should_generate_more());
    }
}
