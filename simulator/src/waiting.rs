use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use shared_resources::direction::Direction;
use shared_resources::passenger::Passenger;

struct FloorQueue {
    queue: Mutex<VecDeque<Passenger>>,
    count: AtomicUsize,
}

impl FloorQueue {
    fn new() -> Self {
        FloorQueue {
            queue: Mutex::new(VecDeque::new()),
            count: AtomicUsize::new(0),
        }
    }
}

/// Per-floor, per-direction FIFO queues of waiting passengers.
///
/// The atomic counter next to each queue is the authoritative size: decision
/// logic reads `count`/`has_waiting`, the queue itself is only popped by
/// `board` and cloned by the best-effort `peek` for the status view.
pub struct WaitingModel {
    total_floors: u8,
    waiting_up: Vec<FloorQueue>,
    waiting_down: Vec<FloorQueue>,
}

impl WaitingModel {
    pub fn new(total_floors: u8) -> Self {
        // Slot 0 stays unused so queues index directly by floor number.
        let mut waiting_up = Vec::with_capacity(total_floors as usize + 1);
        let mut waiting_down = Vec::with_capacity(total_floors as usize + 1);
        for _ in 0..=total_floors {
            waiting_up.push(FloorQueue::new());
            waiting_down.push(FloorQueue::new());
        }
        WaitingModel {
            total_floors,
            waiting_up,
            waiting_down,
        }
    }

    pub fn total_floors(&self) -> u8 {
        self.total_floors
    }

    fn queue_for(&self, floor: u8, dir: Direction) -> Option<&FloorQueue> {
        if floor < 1 || floor > self.total_floors {
            return None;
        }
        let slot = match dir {
            Direction::Down => &self.waiting_down[floor as usize],
            _ => &self.waiting_up[floor as usize],
        };
        Some(slot)
    }

    pub fn submit(&self, passenger: Passenger) {
        let Some(slot) = self.queue_for(passenger.start_floor, passenger.direction) else {
            return;
        };
        slot.queue.lock().push_back(passenger);
        slot.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Dequeue up to `max` passengers heading `dir` from `floor`.
    pub fn board(&self, floor: u8, dir: Direction, max: usize) -> Vec<Passenger> {
        if max == 0 {
            return Vec::new();
        }
        let Some(slot) = self.queue_for(floor, dir) else {
            return Vec::new();
        };
        let mut queue = slot.queue.lock();
        let mut boarded = Vec::new();
        while boarded.len() < max {
            match queue.pop_front() {
                Some(p) => {
                    slot.count.fetch_sub(1, Ordering::SeqCst);
                    boarded.push(p);
                }
                None => break,
            }
        }
        boarded
    }

    pub fn count(&self, floor: u8, dir: Direction) -> usize {
        match self.queue_for(floor, dir) {
            Some(slot) => slot.count.load(Ordering::SeqCst),
            None => 0,
        }
    }

    pub fn has_waiting(&self, floor: u8, dir: Direction) -> bool {
        self.count(floor, dir) > 0
    }

    /// Best-effort prefix snapshot for visualization only; decision logic
    /// must use `count`/`board`.
    pub fn peek(&self, floor: u8, dir: Direction, limit: usize) -> Vec<Passenger> {
        if limit == 0 {
            return Vec::new();
        }
        let Some(slot) = self.queue_for(floor, dir) else {
            return Vec::new();
        };
        slot.queue.lock().iter().take(limit).cloned().collect()
    }

    pub fn total_waiting(&self) -> usize {
        let mut sum = 0;
        for floor in 1..=self.total_floors as usize {
            sum += self.waiting_up[floor].count.load(Ordering::SeqCst);
            sum += self.waiting_down[floor].count.load(Ordering::SeqCst);
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passenger(id: usize, from: u8, to: u8) -> Passenger {
        Passenger::new(id, from, to)
    }

    #[test]
    fn fifo_within_floor_and_direction() {
        let model = WaitingModel::new(10);
        model.submit(passenger(1, 3, 7));
        model.submit(passenger(2, 3, 9));
        model.submit(passenger(3, 3, 5));
        assert_eq!(model.count(3, Direction::Up), 3);

        let boarded = model.board(3, Direction::Up, 2);
        assert_eq!(boarded.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(model.count(3, Direction::Up), 1);

        let rest = model.board(3, Direction::Up, 5);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, 3);
        assert_eq!(model.count(3, Direction::Up), 0);
        assert!(model.board(3, Direction::Up, 1).is_empty());
    }

    #[test]
    fn directions_are_independent() {
        let model = WaitingModel::new(10);
        model.submit(passenger(1, 5, 9));
        model.submit(passenger(2, 5, 1));
        assert_eq!(model.count(5, Direction::Up), 1);
        assert_eq!(model.count(5, Direction::Down), 1);
        assert!(model.board(5, Direction::Down, 3).iter().all(|p| p.id == 2));
        assert!(model.has_waiting(5, Direction::Up));
    }

    #[test]
    fn out_of_range_floors_are_neutral() {
        let model = WaitingModel::new(5);
        model.submit(passenger(1, 0, 3));
        model.submit(passenger(2, 9, 3));
        assert_eq!(model.total_waiting(), 0);
        assert!(model.board(0, Direction::Up, 1).is_empty());
        assert!(model.board(9, Direction::Down, 1).is_empty());
        assert_eq!(model.count(9, Direction::Up), 0);
        assert!(model.peek(9, Direction::Up, 4).is_empty());
    }

    #[test]
    fn peek_does_not_consume() {
        let model = WaitingModel::new(10);
        model.submit(passenger(1, 2, 6));
        model.submit(passenger(2, 2, 8));
        let peeked = model.peek(2, Direction::Up, 1);
        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[0].id, 1);
        assert_eq!(model.count(2, Direction::Up), 2);
    }
}
