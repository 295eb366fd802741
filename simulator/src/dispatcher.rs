use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use shared_resources::config::SimulationConfig;
use shared_resources::direction::Direction;
use shared_resources::hall_call::HallCall;
use shared_resources::logging;
use shared_resources::passenger::Passenger;

use crate::elevator::{Elevator, HallCallRejectReason};
use crate::snapshot::{ElevatorSnapshot, ElevatorStatus};
use crate::strategy;
use crate::waiting::WaitingModel;

pub enum DispatcherEvent {
    PassengerRequest(Passenger),
    ElevatorUpdate(usize),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickMode {
    Normal,
    ReservedReverseSoon,
    Reserve,
}

struct AssignResult {
    pick: Option<(Arc<Elevator>, PickMode)>,
    full: usize,
    wrong_dir: usize,
    out_of_route: usize,
    stop_limit: usize,
    doors_busy: usize,
}

impl AssignResult {
    fn reason_summary(&self) -> String {
        format!(
            "(full={}, wrongDir={}, outOfRoute={}, stopLimit={}, doorsBusy={})",
            self.full, self.wrong_dir, self.out_of_route, self.stop_limit, self.doors_busy
        )
    }
}

/// Accepts passenger requests, keeps the waiting queues, and distributes
/// hall calls between the cars. Runs as its own worker thread consuming a
/// single event queue; a one-second receive timeout doubles as the safety
/// tick so pending calls are re-examined even if a notification is lost.
pub struct Dispatcher {
    config: Arc<SimulationConfig>,
    total_floors: u8,
    waiting: WaitingModel,
    events_tx: Sender<DispatcherEvent>,
    events_rx: Receiver<DispatcherEvent>,
    elevators: RwLock<Vec<Arc<Elevator>>>,
    /// Active hall calls that still need service.
    pending_calls: Mutex<BTreeSet<HallCall>>,
    /// Current owner of each hall call, so one call is not handed to
    /// every car at once.
    assigned_elevator: Mutex<HashMap<HallCall, Arc<Elevator>>>,
    last_no_elevator_log: Mutex<HashMap<HallCall, Instant>>,
    last_reassign: Mutex<HashMap<HallCall, Instant>>,
    running: AtomicBool,
}

impl Dispatcher {
    pub fn new(config: Arc<SimulationConfig>) -> Self {
        let (events_tx, events_rx) = unbounded();
        let total_floors = config.building.floors;
        Dispatcher {
            config,
            total_floors,
            waiting: WaitingModel::new(total_floors),
            events_tx,
            events_rx,
            elevators: RwLock::new(Vec::new()),
            pending_calls: Mutex::new(BTreeSet::new()),
            assigned_elevator: Mutex::new(HashMap::new()),
            last_no_elevator_log: Mutex::new(HashMap::new()),
            last_reassign: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
        }
    }

    pub fn total_floors(&self) -> u8 {
        self.total_floors
    }

    pub fn register_elevator(&self, elevator: Arc<Elevator>) {
        self.elevators.write().push(elevator);
    }

    /// A passenger presses the hall button.
    pub fn submit_request(&self, passenger: Passenger) {
        self.log(
            "REQUEST",
            &format!(
                "{} waiting at floor {} dir={}",
                passenger, passenger.start_floor, passenger.direction
            ),
        );
        self.events_tx.send(DispatcherEvent::PassengerRequest(passenger)).unwrap();
    }

    /// A car reports a state change (doors closed, went idle, load changed);
    /// triggers an immediate dispatch pass instead of waiting for the tick.
    pub fn notify_elevator_update(&self, elevator_id: usize) {
        self.events_tx.send(DispatcherEvent::ElevatorUpdate(elevator_id)).unwrap();
    }

    /// A car takes waiting passengers from a floor. This is the only path
    /// that consumes waiting passengers; when the queue empties, the hall
    /// call is retired and any lingering assignment cancelled so no car
    /// travels there for nothing.
    pub fn board_passengers(&self, floor: u8, dir: Direction, space_available: usize) -> Vec<Passenger> {
        if space_available == 0 || floor < 1 || floor > self.total_floors {
            return Vec::new();
        }

        let boarded = self.waiting.board(floor, dir, space_available);

        if self.waiting.count(floor, dir) == 0 {
            let call = HallCall::new(floor, dir);
            self.pending_calls.lock().remove(&call);
            let assigned = self.assigned_elevator.lock().remove(&call);
            self.last_no_elevator_log.lock().remove(&call);
            if let Some(assigned) = assigned {
                assigned.cancel_hall_call(floor, dir);
            }
        }

        boarded
    }

    pub fn waiting_count(&self, floor: u8, dir: Direction) -> usize {
        self.waiting.count(floor, dir)
    }

    pub fn has_waiting(&self, floor: u8, dir: Direction) -> bool {
        self.waiting.has_waiting(floor, dir)
    }

    pub fn total_waiting(&self) -> usize {
        self.waiting.total_waiting()
    }

    /// Best-effort view of a floor queue for the status view only.
    pub fn peek_waiting(&self, floor: u8, dir: Direction, limit: usize) -> Vec<Passenger> {
        self.waiting.peek(floor, dir, limit)
    }

    /// At-the-floor transfer of a hall call to the car that is actually
    /// there: the dispatcher may have assigned the call while the claimer
    /// was already passing the floor, and stopping now beats letting the
    /// original assignee travel the whole way.
    pub fn claim_hall_call_at_floor(&self, floor: u8, dir: Direction, claimer_id: usize) -> bool {
        if floor < 1 || floor > self.total_floors {
            return false;
        }
        if !self.has_waiting(floor, dir) {
            return false;
        }
        let Some(claimer) = self.elevator_by_id(claimer_id) else {
            return false;
        };

        let call = HallCall::new(floor, dir);
        self.pending_calls.lock().insert(call);

        let previous = self.assigned_elevator.lock().insert(call, claimer);
        if let Some(previous) = previous {
            if previous.id() != claimer_id {
                previous.cancel_hall_call(floor, dir);
                self.last_reassign.lock().insert(call, Instant::now());
            }
        }
        self.last_no_elevator_log.lock().remove(&call);
        true
    }

    /// Current owner of a hall call, for en-route pickup decisions.
    pub fn assigned_elevator(&self, floor: u8, dir: Direction) -> Option<Arc<Elevator>> {
        if floor < 1 || floor > self.total_floors {
            return None;
        }
        self.assigned_elevator.lock().get(&HallCall::new(floor, dir)).cloned()
    }

    /// Nothing waiting, nothing pending, nothing assigned and no queued
    /// events: the system has fully drained.
    pub fn is_idle(&self) -> bool {
        self.total_waiting() == 0
            && self.pending_calls.lock().is_empty()
            && self.assigned_elevator.lock().is_empty()
            && self.events_rx.is_empty()
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.events_tx.send(DispatcherEvent::Shutdown).ok();
    }

    pub fn run(&self) {
        self.log("SYSTEM", "Dispatcher started");

        while self.running.load(Ordering::SeqCst) {
            match self.events_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(event) => {
                    self.handle_event(event);

                    // Drain a batch so one dispatch pass covers a burst.
                    for _ in 0..self.config.dispatch.dispatcher_event_batch {
                        match self.events_rx.try_recv() {
                            Ok(next) => self.handle_event(next),
                            Err(_) => break,
                        }
                    }

                    self.dispatch_pending_calls();
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Safety tick in case a notification was missed.
                    self.dispatch_pending_calls();
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.log("SYSTEM", "Dispatcher stopped");
    }

    fn handle_event(&self, event: DispatcherEvent) {
        match event {
            DispatcherEvent::PassengerRequest(passenger) => self.enqueue_waiting(passenger),
            // ELEVATOR_UPDATE carries no work of its own; it exists to
            // trigger the dispatch pass right after doors close or a car
            // goes idle.
            DispatcherEvent::ElevatorUpdate(_) => (),
            DispatcherEvent::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn enqueue_waiting(&self, passenger: Passenger) {
        let call = HallCall::new(passenger.start_floor, passenger.direction);
        self.waiting.submit(passenger);
        self.pending_calls.lock().insert(call);
    }

    fn dispatch_pending_calls(&self) {
        // Work over a snapshot so no lock is held across car calls.
        let snapshot: Vec<HallCall> = self.pending_calls.lock().iter().copied().collect();

        for call in snapshot {
            // Nobody left waiting (e.g. picked up en route): retire the
            // call the way a real hall button goes dark.
            if !self.has_waiting(call.floor, call.direction) {
                self.pending_calls.lock().remove(&call);
                self.assigned_elevator.lock().remove(&call);
                self.last_no_elevator_log.lock().remove(&call);
                continue;
            }

            let assigned = self.assigned_elevator.lock().get(&call).cloned();
            if let Some(assigned) = assigned {
                if assigned.can_continue_serving_assigned_call(call) {
                    if self.should_reassign(call, &assigned) {
                        // Release and let the pick below find a better car.
                        self.assigned_elevator.lock().remove(&call);
                        assigned.cancel_hall_call(call.floor, call.direction);
                        self.last_reassign.lock().insert(call, Instant::now());
                    } else {
                        continue;
                    }
                } else {
                    // The car became unsuitable (full, too many stops, ...):
                    // release the call and clear it from the car's route so
                    // no ghost stop survives.
                    self.assigned_elevator.lock().remove(&call);
                    assigned.cancel_hall_call(call.floor, call.direction);
                }
            }

            let pick = self.find_best_elevator(call);
            let Some((elevator, mode)) = pick.pick.clone() else {
                let now = Instant::now();
                let mut last_log = self.last_no_elevator_log.lock();
                let throttled = last_log.get(&call).map_or(false, |last| {
                    now.duration_since(*last)
                        < Duration::from_millis(self.config.dispatch.no_elevator_log_cooldown_ms)
                });
                if !throttled {
                    last_log.insert(call, now);
                    drop(last_log);
                    self.log("ASSIGN", &format!("{} - NO_ELEVATOR {}", call, pick.reason_summary()));
                }
                continue;
            };

            let before = elevator.snapshot();
            let accepted = match mode {
                PickMode::ReservedReverseSoon => elevator.try_reserve_hall_call(call),
                _ => elevator.try_add_hall_call(call.floor, call.direction),
            };

            if !accepted {
                // Race or overflow; park the call on the car and keep it pending.
                elevator.defer_call(call);
                self.log(
                    "ASSIGN",
                    &format!(
                        "{} -> Elevator-{} (at {}, going {}, load={}/{}, stops={}) - REJECTED: FULL_CAPACITY",
                        call,
                        before.id,
                        before.current_floor,
                        before.direction,
                        before.load,
                        before.capacity,
                        before.planned_stops
                    ),
                );
                continue;
            }

            // The call stays in pending_calls until actually served.
            self.assigned_elevator.lock().insert(call, elevator.clone());
            self.last_no_elevator_log.lock().remove(&call);

            let s = elevator.snapshot();
            self.log(
                "ASSIGN",
                &format!(
                    "{} -> Elevator-{} (at {}, going {}, load={}/{}, stops={}, pick={:?})",
                    call, s.id, s.current_floor, s.direction, s.load, s.capacity, s.planned_stops, mode
                ),
            );
        }
    }

    /// Three-pass pick: cars that plainly accept, then near-reversal
    /// reservations at a large penalty, then any all-empty car as a last
    /// resort before giving up.
    fn find_best_elevator(&self, call: HallCall) -> AssignResult {
        let elevators = self.elevators.read();

        let mut full = 0;
        let mut wrong_dir = 0;
        let mut out_of_route = 0;
        let mut stop_limit = 0;
        let mut doors_busy = 0;

        // PASS 1: strict selection, ACCEPTED only.
        let mut best: Option<Arc<Elevator>> = None;
        let mut min_cost = i32::MAX;
        for e in elevators.iter() {
            let reason = e.can_accept_hall_call_reason(call);
            if reason == HallCallRejectReason::AcceptedReserved {
                // Considered in the separate pass with a heavy penalty.
                continue;
            }
            if reason != HallCallRejectReason::Accepted {
                match reason {
                    HallCallRejectReason::FullCapacity => full += 1,
                    HallCallRejectReason::WrongDirection => wrong_dir += 1,
                    HallCallRejectReason::OutOfRoute => out_of_route += 1,
                    HallCallRejectReason::TooManyStops => stop_limit += 1,
                    HallCallRejectReason::DoorsBusy => doors_busy += 1,
                    _ => (),
                }
                continue;
            }

            let s = e.snapshot();
            let assigned_count = self.assigned_count_for(e.id());
            let mut cost = strategy::calculate_cost(&s, call, &self.config);
            cost += assigned_count as i32 * 6;
            if strategy::is_on_the_way(&s, call) {
                cost -= 3;
            }

            if cost < min_cost {
                min_cost = cost;
                best = Some(e.clone());
            } else if cost == min_cost {
                // Tie-break: fewer assignments, then fewer planned stops,
                // then lower load.
                let replace = match &best {
                    Some(current) => {
                        let current_assigned = self.assigned_count_for(current.id());
                        if assigned_count < current_assigned {
                            true
                        } else if assigned_count == current_assigned {
                            let sb = current.snapshot();
                            s.planned_stops < sb.planned_stops
                                || (s.planned_stops == sb.planned_stops && s.load < sb.load)
                        } else {
                            false
                        }
                    }
                    None => false,
                };
                if replace {
                    best = Some(e.clone());
                }
            }
        }
        if let Some(best) = best {
            return AssignResult {
                pick: Some((best, PickMode::Normal)),
                full,
                wrong_dir,
                out_of_route,
                stop_limit,
                doors_busy,
            };
        }

        // PASS 2: opposite-direction reservations from empty cars about to
        // reverse; penalized so this is only chosen when it is reasonable.
        let mut best_reserved: Option<Arc<Elevator>> = None;
        let mut min_reserved_cost = i32::MAX;
        for e in elevators.iter() {
            if e.can_accept_hall_call_reason(call) != HallCallRejectReason::AcceptedReserved {
                continue;
            }
            let s = e.snapshot();
            if s.load >= s.capacity {
                continue;
            }
            if s.planned_stops >= self.config.dispatch.max_planned_stops {
                continue;
            }
            if s.status == ElevatorStatus::DoorsOpen {
                doors_busy += 1;
                continue;
            }

            let cost = strategy::calculate_cost(&s, call, &self.config)
                + 25
                + self.assigned_count_for(e.id()) as i32 * 6;
            if cost < min_reserved_cost {
                min_reserved_cost = cost;
                best_reserved = Some(e.clone());
            }
        }
        if let Some(best_reserved) = best_reserved {
            return AssignResult {
                pick: Some((best_reserved, PickMode::ReservedReverseSoon)),
                full,
                wrong_dir,
                out_of_route,
                stop_limit,
                doors_busy,
            };
        }

        // PASS 3: any completely empty car beats letting the call starve.
        let mut best_reserve: Option<Arc<Elevator>> = None;
        let mut min_reserve_cost = i32::MAX;
        for e in elevators.iter() {
            let s = e.snapshot();
            if s.load != 0 || s.planned_stops != 0 || s.status == ElevatorStatus::DoorsOpen {
                continue;
            }

            let distance = (s.current_floor as i32 - call.floor as i32).abs();
            let cost = distance * 6 + self.assigned_count_for(e.id()) as i32 * 6;
            if cost < min_reserve_cost {
                min_reserve_cost = cost;
                best_reserve = Some(e.clone());
            }
        }
        if let Some(best_reserve) = best_reserve {
            return AssignResult {
                pick: Some((best_reserve, PickMode::Reserve)),
                full,
                wrong_dir,
                out_of_route,
                stop_limit,
                doors_busy,
            };
        }

        AssignResult {
            pick: None,
            full,
            wrong_dir,
            out_of_route,
            stop_limit,
            doors_busy,
        }
    }

    /// Reassignment hysteresis: an assigned call only moves when the
    /// cooldown has passed, the current car has not hard-committed it, it
    /// is still some distance out, and a clearly better car exists.
    fn should_reassign(&self, call: HallCall, currently_assigned: &Arc<Elevator>) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_reassign.lock().get(&call) {
            if now.duration_since(*last)
                < Duration::from_millis(self.config.dispatch.call_reassign_cooldown_ms)
            {
                return false;
            }
        }

        if currently_assigned.is_committed_to_hall_call(call) {
            return false;
        }

        let sa = currently_assigned.snapshot();
        if (sa.current_floor as i32 - call.floor as i32).abs() <= 1 {
            return false;
        }

        let best = self.find_best_elevator(call);
        let Some((best_elevator, _)) = best.pick else {
            return false;
        };
        if best_elevator.id() == currently_assigned.id() {
            return false;
        }

        // Only move the call to a car that is actually free or on the way.
        let sb = best_elevator.snapshot();
        if sb.direction != Direction::Idle && !strategy::is_on_the_way(&sb, call) {
            return false;
        }

        let cost_assigned = self.effective_cost(&sa, call, self.assigned_count_for(currently_assigned.id()));
        let cost_best = self.effective_cost(&sb, call, self.assigned_count_for(best_elevator.id()));

        cost_assigned - cost_best >= self.config.dispatch.call_reassign_min_improvement
    }

    /// Cost consistent with `find_best_elevator`, including the assignment
    /// balancing and the on-the-way bonus.
    fn effective_cost(&self, s: &ElevatorSnapshot, call: HallCall, assigned_count: usize) -> i32 {
        let mut cost = strategy::calculate_cost(s, call, &self.config);
        cost += assigned_count as i32 * 6;
        if strategy::is_on_the_way(s, call) {
            cost -= 3;
        }
        cost
    }

    fn assigned_count_for(&self, elevator_id: usize) -> usize {
        self.assigned_elevator
            .lock()
            .values()
            .filter(|e| e.id() == elevator_id)
            .count()
    }

    fn elevator_by_id(&self, elevator_id: usize) -> Option<Arc<Elevator>> {
        self.elevators.read().iter().find(|e| e.id() == elevator_id).cloned()
    }

    fn log(&self, tag: &str, message: &str) {
        logging::log_line("Dispatcher", tag, message);
    }
}

#[cfg(test)]
impl Dispatcher {
    /// Enqueue without going through the worker thread.
    pub fn submit_request_sync(&self, passenger: Passenger) {
        self.enqueue_waiting(passenger);
    }

    pub fn record_assignment(&self, call: HallCall, elevator: Arc<Elevator>) {
        self.assigned_elevator.lock().insert(call, elevator);
    }
}
