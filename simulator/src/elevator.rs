use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use shared_resources::clock;
use shared_resources::config::SimulationConfig;
use shared_resources::direction::Direction;
use shared_resources::hall_call::HallCall;
use shared_resources::logging;
use shared_resources::passenger::Passenger;

use crate::dispatcher::Dispatcher;
use crate::snapshot::{ElevatorSnapshot, ElevatorStatus};

/// Outcome of the dispatcher's side-effect-free acceptance probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HallCallRejectReason {
    Accepted,
    AcceptedReserved,
    FullCapacity,
    WrongDirection,
    OutOfRoute,
    TooManyStops,
    DoorsBusy,
}

/// Set of travel directions committed at one floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionSet {
    pub up: bool,
    pub down: bool,
}

impl DirectionSet {
    pub fn both() -> Self {
        DirectionSet { up: true, down: true }
    }

    pub fn insert(&mut self, dir: Direction) {
        match dir {
            Direction::Up => self.up = true,
            Direction::Down => self.down = true,
            Direction::Idle => (),
        }
    }

    pub fn remove(&mut self, dir: Direction) {
        match dir {
            Direction::Up => self.up = false,
            Direction::Down => self.down = false,
            Direction::Idle => (),
        }
    }

    pub fn contains(self, dir: Direction) -> bool {
        match dir {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Idle => false,
        }
    }

    pub fn is_empty(self) -> bool {
        !self.up && !self.down
    }

    pub fn remove_all(&mut self, other: DirectionSet) {
        if other.up {
            self.up = false;
        }
        if other.down {
            self.down = false;
        }
    }
}

struct CarState {
    current_floor: u8,
    direction: Direction,
    status: ElevatorStatus,
    passengers: Vec<Passenger>,
    // Hall stops split by which side of the car they were on when inserted;
    // a floor equal to the current one counts as "up".
    stops_up: BTreeSet<u8>,
    stops_down: BTreeSet<u8>,
    internal_stops_up: BTreeSet<u8>,
    internal_stops_down: BTreeSet<u8>,
    hall_calls_by_floor: HashMap<u8, DirectionSet>,
    // Soft commitments taken just before an expected reversal; merged into
    // the stop sets only once the car is empty and out of other work.
    reserved_calls: HashSet<HallCall>,
}

impl CarState {
    fn new(start_floor: u8) -> Self {
        CarState {
            current_floor: start_floor,
            direction: Direction::Idle,
            status: ElevatorStatus::Idle,
            passengers: Vec::new(),
            stops_up: BTreeSet::new(),
            stops_down: BTreeSet::new(),
            internal_stops_up: BTreeSet::new(),
            internal_stops_down: BTreeSet::new(),
            hall_calls_by_floor: HashMap::new(),
            reserved_calls: HashSet::new(),
        }
    }

    fn planned_hall_stops(&self) -> usize {
        self.stops_up.len() + self.stops_down.len()
    }

    fn planned_stops_total(&self) -> usize {
        self.planned_hall_stops() + self.internal_stops_up.len() + self.internal_stops_down.len()
    }

    fn add_stop(&mut self, floor: u8) {
        if floor >= self.current_floor {
            self.stops_up.insert(floor);
        } else {
            self.stops_down.insert(floor);
        }
    }

    fn add_internal_stop(&mut self, floor: u8) {
        if floor >= self.current_floor {
            self.internal_stops_up.insert(floor);
        } else {
            self.internal_stops_down.insert(floor);
        }
        self.add_stop(floor);
    }

    fn has_internal_need_for(&self, floor: u8) -> bool {
        self.passengers.iter().any(|p| p.target_floor == floor)
    }

    /// Farthest requested floor above/below the current one, counting both
    /// stop sets and onboard destinations. 0 means no work on that side.
    fn route_envelope(&self) -> (u8, u8) {
        let mut furthest_up: u8 = 0;
        let mut furthest_down: u8 = 0;
        let floors = self
            .stops_up
            .iter()
            .chain(self.stops_down.iter())
            .copied()
            .chain(self.passengers.iter().map(|p| p.target_floor));
        for f in floors {
            if f > self.current_floor {
                furthest_up = furthest_up.max(f);
            }
            if f < self.current_floor {
                furthest_down = if furthest_down == 0 { f } else { furthest_down.min(f) };
            }
        }
        (furthest_up, furthest_down)
    }

    fn ceiling(set: &BTreeSet<u8>, floor: u8) -> Option<u8> {
        set.range(floor..).next().copied().or_else(|| set.iter().next().copied())
    }

    fn floor_of(set: &BTreeSet<u8>, floor: u8) -> Option<u8> {
        set.range(..=floor).next_back().copied().or_else(|| set.iter().next_back().copied())
    }

    fn update_direction(&mut self) {
        if self.direction == Direction::Idle {
            let up = Self::ceiling(&self.stops_up, self.current_floor);
            let down = Self::floor_of(&self.stops_down, self.current_floor);
            self.direction = match (up, down) {
                (None, None) => Direction::Idle,
                (None, Some(_)) => Direction::Down,
                (Some(_), None) => Direction::Up,
                (Some(up), Some(down)) => {
                    let dist_up = (up as i32 - self.current_floor as i32).abs();
                    let dist_down = (self.current_floor as i32 - down as i32).abs();
                    if dist_up <= dist_down {
                        Direction::Up
                    } else {
                        Direction::Down
                    }
                }
            };
            return;
        }

        if self.direction == Direction::Up && self.stops_up.is_empty() && !self.stops_down.is_empty() {
            self.direction = Direction::Down;
        } else if self.direction == Direction::Down
            && self.stops_down.is_empty()
            && !self.stops_up.is_empty()
        {
            self.direction = Direction::Up;
        }
    }

    /// Internal stops in the current direction first, then hall stops; from
    /// idle, the closer of the nearest internal or hall target.
    fn choose_next_target(&self) -> Option<u8> {
        match self.direction {
            Direction::Up => Self::ceiling(&self.internal_stops_up, self.current_floor)
                .or_else(|| Self::ceiling(&self.stops_up, self.current_floor)),
            Direction::Down => Self::floor_of(&self.internal_stops_down, self.current_floor)
                .or_else(|| Self::floor_of(&self.stops_down, self.current_floor)),
            Direction::Idle => {
                let internal_up = Self::ceiling(&self.internal_stops_up, self.current_floor);
                let internal_down = Self::floor_of(&self.internal_stops_down, self.current_floor);
                let nearest_internal = self.closer_of(internal_up, internal_down);
                if nearest_internal.is_some() {
                    return nearest_internal;
                }

                let up = Self::ceiling(&self.stops_up, self.current_floor);
                let down = Self::floor_of(&self.stops_down, self.current_floor);
                self.closer_of(up, down)
            }
        }
    }

    fn closer_of(&self, up: Option<u8>, down: Option<u8>) -> Option<u8> {
        match (up, down) {
            (None, None) => None,
            (Some(u), None) => Some(u),
            (None, Some(d)) => Some(d),
            (Some(u), Some(d)) => {
                let dist_up = (u as i32 - self.current_floor as i32).abs();
                let dist_down = (self.current_floor as i32 - d as i32).abs();
                if dist_up <= dist_down {
                    Some(u)
                } else {
                    Some(d)
                }
            }
        }
    }
}

/// One car of the group: owns its stop sets, direction commitment and door
/// state machine, and runs its own control thread. The dispatcher talks to
/// it only through the atomic operations below.
pub struct Elevator {
    id: usize,
    max_capacity: usize,
    config: Arc<SimulationConfig>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<CarState>,
    new_task: Condvar,
    pending_calls: SegQueue<HallCall>,
    visual_pos_bits: AtomicU64,
    running: AtomicBool,
    delivered: AtomicUsize,
}

impl Elevator {
    pub fn new(
        id: usize,
        start_floor: u8,
        max_capacity: usize,
        config: Arc<SimulationConfig>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Elevator {
            id,
            max_capacity,
            config,
            dispatcher,
            state: Mutex::new(CarState::new(start_floor)),
            new_task: Condvar::new(),
            pending_calls: SegQueue::new(),
            visual_pos_bits: AtomicU64::new((start_floor as f64).to_bits()),
            running: AtomicBool::new(true),
            delivered: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.max_capacity
    }

    /// Total passengers dropped off at their destination so far.
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Smoothed position for the status view; lags `current_floor` while
    /// the car is between floors.
    pub fn visual_pos(&self) -> f64 {
        f64::from_bits(self.visual_pos_bits.load(Ordering::Relaxed))
    }

    fn set_visual_pos(&self, pos: f64) {
        self.visual_pos_bits.store(pos.to_bits(), Ordering::Relaxed);
    }

    pub fn passengers_snapshot(&self, limit: usize) -> Vec<Passenger> {
        let st = self.state.lock();
        if st.passengers.is_empty() {
            return Vec::new();
        }
        let n = if limit == 0 { st.passengers.len() } else { limit.min(st.passengers.len()) };
        st.passengers[..n].to_vec()
    }

    pub fn add_internal_stop(&self, floor: u8) {
        let mut st = self.state.lock();
        st.add_internal_stop(floor);
        self.new_task.notify_all();
    }

    pub fn add_hall_call(&self, floor: u8, dir: Direction) {
        let _ = self.try_add_hall_call(floor, dir);
    }

    pub fn try_add_hall_call(&self, floor: u8, dir: Direction) -> bool {
        if dir == Direction::Idle {
            return false;
        }
        if floor < 1 || floor > self.config.building.floors {
            return false;
        }

        let mut st = self.state.lock();

        if st.passengers.len() >= self.max_capacity {
            st.status = ElevatorStatus::LoadFull;
            return false;
        }

        if floor == st.current_floor && st.status == ElevatorStatus::DoorsOpen {
            st.hall_calls_by_floor.entry(floor).or_default().insert(dir);
            self.new_task.notify_all();
            return true;
        }

        if st.direction == Direction::Up && floor < st.current_floor {
            return false;
        }
        if st.direction == Direction::Down && floor > st.current_floor {
            return false;
        }

        if st.direction != Direction::Idle && dir != st.direction {
            if st.passengers.is_empty()
                && st.planned_stops_total() <= 1
                && st.status != ElevatorStatus::DoorsOpen
            {
                st.reserved_calls.insert(HallCall::new(floor, dir));
                self.new_task.notify_all();
                return true;
            }
            return false;
        }

        st.hall_calls_by_floor.entry(floor).or_default().insert(dir);
        st.add_stop(floor);
        self.new_task.notify_all();
        true
    }

    pub fn try_reserve_hall_call(&self, call: HallCall) -> bool {
        if call.direction == Direction::Idle {
            return false;
        }

        let mut st = self.state.lock();
        if st.passengers.len() >= self.max_capacity {
            st.status = ElevatorStatus::LoadFull;
            return false;
        }
        if st.planned_hall_stops() >= self.config.dispatch.max_planned_stops {
            return false;
        }

        st.reserved_calls.insert(call);
        self.new_task.notify_all();
        true
    }

    pub fn can_accept_hall_call(&self, call: HallCall) -> bool {
        self.can_accept_hall_call_reason(call) == HallCallRejectReason::Accepted
    }

    pub fn can_continue_serving_assigned_call(&self, call: HallCall) -> bool {
        // If the car already committed this call (planned or reserved), keep the assignment.
        if self.is_committed_to_hall_call(call) {
            return true;
        }

        let s = self.snapshot();

        // Already at the floor with open doors: don't thrash assignments,
        // the car decides boarding itself.
        if s.status == ElevatorStatus::DoorsOpen && s.current_floor == call.floor {
            return true;
        }

        match self.can_accept_hall_call_reason(call) {
            HallCallRejectReason::Accepted | HallCallRejectReason::AcceptedReserved => true,
            // Temporarily unavailable; keep the assignment until the doors close.
            HallCallRejectReason::DoorsBusy => true,
            _ => false,
        }
    }

    pub fn can_accept_hall_call_reason(&self, call: HallCall) -> HallCallRejectReason {
        let st = self.state.lock();

        let load = st.passengers.len();
        if load >= self.max_capacity {
            return HallCallRejectReason::FullCapacity;
        }
        if st.planned_hall_stops() >= self.config.dispatch.max_planned_stops {
            return HallCallRejectReason::TooManyStops;
        }

        let (furthest_up, furthest_down) = st.route_envelope();

        // With doors open on this floor, accept only the current service
        // direction: a new hall call must not flip direction mid-exchange.
        if st.status == ElevatorStatus::DoorsOpen {
            if st.current_floor != call.floor {
                return HallCallRejectReason::DoorsBusy;
            }
            if st.direction == Direction::Idle || st.direction == call.direction {
                return HallCallRejectReason::Accepted;
            }
            return HallCallRejectReason::WrongDirection;
        }

        if st.direction == Direction::Idle {
            return HallCallRejectReason::Accepted;
        }

        // "On the way" in the same direction within the route envelope.
        if call.direction == st.direction {
            let on_way = if st.direction == Direction::Up {
                let bound = if furthest_up > 0 { furthest_up } else { st.current_floor };
                call.floor >= st.current_floor && call.floor <= bound
            } else {
                let bound = if furthest_down > 0 { furthest_down } else { st.current_floor };
                call.floor <= st.current_floor && call.floor >= bound
            };
            return if on_way {
                HallCallRejectReason::Accepted
            } else {
                HallCallRejectReason::OutOfRoute
            };
        }

        // Opposite direction: only reservable when empty, close to the
        // reversal point, and the call lies on the path toward it.
        if load != 0 {
            return HallCallRejectReason::WrongDirection;
        }

        let (dist_to_reverse, on_reverse_path) = if st.direction == Direction::Up {
            let top = if furthest_up > 0 { furthest_up } else { st.current_floor };
            (
                top.saturating_sub(st.current_floor),
                call.floor >= st.current_floor && call.floor <= top,
            )
        } else {
            let bottom = if furthest_down > 0 { furthest_down } else { st.current_floor };
            (
                st.current_floor.saturating_sub(bottom),
                call.floor <= st.current_floor && call.floor >= bottom,
            )
        };

        let reserve_ok = on_reverse_path
            && dist_to_reverse <= self.config.dispatch.reserve_reverse_soon_floors
            && st.planned_hall_stops() <= 1;

        if reserve_ok {
            HallCallRejectReason::AcceptedReserved
        } else {
            HallCallRejectReason::WrongDirection
        }
    }

    pub fn is_committed_to_hall_call(&self, call: HallCall) -> bool {
        let st = self.state.lock();
        if st.reserved_calls.contains(&call) {
            return true;
        }
        st.hall_calls_by_floor
            .get(&call.floor)
            .map_or(false, |dirs| dirs.contains(call.direction))
    }

    pub fn cancel_hall_call(&self, floor: u8, dir: Direction) {
        if dir == Direction::Idle {
            return;
        }

        let mut st = self.state.lock();
        st.reserved_calls.remove(&HallCall::new(floor, dir));

        if let Some(set) = st.hall_calls_by_floor.get_mut(&floor) {
            set.remove(dir);
            if set.is_empty() {
                st.hall_calls_by_floor.remove(&floor);
            }
        }

        if !st.hall_calls_by_floor.contains_key(&floor) && !st.has_internal_need_for(floor) {
            st.stops_up.remove(&floor);
            st.stops_down.remove(&floor);
        }

        self.new_task.notify_all();
    }

    pub fn snapshot(&self) -> ElevatorSnapshot {
        let st = self.state.lock();
        let (furthest_up, furthest_down) = st.route_envelope();
        ElevatorSnapshot {
            id: self.id,
            current_floor: st.current_floor,
            direction: st.direction,
            status: st.status,
            load: st.passengers.len(),
            capacity: self.max_capacity,
            planned_stops: st.planned_hall_stops(),
            furthest_up_stop: furthest_up,
            furthest_down_stop: furthest_down,
        }
    }

    pub fn is_truly_idle(&self) -> bool {
        let s = self.snapshot();
        s.load == 0 && s.planned_stops == 0 && s.direction == Direction::Idle
    }

    /// Park a call the car could not admit right now; it is retried after
    /// the next move leg or door cycle.
    pub fn defer_call(&self, call: HallCall) {
        self.pending_calls.push(call);
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _st = self.state.lock();
        self.new_task.notify_all();
    }

    pub fn run(&self) {
        self.log("SYSTEM", &format!("Started at floor {}", self.state.lock().current_floor));

        while self.running.load(Ordering::SeqCst) {
            let target = match self.next_target() {
                Some(target) => target,
                None => continue,
            };

            let arrived = self.move_to(target);

            {
                let mut st = self.state.lock();
                st.stops_up.remove(&arrived);
                st.stops_down.remove(&arrived);
                st.internal_stops_up.remove(&arrived);
                st.internal_stops_down.remove(&arrived);
                st.update_direction();
            }

            self.operate_doors_and_exchange(arrived);

            self.flush_pending_calls_if_possible();
        }

        self.log("SYSTEM", "Stopped");
    }

    /// Block until the car has something to do, then pick the next target.
    /// `None` means "nothing picked, re-check the loop" (also the shutdown
    /// path, which the run loop terminates on).
    fn next_target(&self) -> Option<u8> {
        let mut st = self.state.lock();

        while st.stops_up.is_empty() && st.stops_down.is_empty() && st.passengers.is_empty() {
            if !self.running.load(Ordering::SeqCst) {
                return None;
            }
            if !st.reserved_calls.is_empty() {
                self.activate_reserved_calls(&mut st);
                if !st.stops_up.is_empty() || !st.stops_down.is_empty() {
                    break;
                }
            }
            st.direction = Direction::Idle;
            st.status = ElevatorStatus::Idle;
            self.dispatcher.notify_elevator_update(self.id);
            self.new_task.wait(&mut st);
        }

        st.update_direction();
        let target = st.choose_next_target();
        if target.is_none() {
            st.update_direction();
        }
        target
    }

    /// Turn reservations into real stops, dropping any nobody waits on.
    fn activate_reserved_calls(&self, st: &mut CarState) {
        if st.reserved_calls.is_empty() || !st.passengers.is_empty() {
            return;
        }

        let calls: Vec<HallCall> = st.reserved_calls.drain().collect();
        for call in calls {
            if !self.dispatcher.has_waiting(call.floor, call.direction) {
                continue;
            }
            st.hall_calls_by_floor.entry(call.floor).or_default().insert(call.direction);
            st.add_stop(call.floor);
        }
    }

    /// Drive floor by floor toward `target`, re-checking after every floor
    /// whether to stop early for a planned stop or an en-route pickup.
    fn move_to(&self, target: u8) -> u8 {
        let (mut floors_to_travel, step) = {
            let mut st = self.state.lock();
            if target == st.current_floor {
                return st.current_floor;
            }
            st.status = ElevatorStatus::Moving;
            st.direction = if target > st.current_floor { Direction::Up } else { Direction::Down };
            (
                (target as i32 - st.current_floor as i32).unsigned_abs(),
                if target > st.current_floor { 1i32 } else { -1i32 },
            )
        };

        let move_ms = self.config.timing.time_move_one_floor;
        let tick_ms: u64 = 40;
        let substeps = (move_ms / tick_ms).max(1);
        let sleep_ms = (move_ms / substeps).max(1);

        while floors_to_travel > 0 {
            for _ in 0..substeps {
                clock::sleep(sleep_ms);
                self.set_visual_pos(self.visual_pos() + step as f64 / substeps as f64);
            }

            let (reached, direction) = {
                let mut st = self.state.lock();
                st.current_floor = (st.current_floor as i32 + step) as u8;
                (st.current_floor, st.direction)
            };
            self.set_visual_pos(reached as f64);
            floors_to_travel -= 1;

            if self.should_stop_at_floor(reached) {
                return reached;
            }

            if self.should_stop_for_waiting_at(reached, direction) {
                self.dispatcher.claim_hall_call_at_floor(reached, direction, self.id);
                return reached;
            }

            if !self.running.load(Ordering::SeqCst) {
                return reached;
            }
        }

        self.state.lock().current_floor
    }

    fn should_stop_at_floor(&self, floor: u8) -> bool {
        let st = self.state.lock();
        st.internal_stops_up.contains(&floor)
            || st.internal_stops_down.contains(&floor)
            || st.stops_up.contains(&floor)
            || st.stops_down.contains(&floor)
    }

    /// En-route pickup decision for a floor the car is passing: stop for
    /// waiting passengers in the travel direction unless the call's
    /// assigned car is close by and actually approaching.
    fn should_stop_for_waiting_at(&self, floor: u8, dir: Direction) -> bool {
        if !self.config.dispatch.enroute_pickup_enabled {
            return false;
        }
        if !dir.is_vertical() {
            return false;
        }
        if !self.dispatcher.has_waiting(floor, dir) {
            return false;
        }

        if self.load_safe() >= self.max_capacity {
            return false;
        }

        let s = self.snapshot();
        if s.planned_stops >= self.config.dispatch.max_planned_stops {
            return false;
        }

        let assigned = match self.dispatcher.assigned_elevator(floor, dir) {
            Some(assigned) => assigned,
            None => return true,
        };
        if assigned.id() == self.id {
            return true;
        }

        let a = assigned.snapshot();
        let dist = (a.current_floor as i32 - floor as i32).unsigned_abs() as u8;

        let moving_away = if dir == Direction::Up {
            // To serve an UP call the assigned car has to approach from below.
            (a.direction == Direction::Down && a.current_floor < floor)
                || (a.direction == Direction::Up && a.current_floor > floor)
        } else {
            // A DOWN call needs the assigned car approaching from above.
            (a.direction == Direction::Up && a.current_floor > floor)
                || (a.direction == Direction::Down && a.current_floor < floor)
        };

        if moving_away {
            return true;
        }
        dist >= self.config.dispatch.enroute_steal_min_assigned_distance
    }

    fn operate_doors_and_exchange(&self, floor: u8) {
        {
            // Guard against a doubled arrival at the same floor.
            let st = self.state.lock();
            if floor == st.current_floor && st.status == ElevatorStatus::DoorsOpen {
                return;
            }
        }

        self.log("ARRIVED", &format!("Floor {}", floor));

        {
            self.state.lock().status = ElevatorStatus::DoorsOpen;
        }
        self.log("DOOR", "OPEN");
        clock::sleep(self.config.timing.time_doors);

        let disembarked = {
            let mut st = self.state.lock();
            let before = st.passengers.len();
            st.passengers.retain(|p| p.target_floor != floor);
            before - st.passengers.len()
        };
        if disembarked > 0 {
            self.delivered.fetch_add(disembarked, Ordering::SeqCst);
            self.log("DISEMBARK", &format!("{} passengers", disembarked));
        }

        let allowed = {
            let st = self.state.lock();
            st.hall_calls_by_floor.get(&floor).copied().unwrap_or_default()
        };

        let mut allowed_for_boarding = allowed;
        if allowed_for_boarding.is_empty() {
            allowed_for_boarding = DirectionSet::both();
        }

        let boarding_dir = self.choose_boarding_direction(floor, allowed_for_boarding);

        let free_space = {
            let mut st = self.state.lock();
            let free = self.max_capacity.saturating_sub(st.passengers.len());
            if free == 0 {
                st.status = ElevatorStatus::LoadFull;
            }
            free
        };

        if let Some(dir) = boarding_dir {
            if free_space > 0 {
                let boarding = self.dispatcher.board_passengers(floor, dir, free_space);
                if !boarding.is_empty() {
                    {
                        let mut st = self.state.lock();
                        st.passengers.extend(boarding.iter().cloned());
                        debug_assert!(st.passengers.len() <= self.max_capacity);
                    }
                    for p in &boarding {
                        self.add_internal_stop(p.target_floor);
                    }

                    self.log(
                        "BOARD",
                        &format!(
                            "Boarded: {}, dir={}, load={}/{}",
                            boarding.len(),
                            dir,
                            self.load_safe(),
                            self.max_capacity
                        ),
                    );

                    clock::sleep(self.config.timing.time_boarding * boarding.len() as u64);
                }
            }
        }

        {
            let mut st = self.state.lock();
            if let Some(set) = st.hall_calls_by_floor.get_mut(&floor) {
                set.remove_all(allowed);
                if set.is_empty() {
                    st.hall_calls_by_floor.remove(&floor);
                }
            }
        }

        clock::sleep(self.config.timing.time_doors);
        self.log("DOOR", "CLOSE");

        {
            let mut st = self.state.lock();
            st.status = if st.passengers.len() >= self.max_capacity {
                ElevatorStatus::LoadFull
            } else {
                ElevatorStatus::Moving
            };
        }

        self.try_process_pending_calls();

        self.dispatcher.notify_elevator_update(self.id);
    }

    /// Which direction to board at `floor`, given the directions committed
    /// there. With passengers onboard, only the current travel direction is
    /// eligible; an empty car finishing a sweep will not pick up against
    /// its remaining stops.
    fn choose_boarding_direction(&self, floor: u8, allowed: DirectionSet) -> Option<Direction> {
        if allowed.is_empty() {
            return None;
        }

        let mut up_waiting = self.dispatcher.has_waiting(floor, Direction::Up);
        let mut down_waiting = self.dispatcher.has_waiting(floor, Direction::Down);
        up_waiting = up_waiting && allowed.contains(Direction::Up);
        down_waiting = down_waiting && allowed.contains(Direction::Down);

        if !up_waiting && !down_waiting {
            return None;
        }

        let (direction, has_stops_in_current_dir) = {
            let st = self.state.lock();
            if !st.passengers.is_empty() {
                if st.direction == Direction::Up && up_waiting {
                    return Some(Direction::Up);
                }
                if st.direction == Direction::Down && down_waiting {
                    return Some(Direction::Down);
                }
                return None;
            }

            let has_stops = match st.direction {
                Direction::Up => !st.stops_up.is_empty(),
                Direction::Down => !st.stops_down.is_empty(),
                Direction::Idle => false,
            };
            (st.direction, has_stops)
        };

        if direction == Direction::Up {
            if up_waiting {
                return Some(Direction::Up);
            }
            if has_stops_in_current_dir {
                return None; // still sweeping up, don't pick up downward riders
            }
            return if down_waiting { Some(Direction::Down) } else { None };
        }
        if direction == Direction::Down {
            if down_waiting {
                return Some(Direction::Down);
            }
            if has_stops_in_current_dir {
                return None; // still sweeping down, don't pick up upward riders
            }
            return if up_waiting { Some(Direction::Up) } else { None };
        }

        let up_count = self.dispatcher.waiting_count(floor, Direction::Up);
        let down_count = self.dispatcher.waiting_count(floor, Direction::Down);
        if up_waiting && down_waiting {
            return if up_count >= down_count { Some(Direction::Up) } else { Some(Direction::Down) };
        }
        if up_waiting {
            Some(Direction::Up)
        } else {
            Some(Direction::Down)
        }
    }

    /// Quick retry of a few deferred calls after a move leg; calls that are
    /// still inadmissible are dropped here and stay pending on the
    /// dispatcher side.
    fn flush_pending_calls_if_possible(&self) {
        if self.pending_calls.is_empty() {
            return;
        }
        if self.load_safe() >= self.max_capacity {
            self.state.lock().status = ElevatorStatus::LoadFull;
            return;
        }

        for _ in 0..3 {
            let call = match self.pending_calls.pop() {
                Some(call) => call,
                None => break,
            };
            if self.can_accept_hall_call(call) {
                self.add_hall_call(call.floor, call.direction);
            }
        }
    }

    /// Retry deferred calls after a door cycle: stale ones are dropped,
    /// still-inadmissible ones go back to the queue.
    fn try_process_pending_calls(&self) {
        for _ in 0..8 {
            let call = match self.pending_calls.pop() {
                Some(call) => call,
                None => return,
            };

            if !self.dispatcher.has_waiting(call.floor, call.direction) {
                continue;
            }

            if !self.can_accept_hall_call(call) {
                self.pending_calls.push(call);
                return;
            }

            self.add_hall_call(call.floor, call.direction);
        }
    }

    fn load_safe(&self) -> usize {
        self.state.lock().passengers.len()
    }

    fn log(&self, tag: &str, message: &str) {
        logging::log_line(&format!("Elevator-{}", self.id), tag, message);
    }
}

#[cfg(test)]
impl Elevator {
    /// Test setup shortcut: place the car on a floor directly.
    pub fn test_set_floor(&self, floor: u8) {
        let mut st = self.state.lock();
        st.current_floor = floor;
        self.set_visual_pos(floor as f64);
    }

    /// Test setup shortcut: put a passenger inside without a door cycle.
    pub fn test_force_passenger(&self, passenger: Passenger) {
        self.state.lock().passengers.push(passenger);
    }
}
