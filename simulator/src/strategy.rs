/// ----- COLLECTIVE CONTROL STRATEGY -----
/// Stateless cost model for assigning a hall call to a car: floor distance
/// to the call (via the route end when the car has to finish its sweep
/// first), scaled by direction and load penalties, plus a per-stop charge
/// and the soft zoning penalty.
use shared_resources::config::SimulationConfig;
use shared_resources::direction::Direction;
use shared_resources::hall_call::HallCall;

use crate::snapshot::ElevatorSnapshot;

pub fn calculate_cost(s: &ElevatorSnapshot, call: HallCall, config: &SimulationConfig) -> i32 {
    let target = call.floor as i32;
    let current = s.current_floor as i32;
    let zone_penalty = config.zone_penalty(s.id, call.floor);

    let (eta_distance, direction_penalty): (i32, f64) = if s.direction == Direction::Idle {
        ((current - target).abs(), 1.5)
    } else if s.direction == call.direction {
        if is_on_the_way(s, call) {
            ((current - target).abs(), 1.0)
        } else {
            // The car finishes its sweep at the route end and comes back.
            (two_leg_distance(s, target), 6.0)
        }
    } else {
        (two_leg_distance(s, target), 8.0)
    };

    let ratio = if s.capacity == 0 {
        1.0
    } else {
        s.load as f64 / s.capacity as f64
    };
    let load_factor = if ratio < 0.5 {
        1.0
    } else if ratio < 0.8 {
        1.5
    } else {
        3.0
    };

    let stop_penalty = (s.planned_stops * 2) as i32;

    let cost =
        eta_distance as f64 * direction_penalty * load_factor + stop_penalty as f64 + zone_penalty as f64;
    cost.round() as i32
}

fn two_leg_distance(s: &ElevatorSnapshot, target: i32) -> i32 {
    let current = s.current_floor as i32;
    let end = match s.direction {
        Direction::Up => {
            if s.furthest_up_stop > 0 {
                s.furthest_up_stop as i32
            } else {
                current
            }
        }
        _ => {
            if s.furthest_down_stop > 0 {
                s.furthest_down_stop as i32
            } else {
                current
            }
        }
    };
    (current - end).abs() + (end - target).abs()
}

pub fn is_on_the_way(s: &ElevatorSnapshot, call: HallCall) -> bool {
    if s.direction == Direction::Up && call.direction == Direction::Up {
        return s.current_floor <= call.floor;
    }
    if s.direction == Direction::Down && call.direction == Direction::Down {
        return s.current_floor >= call.floor;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ElevatorStatus;

    fn snapshot(floor: u8, direction: Direction, load: usize, stops: usize) -> ElevatorSnapshot {
        ElevatorSnapshot {
            id: 3, // the swing car, so zoning stays out of these checks
            current_floor: floor,
            direction,
            status: ElevatorStatus::Moving,
            load,
            capacity: 5,
            planned_stops: stops,
            furthest_up_stop: 0,
            furthest_down_stop: 0,
        }
    }

    fn config() -> SimulationConfig {
        SimulationConfig::default()
    }

    #[test]
    fn on_the_way_requires_matching_direction_and_side() {
        let up = HallCall::new(7, Direction::Up);
        assert!(is_on_the_way(&snapshot(3, Direction::Up, 0, 0), up));
        assert!(!is_on_the_way(&snapshot(9, Direction::Up, 0, 0), up));
        assert!(!is_on_the_way(&snapshot(3, Direction::Down, 0, 0), up));
        assert!(!is_on_the_way(&snapshot(3, Direction::Idle, 0, 0), up));

        let down = HallCall::new(4, Direction::Down);
        assert!(is_on_the_way(&snapshot(9, Direction::Down, 0, 0), down));
        assert!(!is_on_the_way(&snapshot(2, Direction::Down, 0, 0), down));
    }

    #[test]
    fn idle_car_pays_distance_with_idle_penalty() {
        let s = snapshot(2, Direction::Idle, 0, 0);
        // 4 floors * 1.5, no stops, no zone penalty.
        assert_eq!(calculate_cost(&s, HallCall::new(6, Direction::Up), &config()), 6);
    }

    #[test]
    fn on_the_way_car_is_cheapest() {
        let call = HallCall::new(8, Direction::Up);
        let on_way = calculate_cost(&snapshot(4, Direction::Up, 0, 0), call, &config());
        let idle = calculate_cost(&snapshot(4, Direction::Idle, 0, 0), call, &config());
        let opposite = calculate_cost(&snapshot(4, Direction::Down, 0, 0), call, &config());
        assert!(on_way < idle);
        assert!(idle < opposite);
    }

    #[test]
    fn opposite_direction_pays_the_two_leg_route() {
        let mut s = snapshot(6, Direction::Down, 0, 0);
        s.furthest_down_stop = 2;
        // Down to 2 (4 floors) then up to 9 (7 floors), penalty 8.0.
        assert_eq!(
            calculate_cost(&s, HallCall::new(9, Direction::Up), &config()),
            (11.0_f64 * 8.0).round() as i32
        );
    }

    #[test]
    fn load_factor_steps_at_half_and_four_fifths() {
        let call = HallCall::new(9, Direction::Up);
        let empty = calculate_cost(&snapshot(5, Direction::Up, 0, 0), call, &config());
        let half = calculate_cost(&snapshot(5, Direction::Up, 3, 0), call, &config());
        let packed = calculate_cost(&snapshot(5, Direction::Up, 4, 0), call, &config());
        assert_eq!(half, (empty as f64 * 1.5).round() as i32);
        assert_eq!(packed, empty * 3);
    }

    #[test]
    fn planned_stops_add_two_each() {
        let call = HallCall::new(9, Direction::Up);
        let no_stops = calculate_cost(&snapshot(5, Direction::Up, 0, 0), call, &config());
        let with_stops = calculate_cost(&snapshot(5, Direction::Up, 0, 4), call, &config());
        assert_eq!(with_stops - no_stops, 8);
    }

    #[test]
    fn out_of_zone_calls_cost_the_soft_penalty() {
        let cfg = config();
        let mut s = snapshot(5, Direction::Idle, 0, 0);
        s.id = 1; // low-zone car
        let in_zone = calculate_cost(&s, HallCall::new(6, Direction::Up), &cfg);
        let out_zone = calculate_cost(&s, HallCall::new(12, Direction::Up), &cfg);
        // 1 floor at 1.5 vs 7 floors at 1.5 plus the zone penalty.
        assert_eq!(in_zone, 2);
        assert_eq!(out_zone, 11 + cfg.zoning.zone_soft_penalty);
    }
}
