use std::fs;

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BuildingConfig {
    pub floors: u8,
    pub elevators_count: u8,
    pub elevator_capacity: usize,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        BuildingConfig {
            floors: 15,
            elevators_count: 3,
            elevator_capacity: 5,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TimingConfig {
    /// Simulated ms to cross one floor.
    pub time_move_one_floor: u64,
    /// Simulated ms per door open or close.
    pub time_doors: u64,
    /// Simulated ms per boarding passenger.
    pub time_boarding: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            time_move_one_floor: 800,
            time_doors: 500,
            time_boarding: 200,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    /// Hard cap on a car's planned stops.
    pub max_planned_stops: usize,
    /// How close to its reversal point a car must be before it may take an
    /// opposite-direction call as a reservation.
    pub reserve_reverse_soon_floors: u8,
    pub enroute_pickup_enabled: bool,
    /// Minimum distance of the assigned car before a passing car may steal
    /// its hall call at the floor.
    pub enroute_steal_min_assigned_distance: u8,
    pub call_reassign_cooldown_ms: u64,
    pub call_reassign_min_improvement: i32,
    pub no_elevator_log_cooldown_ms: u64,
    /// Max events drained between dispatch passes.
    pub dispatcher_event_batch: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            max_planned_stops: 20,
            reserve_reverse_soon_floors: 3,
            enroute_pickup_enabled: true,
            enroute_steal_min_assigned_distance: 3,
            call_reassign_cooldown_ms: 1500,
            call_reassign_min_improvement: 12,
            no_elevator_log_cooldown_ms: 1500,
            dispatcher_event_batch: 64,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ZoningConfig {
    pub zoning_enabled: bool,
    /// Upper bound of the low zone; 0 means "derive from the floor count"
    /// (the two zones overlap on this floor).
    pub zone_split_floor: u8,
    pub zone_soft_penalty: i32,
}

impl Default for ZoningConfig {
    fn default() -> Self {
        ZoningConfig {
            zoning_enabled: true,
            zone_split_floor: 0,
            zone_soft_penalty: 10,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SimulationRunConfig {
    /// How many passengers to generate in one simulation.
    pub passenger_limit: usize,
    pub request_interval_min: u64,
    pub request_interval_max: u64,
    /// Safety cap on the shutdown drain.
    pub drain_timeout_ms: u64,
}

impl Default for SimulationRunConfig {
    fn default() -> Self {
        SimulationRunConfig {
            passenger_limit: 30,
            request_interval_min: 500,
            request_interval_max: 1200,
            drain_timeout_ms: 180_000,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SimulationConfig {
    pub building: BuildingConfig,
    pub timing: TimingConfig,
    pub dispatch: DispatchConfig,
    pub zoning: ZoningConfig,
    pub simulation: SimulationRunConfig,
}

impl SimulationConfig {
    pub fn get() -> Self {
        Self::load("config.json")
    }

    pub fn load(path: &str) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => {
                println!("No configuration file provided, using default settings...");
                return SimulationConfig::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                println!("Configuration file {} is invalid ({}), using default settings...", path, e);
                SimulationConfig::default()
            }
        }
    }

    /// Upper bound of the low zone (and lower bound of the high zone).
    pub fn zone_split(&self) -> u8 {
        if self.zoning.zone_split_floor != 0 {
            self.zoning.zone_split_floor
        } else {
            ((self.building.floors as u16 + 1) / 2) as u8
        }
    }

    /// The car serving the whole building without penalty; absent when
    /// fewer than three cars run.
    pub fn swing_elevator_id(&self) -> Option<usize> {
        if self.building.elevators_count >= 3 {
            Some(self.building.elevators_count as usize)
        } else {
            None
        }
    }

    pub fn zone_min_floor(&self, elevator_id: usize) -> u8 {
        if !self.zoning.zoning_enabled {
            return 1;
        }
        if self.swing_elevator_id() == Some(elevator_id) {
            return 1;
        }
        if self.building.elevators_count >= 2 && elevator_id == 2 {
            return self.zone_split();
        }
        1
    }

    pub fn zone_max_floor(&self, elevator_id: usize) -> u8 {
        if !self.zoning.zoning_enabled {
            return self.building.floors;
        }
        if self.swing_elevator_id() == Some(elevator_id) {
            return self.building.floors;
        }
        if self.building.elevators_count >= 2 {
            if elevator_id == 1 {
                return self.zone_split();
            }
            if elevator_id == 2 {
                return self.building.floors;
            }
        }
        self.building.floors
    }

    pub fn zone_penalty(&self, elevator_id: usize, call_floor: u8) -> i32 {
        if !self.zoning.zoning_enabled {
            return 0;
        }
        let min = self.zone_min_floor(elevator_id);
        let max = self.zone_max_floor(elevator_id);
        if call_floor < min || call_floor > max {
            self.zoning.zone_soft_penalty
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_building_profile() {
        let config = SimulationConfig::default();
        assert_eq!(config.building.floors, 15);
        assert_eq!(config.zone_split(), 8);
        assert_eq!(config.swing_elevator_id(), Some(3));
    }

    #[test]
    fn zones_split_low_high_with_swing_car() {
        let config = SimulationConfig::default();
        // Car 1 covers the low zone, car 2 the high zone, car 3 everything.
        assert_eq!((config.zone_min_floor(1), config.zone_max_floor(1)), (1, 8));
        assert_eq!((config.zone_min_floor(2), config.zone_max_floor(2)), (8, 15));
        assert_eq!((config.zone_min_floor(3), config.zone_max_floor(3)), (1, 15));

        assert_eq!(config.zone_penalty(1, 12), 10);
        assert_eq!(config.zone_penalty(1, 8), 0);
        assert_eq!(config.zone_penalty(2, 3), 10);
        assert_eq!(config.zone_penalty(3, 3), 0);
    }

    #[test]
    fn zoning_disabled_means_no_penalty() {
        let mut config = SimulationConfig::default();
        config.zoning.zoning_enabled = false;
        assert_eq!(config.zone_penalty(1, 15), 0);
        assert_eq!(config.zone_min_floor(2), 1);
    }

    #[test]
    fn partial_config_file_fills_in_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"building": {"floors": 10}}"#).expect("valid config");
        assert_eq!(config.building.floors, 10);
        assert_eq!(config.building.elevators_count, 3);
        assert_eq!(config.timing.time_doors, 500);
    }
}
