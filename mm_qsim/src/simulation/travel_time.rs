use std::fmt::Debug;
use std::sync::Arc;

use ahash::HashMap;
use itertools::Itertools;

use crate::simulation::config;
use crate::simulation::entities::Mode;
use crate::simulation::error::ConfigurationError;
use crate::simulation::network::Link;

/// Computes how long an entity needs to traverse a link, starting at tick `now`.
pub trait TravelTime: Debug + Send + Sync {
    fn link_travel_time(&self, link: &Link, now: u32) -> u32;

    /// Checks the parameters of the function once, when the engine is prepared.
    fn validate(&self, _mode: Mode) -> Result<(), ConfigurationError> {
        Ok(())
    }
}

/// Travel times as they are handed to the engine, keyed by mode name.
pub type ModeTravelTimes = HashMap<String, Arc<dyn TravelTime>>;

/// Entities move at the free speed of the link.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeSpeedTravelTime;

impl TravelTime for FreeSpeedTravelTime {
    fn link_travel_time(&self, link: &Link, _now: u32) -> u32 {
        link.free_flow_travel_time()
    }
}

/// Entities move at a fixed speed, but never faster than the link's free speed.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSpeedTravelTime {
    speed: f32,
}

impl ConstantSpeedTravelTime {
    pub fn new(speed: f32) -> Self {
        Self { speed }
    }
}

impl TravelTime for ConstantSpeedTravelTime {
    fn link_travel_time(&self, link: &Link, _now: u32) -> u32 {
        let speed = self.speed.min(link.freespeed);
        let travel_time = (link.length / speed as f64).floor() as u32;
        travel_time.max(1)
    }

    fn validate(&self, mode: Mode) -> Result<(), ConfigurationError> {
        if self.speed.is_finite() && self.speed > 0. {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidSpeed {
                mode,
                speed: self.speed,
            })
        }
    }
}

/// Travel time functions resolved per mode. Built once, when the engine is prepared, so that
/// looking up a travel time during a tick is an array access.
#[derive(Debug, Clone, Default)]
pub struct TravelTimeTable {
    by_mode: [Option<Arc<dyn TravelTime>>; Mode::COUNT],
}

impl TravelTimeTable {
    /// Resolves the name keyed travel times. Every mode in `required_modes` must have a travel
    /// time function.
    pub fn resolve(
        travel_times: &ModeTravelTimes,
        required_modes: &[String],
    ) -> Result<Self, ConfigurationError> {
        let mut table = TravelTimeTable::default();
        for (name, travel_time) in travel_times.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            let mode: Mode = name.parse()?;
            travel_time.validate(mode)?;
            table.by_mode[mode.index()] = Some(travel_time.clone());
        }

        for name in required_modes {
            let mode: Mode = name.parse()?;
            if !table.supports(mode) {
                return Err(ConfigurationError::MissingTravelTime(mode));
            }
        }
        Ok(table)
    }

    pub fn supports(&self, mode: Mode) -> bool {
        self.by_mode[mode.index()].is_some()
    }

    pub fn travel_time(&self, mode: Mode, link: &Link, now: u32) -> Option<u32> {
        self.by_mode[mode.index()]
            .as_ref()
            .map(|travel_time| travel_time.link_travel_time(link, now))
    }
}

/// Creates travel time functions from the modes config module.
pub fn from_config(modes: &config::Modes) -> ModeTravelTimes {
    modes
        .travel_times
        .iter()
        .map(|(mode, kind)| {
            let travel_time: Arc<dyn TravelTime> = match kind {
                config::TravelTimeKind::FreeSpeed => Arc::new(FreeSpeedTravelTime),
                config::TravelTimeKind::ConstantSpeed { speed } => {
                    Arc::new(ConstantSpeedTravelTime::new(*speed))
                }
            };
            (mode.clone(), travel_time)
        })
        .collect()
}
