use std::fmt::{Display, Formatter};
use std::str::FromStr;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::simulation::error::ConfigurationError;
use crate::simulation::id::Id;
use crate::simulation::network::Link;

/// Modes the network engine can move. Travel time functions are resolved per mode once the engine
/// is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Car,
    Bike,
    Walk,
    Ride,
    Pt,
}

impl Mode {
    pub const COUNT: usize = 5;
    pub const ALL: [Mode; Mode::COUNT] = [Mode::Car, Mode::Bike, Mode::Walk, Mode::Ride, Mode::Pt];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Car => "car",
            Mode::Bike => "bike",
            Mode::Walk => "walk",
            Mode::Ride => "ride",
            Mode::Pt => "pt",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownMode(String::from(s)))
    }
}

/// Something that travels along a route of links, such as a vehicle or a pedestrian.
///
/// The route cursor points at the link the entity is currently on. It is advanced by the node the
/// entity crosses.
#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct Entity {
    id: Id<Entity>,
    mode: Mode,
    route: Vec<Id<Link>>,
    /// Latest tick at which the entity is expected to leave a link. Leaving later is recorded as
    /// an inconsistency but the entity still moves on.
    #[builder(default, setter(strip_option))]
    latest_exit: Option<u32>,
    #[builder(setter(skip))]
    route_index: usize,
    #[builder(setter(skip))]
    link_enter_time: u32,
}

impl Entity {
    pub fn new(id: Id<Entity>, mode: Mode, route: Vec<Id<Link>>) -> Self {
        Entity {
            id,
            mode,
            route,
            latest_exit: None,
            route_index: 0,
            link_enter_time: 0,
        }
    }

    pub fn id(&self) -> &Id<Entity> {
        &self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn route(&self) -> &[Id<Link>] {
        &self.route
    }

    /// The part of the route which starts at the current link.
    pub fn remaining_route(&self) -> &[Id<Link>] {
        self.route.get(self.route_index..).unwrap_or_default()
    }

    pub fn route_index(&self) -> usize {
        self.route_index
    }

    pub fn curr_link(&self) -> Option<&Id<Link>> {
        self.route.get(self.route_index)
    }

    pub fn next_link(&self) -> Option<&Id<Link>> {
        self.route.get(self.route_index + 1)
    }

    pub fn latest_exit(&self) -> Option<u32> {
        self.latest_exit
    }

    pub fn set_latest_exit(&mut self, latest_exit: Option<u32>) {
        self.latest_exit = latest_exit;
    }

    /// Tick at which the entity entered or departed on its current link.
    pub fn link_enter_time(&self) -> u32 {
        self.link_enter_time
    }

    pub(crate) fn set_link_enter_time(&mut self, now: u32) {
        self.link_enter_time = now;
    }

    pub(crate) fn advance(&mut self) {
        self.route_index += 1;
    }

    pub(crate) fn retreat(&mut self) {
        self.route_index = self.route_index.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::entities::{Entity, EntityBuilder, Mode};
    use crate::simulation::error::ConfigurationError;
    use crate::simulation::id::Id;

    #[test]
    fn parse_mode() {
        assert_eq!(Mode::Car, "car".parse().unwrap());
        assert_eq!(Mode::Pt, "pt".parse().unwrap());
        assert_eq!(
            Err(ConfigurationError::UnknownMode(String::from("ferry"))),
            "ferry".parse::<Mode>()
        );
    }

    #[test]
    fn mode_display_matches_parse() {
        for mode in Mode::ALL {
            assert_eq!(mode, mode.to_string().parse().unwrap());
        }
    }

    #[test]
    fn advance_along_route() {
        let mut entity = Entity::new(
            Id::new_internal(0),
            Mode::Walk,
            vec![Id::new_internal(0), Id::new_internal(1)],
        );
        assert_eq!(Some(&Id::new_internal(0)), entity.curr_link());
        assert_eq!(Some(&Id::new_internal(1)), entity.next_link());

        entity.advance();
        assert_eq!(Some(&Id::new_internal(1)), entity.curr_link());
        assert_eq!(None, entity.next_link());
        assert_eq!(1, entity.remaining_route().len());

        entity.retreat();
        assert_eq!(0, entity.route_index());
    }

    #[test]
    fn build_entity() {
        let entity = EntityBuilder::default()
            .id(Id::new_internal(3))
            .mode(Mode::Bike)
            .route(vec![Id::new_internal(0)])
            .latest_exit(42)
            .build()
            .unwrap();

        assert_eq!(Some(42), entity.latest_exit());
        assert_eq!(0, entity.route_index());
        assert_eq!(Mode::Bike, entity.mode());
    }

    #[test]
    fn remaining_route_past_end() {
        let mut entity = Entity::new(Id::new_internal(0), Mode::Car, vec![Id::new_internal(0)]);
        entity.advance();
        entity.advance();
        assert!(entity.remaining_route().is_empty());
        assert!(entity.curr_link().is_none());
    }
}
