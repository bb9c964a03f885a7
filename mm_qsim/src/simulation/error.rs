use thiserror::Error;

use crate::simulation::engines::network_engine::EngineState;
use crate::simulation::entities::{Entity, Mode};
use crate::simulation::id::Id;
use crate::simulation::network::link::CapacityViolation;
use crate::simulation::network::{Link, NetworkError};

/// Errors detected while preparing the engine. They are fatal: the engine never starts running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("mode '{0}' is not supported by the network engine")]
    UnknownMode(String),
    #[error("no travel time function configured for mode {0}")]
    MissingTravelTime(Mode),
    #[error("speed {speed} of mode {mode} must be a positive number")]
    InvalidSpeed { mode: Mode, speed: f32 },
    #[error("the info period of the network engine must be greater than zero")]
    ZeroInfoPeriod,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("cannot {operation} while the engine is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },
    #[error("expected tick {expected}, but got {now}. Ticks must not be skipped or repeated")]
    UnexpectedTick { now: u32, expected: u32 },
    #[error("invalid route for entity {entity}: {source}")]
    InvalidRoute {
        entity: Id<Entity>,
        source: NetworkError,
    },
    #[error(transparent)]
    Capacity(Box<CapacityViolation>),
}

impl From<CapacityViolation> for EngineError {
    fn from(value: CapacityViolation) -> Self {
        EngineError::Capacity(Box::new(value))
    }
}

/// Deviations from the expected state which are recorded and logged, but never stop the
/// simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateInconsistency {
    #[error("entity {entity} left link {link} at {time}, after its latest exit time {latest_exit}")]
    LateDischarge {
        entity: Id<Entity>,
        link: Id<Link>,
        time: u32,
        latest_exit: u32,
    },
    #[error("entity {entity} was still on link {link} at shutdown, but the link was not active")]
    StrandedAtShutdown { entity: Id<Entity>, link: Id<Link> },
}
