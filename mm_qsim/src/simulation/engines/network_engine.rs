use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::simulation::config::{self, Config};
use crate::simulation::entities::Entity;
use crate::simulation::error::{ConfigurationError, EngineError, StateInconsistency};
use crate::simulation::id::Id;
use crate::simulation::network::activation::ActivationRegistry;
use crate::simulation::network::link::LinkQueue;
use crate::simulation::network::sim_network::{EntityPosition, ShutdownReport, SimNetwork};
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::travel_time::{ModeTravelTimes, TravelTimeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Prepared,
    Running,
    ShutDown,
}

/// Periodic status of the engine, logged at info level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimStatus {
    pub time: u32,
    pub active_links: usize,
    pub active_nodes: usize,
}

impl Display for SimStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SIMULATION (NetworkEngine) AT {} #links={} #nodes={}",
            write_time(self.time),
            self.active_links,
            self.active_nodes
        )
    }
}

/// Formats seconds as HH:MM:SS. Hours are not wrapped at midnight.
pub fn write_time(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Moves entities through the network, one tick at a time.
///
/// The engine starts `Uninitialized`. [`NetworkEngine::prepare`] resolves the travel time functions
/// and creates the runtime state of all links and nodes. Every call to [`NetworkEngine::step`]
/// first moves entities across the active nodes and then along the active links. Since entities
/// only enter links while nodes are moved, an entity can never leave a link in the tick it
/// entered. [`NetworkEngine::shutdown`] removes all entities which are still in the network.
#[derive(Debug)]
pub struct NetworkEngine {
    network: Arc<Network>,
    simulation: config::Simulation,
    info_period: u32,
    travel_times: ModeTravelTimes,
    sim_net: Option<SimNetwork>,
    state: EngineState,
    info_time: u32,
    last_tick: Option<u32>,
    last_status: Option<SimStatus>,
    active_links: Arc<ActivationRegistry<Link>>,
    active_nodes: Arc<ActivationRegistry<Node>>,
    inbox: Arc<Mutex<Vec<Entity>>>,
}

impl NetworkEngine {
    pub fn new(network: Arc<Network>, config: &Config, travel_times: ModeTravelTimes) -> Self {
        let active_links = Arc::new(ActivationRegistry::new(network.links().len()));
        let active_nodes = Arc::new(ActivationRegistry::new(network.nodes().len()));
        NetworkEngine {
            network,
            simulation: config.simulation(),
            info_period: config.network_engine().info_period,
            travel_times,
            sim_net: None,
            state: EngineState::Uninitialized,
            info_time: 0,
            last_tick: None,
            last_status: None,
            active_links,
            active_nodes,
            inbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// A handle to activate links and nodes of this engine and to send entities onto its links
    /// from other threads.
    pub fn activator(&self) -> NetworkActivator {
        NetworkActivator {
            network: self.network.clone(),
            active_links: self.active_links.clone(),
            active_nodes: self.active_nodes.clone(),
            inbox: self.inbox.clone(),
        }
    }

    pub fn prepare(&mut self) -> Result<(), EngineError> {
        self.expect_state("prepare", &[EngineState::Uninitialized])?;
        if self.info_period == 0 {
            return Err(ConfigurationError::ZeroInfoPeriod.into());
        }

        info!("Travel time functions used for the network simulation:");
        for (mode, travel_time) in self.travel_times.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            info!("{mode}\t{travel_time:?}");
        }
        let table = TravelTimeTable::resolve(&self.travel_times, &self.simulation.main_modes)?;

        self.sim_net = Some(SimNetwork::new(
            self.network.clone(),
            table,
            self.simulation.sample_size,
            self.active_links.clone(),
            self.active_nodes.clone(),
        ));
        // the first status line is due at the last full period before the start
        self.info_time = (self.simulation.start_time / self.info_period) * self.info_period;
        self.state = EngineState::Prepared;

        info!(
            "Prepared network engine with {} links and {} nodes.",
            self.network.links().len(),
            self.network.nodes().len()
        );
        Ok(())
    }

    /// Processes one tick. Entities sent en route from other threads are put onto their links
    /// first, then nodes are moved, then links.
    #[instrument(level = "trace", skip(self))]
    pub fn step(&mut self, now: u32) -> Result<(), EngineError> {
        let expected = self.last_tick.map(|last| last + 1);
        let inbox = self.inbox.clone();
        let sim_net = self.running_network("step")?;
        if let Some(expected) = expected.filter(|expected| *expected != now) {
            return Err(EngineError::UnexpectedTick { now, expected });
        }

        let injected = std::mem::take(&mut *inbox.lock());
        if let Some(unsupported) = injected
            .iter()
            .find_map(|entity| sim_net.supports_mode(entity).err())
        {
            inbox.lock().extend(injected);
            return Err(unsupported.into());
        }
        for entity in injected {
            sim_net.depart(entity, now)?;
        }

        sim_net.move_nodes(now);
        sim_net.move_links(now);

        self.state = EngineState::Running;
        self.last_tick = Some(now);
        self.print_sim_log(now);
        Ok(())
    }

    /// Puts an entity which starts its route into the waiting list of its current link.
    pub fn depart(&mut self, entity: Entity, now: u32) -> Result<(), EngineError> {
        let network = self.network.clone();
        let sim_net = self.running_network("depart")?;
        validate_route(&network, &entity)?;
        sim_net.depart(entity, now)
    }

    /// Puts an entity onto its current link, as if it had just crossed the link's upstream node.
    /// If the link is full, the entity is handed back within [`EngineError::Capacity`].
    pub fn insert(&mut self, entity: Entity, now: u32) -> Result<(), EngineError> {
        let network = self.network.clone();
        let sim_net = self.running_network("insert")?;
        validate_route(&network, &entity)?;
        sim_net.insert(entity, now)
    }

    pub fn activate_link(&self, id: &Id<Link>) -> bool {
        self.active_links.activate(id)
    }

    pub fn activate_node(&self, id: &Id<Node>) -> bool {
        self.active_nodes.activate(id)
    }

    pub fn active_link_count(&self) -> usize {
        self.active_links.len()
    }

    pub fn active_node_count(&self) -> usize {
        self.active_nodes.len()
    }

    pub fn is_link_active(&self, id: &Id<Link>) -> bool {
        self.active_links.is_active(id)
    }

    pub fn is_node_active(&self, id: &Id<Node>) -> bool {
        self.active_nodes.is_active(id)
    }

    pub fn occupancy(&self, id: &Id<Link>) -> Option<u32> {
        self.link_queue(id).map(LinkQueue::occupancy)
    }

    /// Read only access to the runtime state of a link.
    pub fn link_queue(&self, id: &Id<Link>) -> Option<&LinkQueue> {
        self.sim_net.as_ref().and_then(|net| net.get_link(id))
    }

    pub fn entities_on_net(&self) -> usize {
        self.sim_net.as_ref().map_or(0, SimNetwork::veh_on_net)
    }

    pub fn locate(&self, id: &Id<Entity>) -> Option<EntityPosition> {
        self.sim_net.as_ref().and_then(|net| net.locate(id))
    }

    /// Entities which reached the end of their route since the last call.
    pub fn take_arrived(&mut self) -> Vec<Entity> {
        self.sim_net
            .as_mut()
            .map(SimNetwork::take_arrived)
            .unwrap_or_default()
    }

    pub fn take_inconsistencies(&mut self) -> Vec<StateInconsistency> {
        self.sim_net
            .as_mut()
            .map(SimNetwork::take_inconsistencies)
            .unwrap_or_default()
    }

    pub fn last_status(&self) -> Option<SimStatus> {
        self.last_status
    }

    /// Removes every entity from every link, regardless of whether the link is active, and resets
    /// the activation registries.
    pub fn shutdown(&mut self) -> Result<ShutdownReport, EngineError> {
        if self.state == EngineState::ShutDown {
            return Err(EngineError::InvalidState {
                operation: "shut down",
                state: self.state,
            });
        }

        let mut report = self
            .sim_net
            .take()
            .map(|mut net| net.clear())
            .unwrap_or_default();
        report.cleared.extend(std::mem::take(&mut *self.inbox.lock()));
        self.active_links.drain_active();
        self.active_nodes.drain_active();
        self.state = EngineState::ShutDown;

        info!(
            "Network engine shut down. Removed {} entities from the network.",
            report.cleared.len()
        );
        Ok(report)
    }

    fn print_sim_log(&mut self, now: u32) {
        if now >= self.info_time {
            self.info_time = (now / self.info_period + 1) * self.info_period;
            let status = SimStatus {
                time: now,
                active_links: self.active_link_count(),
                active_nodes: self.active_node_count(),
            };
            info!("{status}");
            self.last_status = Some(status);
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[EngineState],
    ) -> Result<(), EngineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn running_network(&mut self, operation: &'static str) -> Result<&mut SimNetwork, EngineError> {
        match (self.state, self.sim_net.as_mut()) {
            (EngineState::Prepared | EngineState::Running, Some(net)) => Ok(net),
            (state, _) => Err(EngineError::InvalidState { operation, state }),
        }
    }
}

fn validate_route(network: &Network, entity: &Entity) -> Result<(), EngineError> {
    network
        .validate_route(entity.remaining_route())
        .map_err(|source| EngineError::InvalidRoute {
            entity: entity.id().clone(),
            source,
        })
}

/// Handle to an engine which can be shared with other threads. Activations take effect in the
/// engine's next sweep. Entities sent en route are put onto their links at the beginning of the
/// engine's next tick.
#[derive(Debug, Clone)]
pub struct NetworkActivator {
    network: Arc<Network>,
    active_links: Arc<ActivationRegistry<Link>>,
    active_nodes: Arc<ActivationRegistry<Node>>,
    inbox: Arc<Mutex<Vec<Entity>>>,
}

impl NetworkActivator {
    pub fn activate_link(&self, id: &Id<Link>) -> bool {
        self.active_links.activate(id)
    }

    pub fn activate_node(&self, id: &Id<Node>) -> bool {
        self.active_nodes.activate(id)
    }

    /// Queues an entity to depart on its current link. The route is checked against the network
    /// right away, so that invalid entities are rejected on the sending thread.
    pub fn send_en_route(&self, entity: Entity) -> Result<(), EngineError> {
        validate_route(&self.network, &entity)?;
        self.inbox.lock().push(entity);
        Ok(())
    }
}
