use std::sync::Arc;

use tracing::{instrument, warn};

use crate::simulation::entities::Entity;
use crate::simulation::error::{ConfigurationError, EngineError, StateInconsistency};
use crate::simulation::id::Id;
use crate::simulation::network::activation::ActivationRegistry;
use crate::simulation::network::link::{LinkQueue, QueuePosition};
use crate::simulation::network::node::NodeMover;
use crate::simulation::network::{Link, Network, NetworkError, Node};
use crate::simulation::travel_time::TravelTimeTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPosition {
    pub link: Id<Link>,
    pub position: QueuePosition,
}

/// Everything that was left in the network when it was shut down.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub cleared: Vec<Entity>,
    pub arrived: Vec<Entity>,
    pub inconsistencies: Vec<StateInconsistency>,
}

/// Runtime state of all links and nodes of a network. Links and nodes are stored by their internal
/// ids, so that the topology and the runtime state share the same indices.
#[derive(Debug)]
pub struct SimNetwork {
    network: Arc<Network>,
    travel_times: TravelTimeTable,
    links: Vec<LinkQueue>,
    nodes: Vec<NodeMover>,
    active_links: Arc<ActivationRegistry<Link>>,
    active_nodes: Arc<ActivationRegistry<Node>>,
    veh_counter: usize,
    arrived: Vec<Entity>,
    inconsistencies: Vec<StateInconsistency>,
}

impl SimNetwork {
    pub fn new(
        network: Arc<Network>,
        travel_times: TravelTimeTable,
        sample_size: f32,
        active_links: Arc<ActivationRegistry<Link>>,
        active_nodes: Arc<ActivationRegistry<Node>>,
    ) -> Self {
        let links = network
            .links()
            .iter()
            .map(|link| LinkQueue::from_link(link, sample_size, network.effective_cell_size))
            .collect();
        let nodes = network.nodes().iter().map(NodeMover::new).collect();

        SimNetwork {
            network,
            travel_times,
            links,
            nodes,
            active_links,
            active_nodes,
            veh_counter: 0,
            arrived: Vec::new(),
            inconsistencies: Vec::new(),
        }
    }

    pub fn supports_mode(&self, entity: &Entity) -> Result<(), ConfigurationError> {
        if self.travel_times.supports(entity.mode()) {
            Ok(())
        } else {
            Err(ConfigurationError::MissingTravelTime(entity.mode()))
        }
    }

    /// Puts the entity into the waiting list of its current link.
    pub fn depart(&mut self, entity: Entity, now: u32) -> Result<(), EngineError> {
        self.supports_mode(&entity)?;
        let link_id = Self::curr_link(&entity)?;

        self.links[link_id.index()].depart(entity, now);
        self.veh_counter += 1;
        self.active_links.activate(&link_id);
        Ok(())
    }

    /// Puts the entity onto its current link, as if it crossed the upstream node at `now`.
    pub fn insert(&mut self, entity: Entity, now: u32) -> Result<(), EngineError> {
        self.supports_mode(&entity)?;
        let link_id = Self::curr_link(&entity)?;
        let travel_time = self
            .travel_times
            .travel_time(entity.mode(), self.network.get_link(&link_id), now)
            .ok_or(ConfigurationError::MissingTravelTime(entity.mode()))?;

        self.links[link_id.index()].enter(entity, now, travel_time)?;
        self.veh_counter += 1;
        self.active_links.activate(&link_id);
        Ok(())
    }

    fn curr_link(entity: &Entity) -> Result<Id<Link>, EngineError> {
        entity
            .curr_link()
            .cloned()
            .ok_or_else(|| EngineError::InvalidRoute {
                entity: entity.id().clone(),
                source: NetworkError::EmptyRoute,
            })
    }

    #[instrument(level = "trace", skip(self))]
    pub fn move_nodes(&mut self, now: u32) {
        for node_id in self.active_nodes.drain_active() {
            let node = &self.nodes[node_id.index()];
            let result = node.move_node(
                &mut self.links,
                &self.network,
                &self.travel_times,
                &self.active_links,
                now,
            );
            if result.stays_active {
                self.active_nodes.activate(&node_id);
            }
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn move_links(&mut self, now: u32) {
        for link_id in self.active_links.drain_active() {
            let link = &mut self.links[link_id.index()];
            let result = link.do_sim_step(now);

            self.veh_counter -= result.arrived.len();
            self.arrived.extend(result.arrived);
            self.inconsistencies.extend(result.inconsistencies);

            // the node moves the entities in the next tick
            if link.has_discharge_ready() {
                self.active_nodes.activate(link.to());
            }
            if link.is_active() {
                self.active_links.activate(&link_id);
            }
        }
    }

    /// Removes all entities from all links, whether they are active or not. Entities on links
    /// which are not active are reported as inconsistencies.
    pub fn clear(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport {
            arrived: std::mem::take(&mut self.arrived),
            inconsistencies: std::mem::take(&mut self.inconsistencies),
            ..ShutdownReport::default()
        };

        for link in &mut self.links {
            let tracked = self.active_links.is_active(link.id());
            let entities = link.clear();
            if !tracked {
                for entity in &entities {
                    let inconsistency = StateInconsistency::StrandedAtShutdown {
                        entity: entity.id().clone(),
                        link: link.id().clone(),
                    };
                    warn!("{inconsistency}");
                    report.inconsistencies.push(inconsistency);
                }
            }
            report.cleared.extend(entities);
        }
        self.veh_counter = 0;
        report
    }

    pub fn locate(&self, id: &Id<Entity>) -> Option<EntityPosition> {
        self.links.iter().find_map(|link| {
            link.locate(id).map(|position| EntityPosition {
                link: link.id().clone(),
                position,
            })
        })
    }

    pub fn get_link(&self, id: &Id<Link>) -> Option<&LinkQueue> {
        self.links.get(id.index())
    }

    pub fn links(&self) -> &[LinkQueue] {
        &self.links
    }

    pub fn veh_on_net(&self) -> usize {
        self.veh_counter
    }

    pub fn take_arrived(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.arrived)
    }

    pub fn take_inconsistencies(&mut self) -> Vec<StateInconsistency> {
        std::mem::take(&mut self.inconsistencies)
    }
}
