use derive_builder::Builder;
use thiserror::Error;

use crate::simulation::id::{Id, IdStore};

pub mod activation;
pub mod flow_cap;
pub mod link;
pub mod node;
pub mod sim_network;
pub mod storage_cap;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("node {0} is already part of the network")]
    DuplicateNode(String),
    #[error("link {0} is already part of the network")]
    DuplicateLink(String),
    #[error("link {link} has a free speed of {freespeed}, but it must be a positive number")]
    InvalidFreespeed { link: String, freespeed: f32 },
    #[error("node {0} is not part of the network")]
    UnknownNode(String),
    #[error("link {0} is not part of the network")]
    UnknownLink(String),
    #[error("route is empty")]
    EmptyRoute,
    #[error("link {to} does not start at the end of link {from}")]
    DisconnectedRoute { from: String, to: String },
}

/// Static topology the network engine runs on. Nodes and links are stored in the order of their
/// internal ids, so that both can be looked up by index.
#[derive(Debug)]
pub struct Network {
    node_ids: IdStore<Node>,
    link_ids: IdStore<Link>,
    nodes: Vec<Node>,
    links: Vec<Link>,
    pub effective_cell_size: f32,
}

#[derive(Debug)]
pub struct Node {
    pub id: Id<Node>,
    pub x: f64,
    pub y: f64,
    pub in_links: Vec<Id<Link>>,
    pub out_links: Vec<Id<Link>>,
}

#[derive(Debug)]
pub struct Link {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    pub length: f64,
    pub capacity: f32,
    pub freespeed: f32,
    pub permlanes: f32,
    pub storage_capacity: Option<u32>,
}

/// Attributes of a link, as they are passed to [`Network::add_link`].
#[derive(Debug, Clone, Builder)]
pub struct LinkAttributes {
    #[builder(setter(into))]
    id: String,
    #[builder(setter(into))]
    from: String,
    #[builder(setter(into))]
    to: String,
    /// in meters
    length: f64,
    /// in meters per second
    freespeed: f32,
    /// in entities per hour
    capacity: f32,
    #[builder(default = 1.0)]
    permlanes: f32,
    /// Overrides the storage capacity derived from length and lanes
    #[builder(default, setter(strip_option))]
    storage_capacity: Option<u32>,
}

impl Link {
    /// Time in seconds an entity needs to traverse the link at free speed. Always at least one
    /// tick.
    pub fn free_flow_travel_time(&self) -> u32 {
        let travel_time = (self.length / self.freespeed as f64).floor() as u32;
        travel_time.max(1)
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Network {
            node_ids: IdStore::new(),
            link_ids: IdStore::new(),
            nodes: Vec::new(),
            links: Vec::new(),
            effective_cell_size: 7.5,
        }
    }

    pub fn add_node(&mut self, external: &str, x: f64, y: f64) -> Result<Id<Node>, NetworkError> {
        if self.node_ids.try_get_from_ext(external).is_some() {
            return Err(NetworkError::DuplicateNode(String::from(external)));
        }
        let id = self.node_ids.create_id(external);
        debug_assert_eq!(id.index(), self.nodes.len());
        self.nodes.push(Node {
            id: id.clone(),
            x,
            y,
            in_links: Vec::new(),
            out_links: Vec::new(),
        });
        Ok(id)
    }

    pub fn add_link(&mut self, attributes: LinkAttributes) -> Result<Id<Link>, NetworkError> {
        if self.link_ids.try_get_from_ext(&attributes.id).is_some() {
            return Err(NetworkError::DuplicateLink(attributes.id));
        }
        if !(attributes.freespeed.is_finite() && attributes.freespeed > 0.) {
            return Err(NetworkError::InvalidFreespeed {
                link: attributes.id,
                freespeed: attributes.freespeed,
            });
        }
        let from = self
            .node_ids
            .try_get_from_ext(&attributes.from)
            .ok_or_else(|| NetworkError::UnknownNode(attributes.from.clone()))?;
        let to = self
            .node_ids
            .try_get_from_ext(&attributes.to)
            .ok_or_else(|| NetworkError::UnknownNode(attributes.to.clone()))?;

        let id = self.link_ids.create_id(&attributes.id);
        debug_assert_eq!(id.index(), self.links.len());
        self.nodes[from.index()].out_links.push(id.clone());
        self.nodes[to.index()].in_links.push(id.clone());
        self.links.push(Link {
            id: id.clone(),
            from,
            to,
            length: attributes.length,
            capacity: attributes.capacity,
            freespeed: attributes.freespeed,
            permlanes: attributes.permlanes,
            storage_capacity: attributes.storage_capacity,
        });
        Ok(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn get_node(&self, id: &Id<Node>) -> &Node {
        self.nodes
            .get(id.index())
            .unwrap_or_else(|| panic!("No node found for id {id}"))
    }

    pub fn get_link(&self, id: &Id<Link>) -> &Link {
        self.try_get_link(id)
            .unwrap_or_else(|| panic!("No link found for id {id}"))
    }

    pub fn try_get_link(&self, id: &Id<Link>) -> Option<&Link> {
        self.links.get(id.index())
    }

    pub fn node_id(&self, external: &str) -> Option<Id<Node>> {
        self.node_ids.try_get_from_ext(external)
    }

    pub fn link_id(&self, external: &str) -> Option<Id<Link>> {
        self.link_ids.try_get_from_ext(external)
    }

    /// Checks that every link of the route is part of this network and that consecutive links
    /// share a node.
    pub fn validate_route(&self, route: &[Id<Link>]) -> Result<(), NetworkError> {
        if route.is_empty() {
            return Err(NetworkError::EmptyRoute);
        }
        if let Some(unknown) = route.iter().find(|id| self.try_get_link(id).is_none()) {
            return Err(NetworkError::UnknownLink(unknown.to_string()));
        }
        for pair in route.windows(2) {
            let from = self.get_link(&pair[0]);
            let to = self.get_link(&pair[1]);
            if from.to != to.from {
                return Err(NetworkError::DisconnectedRoute {
                    from: from.id.to_string(),
                    to: to.id.to_string(),
                });
            }
        }
        Ok(())
    }
}
