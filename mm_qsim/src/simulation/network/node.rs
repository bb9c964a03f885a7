use tracing::trace;

use crate::simulation::id::Id;
use crate::simulation::network::activation::ActivationRegistry;
use crate::simulation::network::link::{BufferEntry, LinkQueue};
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::travel_time::TravelTimeTable;

/// Moves entities across a node, from the discharge buffers of its inbound links onto the next
/// link of their routes.
///
/// Inbound links are visited in ascending order of their internal ids. The order is fixed when the
/// mover is created. Under sustained oversaturation, links late in the order may get no chance to
/// move their entities.
#[derive(Debug)]
pub struct NodeMover {
    id: Id<Node>,
    in_links: Vec<Id<Link>>,
}

#[derive(Debug, Default)]
pub struct NodeMoveResult {
    /// At least one inbound link still has entities waiting to cross.
    pub stays_active: bool,
    pub moved: usize,
}

impl NodeMover {
    pub fn new(node: &Node) -> Self {
        let mut in_links = node.in_links.clone();
        in_links.sort();
        in_links.dedup();
        NodeMover {
            id: node.id.clone(),
            in_links,
        }
    }

    pub fn id(&self) -> &Id<Node> {
        &self.id
    }

    pub fn in_links(&self) -> &[Id<Link>] {
        &self.in_links
    }

    /// Moves as many entities as possible from every inbound link. An inbound link is blocked as
    /// soon as the head of its buffer cannot enter its next link.
    pub fn move_node(
        &self,
        links: &mut [LinkQueue],
        network: &Network,
        travel_times: &TravelTimeTable,
        active_links: &ActivationRegistry<Link>,
        now: u32,
    ) -> NodeMoveResult {
        let mut result = NodeMoveResult::default();

        for in_link in &self.in_links {
            while self.move_head(
                in_link,
                links,
                network,
                travel_times,
                active_links,
                now,
                &mut result,
            ) {}
        }

        result.stays_active = self
            .in_links
            .iter()
            .any(|id| links[id.index()].has_discharge_ready());
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn move_head(
        &self,
        in_link: &Id<Link>,
        links: &mut [LinkQueue],
        network: &Network,
        travel_times: &TravelTimeTable,
        active_links: &ActivationRegistry<Link>,
        now: u32,
        result: &mut NodeMoveResult,
    ) -> bool {
        let Some(head) = links[in_link.index()].offers() else {
            return false;
        };

        let Some(out_link) = head.next_link().cloned() else {
            panic!(
                "Entity {} in the buffer of link {in_link} has no next link. Arriving entities never enter a buffer.",
                head.id()
            );
        };
        let mode = head.mode();

        if out_link != *in_link && !links[out_link.index()].is_available() {
            trace!(
                "Entity {} can't cross node {}. Link {out_link} is full.",
                head.id(),
                self.id
            );
            return false;
        }

        let travel_time = travel_times
            .travel_time(mode, network.get_link(&out_link), now)
            .unwrap_or_else(|| {
                panic!("No travel time for mode {mode}. Modes are checked when entities enter the network.")
            });

        let Some(entry) = links[in_link.index()].pop_discharged() else {
            return false;
        };
        let holds_storage = entry.holds_storage;
        let mut entity = entry.entity;
        entity.advance();

        match links[out_link.index()].enter(entity, now, travel_time) {
            Ok(()) => {
                active_links.activate(&out_link);
                result.moved += 1;
                true
            }
            Err(violation) => {
                let mut entity = violation.into_entity();
                entity.retreat();
                links[in_link.index()].restore_discharged(BufferEntry {
                    entity,
                    holds_storage,
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use macros::integration_test;

    use crate::simulation::entities::{Entity, Mode};
    use crate::simulation::id::Id;
    use crate::simulation::network::activation::ActivationRegistry;
    use crate::simulation::network::link::{BufferEntry, LinkQueue, QueuePosition};
    use crate::simulation::network::node::NodeMover;
    use crate::simulation::network::{LinkAttributesBuilder, Network};
    use crate::simulation::travel_time::{FreeSpeedTravelTime, ModeTravelTimes, TravelTimeTable};

    /// Two inbound links `in-a` and `in-b` merge at node `center` into link `out`, which holds a
    /// single entity.
    fn merge_network() -> Network {
        let mut network = Network::new();
        for node in ["a", "b", "center", "end"] {
            network.add_node(node, 0., 0.).unwrap();
        }
        for (id, from, to, storage) in [
            ("in-a", "a", "center", 10),
            ("in-b", "b", "center", 10),
            ("out", "center", "end", 1),
        ] {
            network
                .add_link(
                    LinkAttributesBuilder::default()
                        .id(id)
                        .from(from)
                        .to(to)
                        .length(10.)
                        .freespeed(1.)
                        .capacity(36000.)
                        .storage_capacity(storage)
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        network
    }

    fn table() -> TravelTimeTable {
        let mut travel_times = ModeTravelTimes::default();
        travel_times.insert(String::from("car"), Arc::new(FreeSpeedTravelTime));
        TravelTimeTable::resolve(&travel_times, &[]).unwrap()
    }

    fn links(network: &Network) -> Vec<LinkQueue> {
        network
            .links()
            .iter()
            .map(|link| LinkQueue::from_link(link, 1., network.effective_cell_size))
            .collect()
    }

    /// Puts an entity into the buffer of `in_link`.
    fn discharge_ready(links: &mut [LinkQueue], id: u64, in_link: u64, route: Vec<u64>) {
        let entity = Entity::new(
            Id::new_internal(id),
            Mode::Car,
            route.into_iter().map(Id::new_internal).collect(),
        );
        let link = &mut links[in_link as usize];
        link.depart(entity, 0);
        link.do_sim_step(0);
    }

    #[integration_test]
    fn in_links_sorted() {
        let network = merge_network();
        let center = network.node_id("center").unwrap();
        let mover = NodeMover::new(network.get_node(&center));

        let internals: Vec<_> = mover.in_links().iter().map(Id::internal).collect();
        assert_eq!(vec![0, 1], internals);
    }

    #[integration_test]
    fn move_to_next_link() {
        let network = merge_network();
        let mut links = links(&network);
        let active_links = ActivationRegistry::new(network.links().len());
        let mover = NodeMover::new(network.get_node(&network.node_id("center").unwrap()));
        discharge_ready(&mut links, 0, 0, vec![0, 2]);

        let result = mover.move_node(&mut links, &network, &table(), &active_links, 1);

        assert_eq!(1, result.moved);
        assert!(!result.stays_active);
        assert_eq!(Some(QueuePosition::Queued), links[2].locate(&Id::new_internal(0)));
        assert_eq!(Some(11), links[2].earliest_exit_time(&Id::new_internal(0)));
        assert!(active_links.is_active(&Id::new_internal(2)));

        // nothing new arrived in the buffers, so a second move is a no-op
        let again = mover.move_node(&mut links, &network, &table(), &active_links, 1);
        assert_eq!(0, again.moved);
        assert_eq!(1, links[2].occupancy());
    }

    #[integration_test]
    fn lower_link_id_goes_first() {
        let network = merge_network();
        let mut links = links(&network);
        let active_links = ActivationRegistry::new(network.links().len());
        let mover = NodeMover::new(network.get_node(&network.node_id("center").unwrap()));
        discharge_ready(&mut links, 0, 1, vec![1, 2]);
        discharge_ready(&mut links, 1, 0, vec![0, 2]);

        let result = mover.move_node(&mut links, &network, &table(), &active_links, 1);

        // the out link holds one entity, so only the entity from in-a is moved
        assert_eq!(1, result.moved);
        assert!(result.stays_active);
        assert_eq!(Some(QueuePosition::Queued), links[2].locate(&Id::new_internal(1)));
        assert_eq!(
            Some(QueuePosition::DischargeReady),
            links[1].locate(&Id::new_internal(0))
        );
    }

    #[integration_test]
    fn blocked_entity_is_kept() {
        let network = merge_network();
        let mut links = links(&network);
        let active_links = ActivationRegistry::new(network.links().len());
        let mover = NodeMover::new(network.get_node(&network.node_id("center").unwrap()));
        links[2]
            .enter(
                Entity::new(Id::new_internal(9), Mode::Car, vec![Id::new_internal(2)]),
                0,
                100,
            )
            .unwrap();
        discharge_ready(&mut links, 0, 0, vec![0, 2]);

        for now in 1..5 {
            let result = mover.move_node(&mut links, &network, &table(), &active_links, now);
            assert_eq!(0, result.moved);
            assert!(result.stays_active);
        }

        let head = links[0].offers().unwrap();
        assert_eq!(Id::new_internal(0), *head.id());
        assert_eq!(0, head.route_index());
        assert_eq!(1, links[2].occupancy());
    }

    #[test]
    #[should_panic(expected = "has no next link")]
    fn arriving_entity_in_buffer() {
        let network = merge_network();
        let mut links = links(&network);
        let active_links = ActivationRegistry::new(network.links().len());
        let mover = NodeMover::new(network.get_node(&network.node_id("center").unwrap()));
        links[0].restore_discharged(BufferEntry {
            entity: Entity::new(Id::new_internal(0), Mode::Car, vec![Id::new_internal(0)]),
            holds_storage: false,
        });

        mover.move_node(&mut links, &network, &table(), &active_links, 1);
    }
}
