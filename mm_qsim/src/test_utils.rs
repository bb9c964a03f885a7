use std::sync::Arc;

use crate::simulation::config::{Config, NetworkEngine, Simulation};
use crate::simulation::entities::{Entity, Mode};
use crate::simulation::id::{Id, IdStore};
use crate::simulation::network::{Link, LinkAttributesBuilder, Network};
use crate::simulation::travel_time::{
    ConstantSpeedTravelTime, FreeSpeedTravelTime, ModeTravelTimes,
};

/// Creates a chain of links `link-0`, `link-1`, ... from `node-i` to `node-(i+1)`. Each link is
/// described as `(length, freespeed, capacity per hour, storage capacity)`.
pub fn corridor(links: &[(f64, f32, f32, Option<u32>)]) -> Network {
    let mut network = Network::new();
    for i in 0..=links.len() {
        network
            .add_node(&format!("node-{i}"), i as f64 * 100., 0.)
            .unwrap();
    }
    for (i, (length, freespeed, capacity, storage)) in links.iter().enumerate() {
        let mut builder = LinkAttributesBuilder::default();
        builder
            .id(format!("link-{i}"))
            .from(format!("node-{i}"))
            .to(format!("node-{}", i + 1))
            .length(*length)
            .freespeed(*freespeed)
            .capacity(*capacity);
        if let Some(storage) = storage {
            builder.storage_capacity(*storage);
        }
        network.add_link(builder.build().unwrap()).unwrap();
    }
    network
}

pub fn route(network: &Network, links: &[&str]) -> Vec<Id<Link>> {
    links
        .iter()
        .map(|external| {
            network
                .link_id(external)
                .unwrap_or_else(|| panic!("No link {external} in network"))
        })
        .collect()
}

pub fn entity(ids: &mut IdStore<Entity>, id: &str, mode: Mode, route: Vec<Id<Link>>) -> Entity {
    Entity::new(ids.create_id(id), mode, route)
}

/// Cars at free speed, walkers at 1 m/s.
pub fn travel_times() -> ModeTravelTimes {
    let mut travel_times = ModeTravelTimes::default();
    travel_times.insert(String::from("car"), Arc::new(FreeSpeedTravelTime));
    travel_times.insert(
        String::from("walk"),
        Arc::new(ConstantSpeedTravelTime::new(1.)),
    );
    travel_times
}

pub fn config(start_time: u32, end_time: u32) -> Config {
    let mut config = Config::default();
    config.set_simulation(Simulation {
        start_time,
        end_time,
        sample_size: 1.0,
        main_modes: vec![String::from("car")],
    });
    config.set_network_engine(NetworkEngine { info_period: 3600 });
    config
}
