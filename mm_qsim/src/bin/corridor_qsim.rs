use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use mm_qsim::simulation::config::{CommandLineArgs, Config};
use mm_qsim::simulation::engines::network_engine::NetworkEngine;
use mm_qsim::simulation::entities::{Entity, Mode};
use mm_qsim::simulation::id::IdStore;
use mm_qsim::simulation::logging::{init_logging, init_std_out_logging_thread_local};
use mm_qsim::simulation::network::{LinkAttributesBuilder, Network};
use mm_qsim::simulation::travel_time;
use tracing::info;

const NUM_LINKS: usize = 10;
const BOTTLENECK: usize = 5;
const NUM_ENTITIES: usize = 200;
const DEPARTURE_INTERVAL: u32 = 2;

/// A straight road of 100m links. One link in the middle has a third of the capacity of the others.
fn corridor() -> Result<Network, Box<dyn Error>> {
    let mut network = Network::new();
    for i in 0..=NUM_LINKS {
        network.add_node(&format!("n{i}"), i as f64 * 100., 0.)?;
    }
    for i in 0..NUM_LINKS {
        let capacity = if i == BOTTLENECK { 600. } else { 1800. };
        let link = LinkAttributesBuilder::default()
            .id(format!("l{i}"))
            .from(format!("n{i}"))
            .to(format!("n{}", i + 1))
            .length(100.)
            .freespeed(13.89)
            .capacity(capacity)
            .build()?;
        network.add_link(link)?;
    }
    Ok(network)
}

fn main() -> Result<(), Box<dyn Error>> {
    let _guard = init_std_out_logging_thread_local();

    let args = CommandLineArgs::parse();
    info!("Started with args: {:?}", args);
    let config = Config::try_from(args)?;
    let _log_guards = init_logging(&config, 0)?;

    let network = Arc::new(corridor()?);
    let route: Vec<_> = network.links().iter().map(|link| link.id.clone()).collect();
    let mode: Mode = config
        .simulation()
        .main_modes
        .first()
        .map_or(Ok(Mode::Car), |mode| mode.parse())?;

    let mut engine = NetworkEngine::new(
        network.clone(),
        &config,
        travel_time::from_config(&config.modes()),
    );
    engine.prepare()?;

    let mut entity_ids = IdStore::new();
    let mut departed = 0;
    let mut arrived = 0;
    let simulation = config.simulation();
    for now in simulation.start_time..=simulation.end_time {
        if departed < NUM_ENTITIES && (now - simulation.start_time) % DEPARTURE_INTERVAL == 0 {
            let id = entity_ids.create_id(&format!("entity-{departed}"));
            engine.depart(Entity::new(id, mode, route.clone()), now)?;
            departed += 1;
        }

        engine.step(now)?;
        arrived += engine.take_arrived().len();

        if arrived == NUM_ENTITIES {
            info!("All entities arrived at {now}.");
            break;
        }
    }

    let report = engine.shutdown()?;
    info!(
        "Finished corridor run. {arrived} entities arrived, {} were still on the road and {} inconsistencies were recorded.",
        report.cleared.len(),
        report.inconsistencies.len()
    );
    Ok(())
}
