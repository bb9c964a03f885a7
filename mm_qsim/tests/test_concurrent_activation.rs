use std::sync::{Arc, Barrier};
use std::thread;

use macros::integration_test;
use mm_qsim::simulation::engines::network_engine::NetworkEngine;
use mm_qsim::simulation::entities::{Entity, Mode};
use mm_qsim::simulation::id::IdStore;
use mm_qsim::test_utils::{config, corridor, entity, route, travel_times};

fn prepared_corridor(link_count: usize) -> NetworkEngine {
    let network = corridor(&vec![(100., 10., 3600., None); link_count]);
    let mut engine = NetworkEngine::new(Arc::new(network), &config(0, 3600), travel_times());
    engine.prepare().unwrap();
    engine
}

#[integration_test(mm_qsim)]
fn same_link_activated_from_many_threads() {
    let mut engine = prepared_corridor(3);
    let link = engine.network().link_id("link-1").unwrap();
    let activator = engine.activator();

    let newly_activated: usize = (0..8)
        .map(|_| {
            let activator = activator.clone();
            let link = link.clone();
            thread::spawn(move || (0..100).filter(|_| activator.activate_link(&link)).count())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .sum();

    assert_eq!(1, newly_activated);
    assert_eq!(1, engine.active_link_count());

    // the link is swept once and dropped, as it holds no entities
    engine.step(0).unwrap();
    assert_eq!(0, engine.active_link_count());
    assert!(!engine.is_link_active(&link));
}

#[integration_test(mm_qsim)]
fn entities_sent_while_engine_steps() {
    let mut engine = prepared_corridor(3);
    let activator = engine.activator();
    let links = route(engine.network(), &["link-0", "link-1", "link-2"]);
    let total = 50;

    let sender = thread::spawn(move || {
        let mut ids = IdStore::new();
        for i in 0..total {
            let e = entity(&mut ids, &format!("e{i}"), Mode::Car, links.clone());
            activator.send_en_route(e).unwrap();
            if i % 10 == 0 {
                thread::yield_now();
            }
        }
    });

    let mut arrived = 0;
    let mut now = 0;
    while !sender.is_finished() || arrived < total {
        engine.step(now).unwrap();
        arrived += engine.take_arrived().len();
        now += 1;
        assert!(now < 3600, "entities got lost");
    }
    sender.join().unwrap();

    assert_eq!(total, arrived);
    assert_eq!(0, engine.entities_on_net());
}

/// Two engines on their own threads. Entities which finish their route on the first corridor are
/// handed over to the second one, which owns a separate network.
#[integration_test(mm_qsim)]
fn sibling_engines_hand_over_entities() {
    let total = 20;
    let mut upstream = prepared_corridor(2);
    let mut downstream = prepared_corridor(3);
    let downstream_activator = downstream.activator();
    let downstream_route = route(downstream.network(), &["link-0", "link-1", "link-2"]);
    let upstream_route = route(upstream.network(), &["link-0", "link-1"]);

    let mut ids = IdStore::new();
    for i in 0..total {
        upstream
            .depart(
                entity(&mut ids, &format!("e{i}"), Mode::Car, upstream_route.clone()),
                0,
            )
            .unwrap();
    }

    let end_time = 300;
    let barrier = Arc::new(Barrier::new(2));

    let upstream_barrier = barrier.clone();
    let upstream_handle = thread::spawn(move || {
        for now in 0..end_time {
            upstream.step(now).unwrap();
            for e in upstream.take_arrived() {
                let handed_over = Entity::new(e.id().clone(), e.mode(), downstream_route.clone());
                downstream_activator.send_en_route(handed_over).unwrap();
            }
            upstream_barrier.wait();
        }
        upstream.shutdown().unwrap()
    });

    let downstream_handle = thread::spawn(move || {
        let mut arrived = Vec::new();
        for now in 0..end_time {
            barrier.wait();
            downstream.step(now).unwrap();
            arrived.extend(downstream.take_arrived());
        }
        (arrived, downstream.shutdown().unwrap())
    });

    let upstream_report = upstream_handle.join().unwrap();
    let (arrived, downstream_report) = downstream_handle.join().unwrap();

    assert!(upstream_report.cleared.is_empty());
    assert!(downstream_report.cleared.is_empty());
    assert!(downstream_report.inconsistencies.is_empty());
    assert_eq!(total, arrived.len());
    for (i, e) in arrived.iter().enumerate() {
        assert_eq!(format!("e{i}"), e.id().external());
    }
}
