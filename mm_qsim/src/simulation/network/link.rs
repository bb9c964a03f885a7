use std::collections::VecDeque;

use thiserror::Error;
use tracing::{trace, warn};

use crate::simulation::entities::Entity;
use crate::simulation::error::StateInconsistency;
use crate::simulation::id::Id;
use crate::simulation::network::flow_cap::FlowCap;
use crate::simulation::network::storage_cap::StorageCap;
use crate::simulation::network::{Link, Node};

/// Where on a link an entity currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// Departed onto the link and waits to be let into traffic.
    Waiting,
    /// Travels along the link.
    Queued,
    /// Waits in the discharge buffer to cross the downstream node.
    DischargeReady,
}

/// Returned by [`LinkQueue::enter`] if the link is at its storage capacity. The rejected entity is
/// handed back to the caller, which must hold it and retry later.
#[derive(Debug, Error)]
#[error(
    "link {link} is at its storage capacity of {capacity}. Entity {} was not admitted",
    .entity.id()
)]
pub struct CapacityViolation {
    pub link: Id<Link>,
    pub capacity: u32,
    pub entity: Entity,
}

impl CapacityViolation {
    pub fn into_entity(self) -> Entity {
        self.entity
    }
}

#[derive(Debug)]
struct QueueEntry {
    entity: Entity,
    earliest_exit_time: u32,
}

/// An entity in the discharge buffer. Entities which departed onto the link never consumed
/// storage, so they must not release any when they leave.
#[derive(Debug)]
pub(super) struct BufferEntry {
    pub(super) entity: Entity,
    pub(super) holds_storage: bool,
}

#[derive(Debug, Default)]
pub struct LinkStepResult {
    /// Entities which reached the end of their route on this link.
    pub arrived: Vec<Entity>,
    pub inconsistencies: Vec<StateInconsistency>,
}

/// Runtime state of a link. Entities enter the queue at the upstream end, travel for at least
/// their travel time and are then moved into the discharge buffer, limited by the flow capacity
/// of the link. The downstream node takes entities out of the buffer.
#[derive(Debug)]
pub struct LinkQueue {
    id: Id<Link>,
    to: Id<Node>,
    q: VecDeque<QueueEntry>,
    waiting_list: VecDeque<Entity>,
    buffer: VecDeque<BufferEntry>,
    storage_cap: StorageCap,
    flow_cap: FlowCap,
}

impl LinkQueue {
    pub fn from_link(link: &Link, sample_size: f32, effective_cell_size: f32) -> Self {
        let storage_cap = match link.storage_capacity {
            Some(max) => StorageCap::with_max(max),
            None => StorageCap::build(
                link.length,
                link.permlanes,
                link.capacity,
                sample_size,
                effective_cell_size,
            ),
        };
        LinkQueue::new(
            link.id.clone(),
            link.to.clone(),
            storage_cap,
            FlowCap::new(link.capacity, sample_size),
        )
    }

    pub fn new(id: Id<Link>, to: Id<Node>, storage_cap: StorageCap, flow_cap: FlowCap) -> Self {
        LinkQueue {
            id,
            to,
            q: VecDeque::new(),
            waiting_list: VecDeque::new(),
            buffer: VecDeque::new(),
            storage_cap,
            flow_cap,
        }
    }

    pub fn id(&self) -> &Id<Link> {
        &self.id
    }

    pub fn to(&self) -> &Id<Node> {
        &self.to
    }

    /// Admits an entity at the upstream end of the link. The entity may leave the link at
    /// `now + travel_time` at the earliest, but never within the tick it entered.
    pub fn enter(
        &mut self,
        mut entity: Entity,
        now: u32,
        travel_time: u32,
    ) -> Result<(), CapacityViolation> {
        if !self.storage_cap.is_available() {
            return Err(CapacityViolation {
                link: self.id.clone(),
                capacity: self.storage_cap.max(),
                entity,
            });
        }

        let earliest_exit_time = now.saturating_add(travel_time.max(1));
        entity.set_link_enter_time(now);
        self.storage_cap.consume();
        self.q.push_back(QueueEntry {
            entity,
            earliest_exit_time,
        });
        Ok(())
    }

    /// Puts an entity which starts its route on this link into the waiting list.
    pub fn depart(&mut self, mut entity: Entity, now: u32) {
        entity.set_link_enter_time(now);
        self.waiting_list.push_back(entity);
    }

    /// Fills the buffer from two sources with priority:
    /// 1. Entities in the waiting list.
    /// 2. Entities in the queue which have reached their earliest exit time.
    ///
    /// Both is done only if the flow capacity allows this. Entities which end their route on this
    /// link leave it right away, regardless of the flow capacity.
    pub fn do_sim_step(&mut self, now: u32) -> LinkStepResult {
        self.flow_cap.update_capacity(now);
        let mut result = LinkStepResult::default();
        self.add_waiting_to_buffer(now, &mut result);
        self.add_queue_to_buffer(now, &mut result);
        result
    }

    fn add_waiting_to_buffer(&mut self, now: u32, result: &mut LinkStepResult) {
        while let Some(front) = self.waiting_list.front() {
            let arrives = front.next_link().is_none();
            if !arrives && !self.flow_cap.has_capacity_left() {
                break;
            }
            let Some(entity) = self.waiting_list.pop_front() else {
                break;
            };
            self.check_latest_exit(&entity, now, result);

            if arrives {
                result.arrived.push(entity);
            } else {
                self.flow_cap.consume_one();
                self.buffer.push_back(BufferEntry {
                    entity,
                    holds_storage: false,
                });
            }
        }
    }

    fn add_queue_to_buffer(&mut self, now: u32, result: &mut LinkStepResult) {
        while let Some(front) = self.q.front() {
            // If the earliest exit time has not passed, nothing to do
            if front.earliest_exit_time > now {
                break;
            }
            let arrives = front.entity.next_link().is_none();
            if !arrives && !self.flow_cap.has_capacity_left() {
                break;
            }
            let Some(QueueEntry { entity, .. }) = self.q.pop_front() else {
                break;
            };
            self.check_latest_exit(&entity, now, result);

            if arrives {
                self.storage_cap.release();
                result.arrived.push(entity);
            } else {
                self.flow_cap.consume_one();
                self.buffer.push_back(BufferEntry {
                    entity,
                    holds_storage: true,
                });
            }
        }
    }

    fn check_latest_exit(&self, entity: &Entity, now: u32, result: &mut LinkStepResult) {
        if let Some(latest_exit) = entity.latest_exit().filter(|latest| now > *latest) {
            let inconsistency = StateInconsistency::LateDischarge {
                entity: entity.id().clone(),
                link: self.id.clone(),
                time: now,
                latest_exit,
            };
            warn!("{inconsistency}");
            result.inconsistencies.push(inconsistency);
        }
    }

    /// The entity at the head of the discharge buffer, if any.
    pub fn offers(&self) -> Option<&Entity> {
        self.buffer.front().map(|entry| &entry.entity)
    }

    pub(super) fn pop_discharged(&mut self) -> Option<BufferEntry> {
        let entry = self.buffer.pop_front()?;
        if entry.holds_storage {
            self.storage_cap.release();
        }
        Some(entry)
    }

    /// Puts an entity back to the head of the buffer, after the downstream link rejected it.
    pub(super) fn restore_discharged(&mut self, entry: BufferEntry) {
        if entry.holds_storage {
            self.storage_cap.consume();
        }
        trace!(
            "Entity {} stays in the buffer of link {}",
            entry.entity.id(),
            self.id
        );
        self.buffer.push_front(entry);
    }

    pub fn is_available(&self) -> bool {
        self.storage_cap.is_available()
    }

    /// True while the link holds any entity.
    pub fn is_active(&self) -> bool {
        !self.q.is_empty() || !self.waiting_list.is_empty() || !self.buffer.is_empty()
    }

    pub fn has_discharge_ready(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Number of entities which currently consume storage on this link.
    pub fn occupancy(&self) -> u32 {
        self.storage_cap.used()
    }

    pub fn storage_capacity(&self) -> u32 {
        self.storage_cap.max()
    }

    pub fn flow_capacity(&self) -> f32 {
        self.flow_cap.capacity_per_tick()
    }

    pub fn entity_count(&self) -> usize {
        self.q.len() + self.waiting_list.len() + self.buffer.len()
    }

    pub fn locate(&self, id: &Id<Entity>) -> Option<QueuePosition> {
        if self.waiting_list.iter().any(|e| e.id() == id) {
            Some(QueuePosition::Waiting)
        } else if self.q.iter().any(|entry| entry.entity.id() == id) {
            Some(QueuePosition::Queued)
        } else if self.buffer.iter().any(|entry| entry.entity.id() == id) {
            Some(QueuePosition::DischargeReady)
        } else {
            None
        }
    }

    pub fn earliest_exit_time(&self, id: &Id<Entity>) -> Option<u32> {
        self.q
            .iter()
            .find(|entry| entry.entity.id() == id)
            .map(|entry| entry.earliest_exit_time)
    }

    /// Removes all entities from the link and resets its occupancy.
    pub fn clear(&mut self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.waiting_list.drain(..).collect();
        entities.extend(self.q.drain(..).map(|entry| entry.entity));
        entities.extend(self.buffer.drain(..).map(|entry| entry.entity));
        self.storage_cap.reset();
        entities
    }
}
