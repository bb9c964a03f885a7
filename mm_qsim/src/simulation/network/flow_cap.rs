/// Accumulates the outflow capacity of a link. Every tick adds `capacity_per_tick` to the
/// accumulated value. Each entity released towards the downstream node consumes one whole unit, so
/// a tick never releases more than `capacity_per_tick` entities.
///
/// The accumulated value is capped at one tick worth of capacity, but at least at one unit. Links
/// with less than one unit per tick carry the remainder over and release one entity every
/// `1 / capacity_per_tick` ticks. Links with more release `floor(capacity_per_tick)` per tick.
#[derive(Debug, Clone)]
pub struct FlowCap {
    last_update_time: u32,
    value: f32,
    max_value: f32,
    capacity_per_tick: f32,
}

// absorbs rounding errors when fractions of a unit add up to a whole one
const EPSILON: f32 = 1e-5;

impl FlowCap {
    pub fn new(capacity_h: f32, sample_size: f32) -> FlowCap {
        let capacity_s = capacity_h * sample_size / 3600.;
        let max_value = if capacity_s > 0. {
            capacity_s.max(1.)
        } else {
            0.
        };
        FlowCap {
            last_update_time: 0,
            value: max_value,
            max_value,
            capacity_per_tick: capacity_s,
        }
    }

    /// Updates the accumulated capacity if the time has advanced.
    pub fn update_capacity(&mut self, now: u32) {
        if self.last_update_time < now {
            let ticks = (now - self.last_update_time) as f32;
            let acc_flow_cap = ticks * self.capacity_per_tick + self.value;
            self.value = f32::min(acc_flow_cap, self.max_value);
            self.last_update_time = now;
        }
    }

    /// True if a whole unit of capacity is available.
    pub fn has_capacity_left(&self) -> bool {
        self.value >= 1. - EPSILON
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn consume_one(&mut self) {
        self.value -= 1.;
    }

    pub fn capacity_per_tick(&self) -> f32 {
        self.capacity_per_tick
    }
}
