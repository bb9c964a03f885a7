/// StorageCap tracks how many entities a link can hold at once. Entities consume storage when they
/// enter a link and release it when they leave the link, either by moving on to the next link or
/// by arriving at the end of their route. Entities which depart on a link don't consume storage,
/// as they are placed into the waiting list of the link.
#[derive(Debug, Clone)]
pub struct StorageCap {
    max: u32,
    used: u32,
}

impl StorageCap {
    pub fn build(
        length: f64,
        perm_lanes: f32,
        capacity_h: f32,
        sample_size: f32,
        effective_cell_size: f32,
    ) -> Self {
        let flow_cap_s = capacity_h as f64 * sample_size as f64 / 3600.;
        let cells = length * perm_lanes as f64 * sample_size as f64 / effective_cell_size as f64;
        // storage capacity needs to be at least enough to handle the cap_per_time_step, and every
        // link must be able to hold a single entity
        let max = cells.floor().max(flow_cap_s.ceil()).max(1.);

        Self::with_max(max as u32)
    }

    pub fn with_max(max: u32) -> Self {
        Self { max, used: 0 }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Consumes storage for one entity. This method should be called when an entity enters a link.
    pub fn consume(&mut self) {
        self.used += 1;
    }

    /// Releases the storage of one entity. This method should be called when an entity leaves a link.
    pub fn release(&mut self) {
        self.used = self.used.saturating_sub(1);
    }

    pub fn is_available(&self) -> bool {
        self.used < self.max
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}
