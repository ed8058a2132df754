use parking_lot::RwLock;
use tracing::trace;

/// A filesystem region guarded by its own read/write lock.
///
/// Declaration order is the one fixed global acquisition order; every
/// multi-region acquisition sorts into this order first so concurrent
/// callers requesting overlapping sets cannot deadlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    ModsFolder,
    Staging,
    Archives,
    Config,
}

/// The three folder regions that hold mod copies.
pub const MOD_FILES: &[Region] = &[Region::ModsFolder, Region::Staging, Region::Archives];

/// Every region.
pub const EVERYTHING: &[Region] = &[
    Region::ModsFolder,
    Region::Staging,
    Region::Archives,
    Region::Config,
];

impl Region {
    fn index(self) -> usize {
        match self {
            Region::ModsFolder => 0,
            Region::Staging => 1,
            Region::Archives => 2,
            Region::Config => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Region::ModsFolder => "mods folder",
            Region::Staging => "staging",
            Region::Archives => "archives",
            Region::Config => "config",
        }
    }
}

/// Serialization point for all disk mutation.
///
/// Reads on a region run concurrently; a write is exclusive versus all other
/// reads and writes on that region. There is no read-to-write upgrade: a
/// caller that checked a condition under a read lock must re-check it after
/// acquiring the write lock.
pub struct IoLocks {
    regions: [RwLock<()>; 4],
}

impl Default for IoLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl IoLocks {
    pub fn new() -> Self {
        Self {
            regions: [
                RwLock::new(()),
                RwLock::new(()),
                RwLock::new(()),
                RwLock::new(()),
            ],
        }
    }

    /// Runs `action` while holding read locks on `regions`.
    pub fn read<T>(&self, regions: &[Region], action: impl FnOnce() -> T) -> T {
        let ordered = canonical_order(regions);
        let mut guards = Vec::with_capacity(ordered.len());
        for region in &ordered {
            trace!(region = region.label(), "read lock");
            guards.push(self.regions[region.index()].read());
        }
        let result = action();
        // Release in reverse acquisition order.
        while guards.pop().is_some() {}
        result
    }

    /// Runs `action` while holding write locks on `regions`.
    pub fn write<T>(&self, regions: &[Region], action: impl FnOnce() -> T) -> T {
        let ordered = canonical_order(regions);
        let mut guards = Vec::with_capacity(ordered.len());
        for region in &ordered {
            trace!(region = region.label(), "write lock");
            guards.push(self.regions[region.index()].write());
        }
        let result = action();
        while guards.pop().is_some() {}
        result
    }
}

fn canonical_order(regions: &[Region]) -> Vec<Region> {
    let mut ordered = regions.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
}
