//! Duplicate packet detection over a sliding time window.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::Ipv4Addr;

use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;

type Key = (Ipv4Addr, u64);

/// Remembers which (source address, packet id) pairs were seen recently. Every sighting pushes
/// the pair's expiry back to `now + window`, so a pair is only forgotten once it has gone unseen
/// for a whole window.
#[derive(Debug)]
pub struct DuplicatePacketDetection {
    window: SimulationTime,
    expiries: HashMap<Key, EmulatedTime>,
    // may hold stale entries for keys that were refreshed since; those are skipped on purge
    by_expiry: BinaryHeap<Reverse<(EmulatedTime, Key)>>,
}

impl DuplicatePacketDetection {
    pub fn new(window: SimulationTime) -> Self {
        Self {
            window,
            expiries: HashMap::new(),
            by_expiry: BinaryHeap::new(),
        }
    }

    pub fn window(&self) -> SimulationTime {
        self.window
    }

    /// Returns whether the pair was already seen within the window, and records this sighting.
    pub fn is_duplicate(&mut self, now: EmulatedTime, source: Ipv4Addr, id: u64) -> bool {
        self.purge(now);

        let expiry = now.saturating_add(self.window);
        let key = (source, id);
        let seen = self.expiries.insert(key, expiry).is_some();
        self.by_expiry.push(Reverse((expiry, key)));

        if seen {
            log::trace!("Duplicate packet {id} from {source}");
        }
        seen
    }

    /// Forget every pair whose expiry is not after `now`.
    pub fn purge(&mut self, now: EmulatedTime) {
        while let Some(Reverse((expiry, key))) = self.by_expiry.peek().copied() {
            if expiry > now {
                break;
            }
            self.by_expiry.pop();
            if self.expiries.get(&key) == Some(&expiry) {
                self.expiries.remove(&key);
            }
        }
    }

    /// Number of pairs currently remembered, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    fn at(secs: u64) -> EmulatedTime {
        EmulatedTime::SIMULATION_START + SimulationTime::from_secs(secs)
    }

    #[test]
    fn test_second_sighting_is_duplicate() {
        let mut dpd = DuplicatePacketDetection::new(SimulationTime::from_secs(60));
        assert!(!dpd.is_duplicate(at(0), SRC, 1));
        assert!(dpd.is_duplicate(at(1), SRC, 1));
        assert!(!dpd.is_duplicate(at(1), SRC, 2));
        assert!(!dpd.is_duplicate(at(1), Ipv4Addr::new(10, 0, 0, 2), 1));
        assert_eq!(dpd.len(), 3);
    }

    #[test]
    fn test_forgotten_after_window() {
        let mut dpd = DuplicatePacketDetection::new(SimulationTime::from_secs(60));
        assert_eq!(dpd.window(), SimulationTime::MINUTE);
        assert!(!dpd.is_duplicate(at(0), SRC, 1));
        assert!(dpd.is_duplicate(at(59), SRC, 1));
        // the sighting at 59 s refreshed the window
        assert!(dpd.is_duplicate(at(100), SRC, 1));
        assert!(!dpd.is_duplicate(at(160), SRC, 1));
    }

    #[test]
    fn test_purge() {
        let mut dpd = DuplicatePacketDetection::new(SimulationTime::from_secs(10));
        for id in 0..100 {
            dpd.is_duplicate(at(id / 10), SRC, id);
        }
        assert_eq!(dpd.len(), 100);

        dpd.purge(at(15));
        // ids seen at 6 s or later expire after 15 s
        assert_eq!(dpd.len(), 40);

        dpd.purge(at(1000));
        assert!(dpd.is_empty());
    }

    #[test]
    fn test_refresh_keeps_entry_through_purge() {
        let mut dpd = DuplicatePacketDetection::new(SimulationTime::from_secs(10));
        dpd.is_duplicate(at(0), SRC, 7);
        dpd.is_duplicate(at(8), SRC, 7);
        dpd.purge(at(12));
        assert_eq!(dpd.len(), 1);
        assert!(dpd.is_duplicate(at(17), SRC, 7));
    }
}
