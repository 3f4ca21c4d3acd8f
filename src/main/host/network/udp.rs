//! The UDP socket table of a node. Sockets are plain bindings: a datagram that the routing
//! protocol delivers locally is handed to whichever owner bound the matching address.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::host::application::AppId;

/// Ephemeral ports are chosen from `MIN_RANDOM_PORT..=u16::MAX`.
pub const MIN_RANDOM_PORT: u16 = 10000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(u64);

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket{}", self.0)
    }
}

/// Who receives the datagrams arriving at a socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SocketOwner {
    Routing,
    Application(AppId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UdpSocket {
    pub id: SocketId,
    pub local: SocketAddrV4,
    pub owner: SocketOwner,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AddrInUse(pub SocketAddrV4);

impl std::fmt::Display for AddrInUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "address {} is already in use", self.0)
    }
}

impl std::error::Error for AddrInUse {}

#[derive(Debug, Default)]
pub struct UdpSocketTable {
    sockets: BTreeMap<SocketId, UdpSocket>,
    next_id: u64,
}

impl UdpSocketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_addr_in_use(&self, local: SocketAddrV4) -> bool {
        self.sockets.values().any(|s| {
            s.local.port() == local.port()
                && (s.local.ip() == local.ip()
                    || s.local.ip().is_unspecified()
                    || local.ip().is_unspecified())
        })
    }

    /// Bind a socket to `local`. An unspecified address binds every local address on that port.
    pub fn bind(
        &mut self,
        local: SocketAddrV4,
        owner: SocketOwner,
    ) -> Result<SocketId, AddrInUse> {
        if self.is_addr_in_use(local) {
            return Err(AddrInUse(local));
        }

        let id = SocketId(self.next_id);
        self.next_id += 1;
        self.sockets.insert(id, UdpSocket { id, local, owner });
        log::trace!("Bound {id} to {local} for {owner:?}");
        Ok(id)
    }

    pub fn close(&mut self, id: SocketId) -> bool {
        self.sockets.remove(&id).is_some()
    }

    pub fn get(&self, id: SocketId) -> Option<&UdpSocket> {
        self.sockets.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// The socket that should receive a datagram sent to `dst`. A socket bound to the exact
    /// address wins over one bound to the unspecified address.
    pub fn lookup(&self, dst: SocketAddrV4) -> Option<&UdpSocket> {
        let mut wildcard = None;
        for socket in self.sockets.values() {
            if socket.local.port() != dst.port() {
                continue;
            }
            if socket.local.ip() == dst.ip() {
                return Some(socket);
            }
            if socket.local.ip().is_unspecified() && wildcard.is_none() {
                wildcard = Some(socket);
            }
        }
        wildcard
    }

    /// Returns a random unused port.
    pub fn get_random_free_port(&self, addr: Ipv4Addr, mut rng: impl rand::Rng) -> Option<u16> {
        // if choosing randomly doesn't succeed within 10 tries, then we have already allocated a
        // lot of ports and fall back to a linear search
        for _ in 0..10 {
            let port = rng.gen_range(MIN_RANDOM_PORT..=u16::MAX);
            if !self.is_addr_in_use(SocketAddrV4::new(addr, port)) {
                return Some(port);
            }
        }

        let start = rng.gen_range(MIN_RANDOM_PORT..=u16::MAX);
        for port in (start..=u16::MAX).chain(MIN_RANDOM_PORT..start) {
            if !self.is_addr_in_use(SocketAddrV4::new(addr, port)) {
                return Some(port);
            }
        }

        log::warn!("Unable to find a free ephemeral port on {addr}");
        None
    }
}

#[cfg(test)]
mod tests {
    use rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use super::*;

    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const BCAST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 255);

    #[test]
    fn test_bind_conflicts() {
        let mut table = UdpSocketTable::new();
        table
            .bind(SocketAddrV4::new(LOCAL, 654), SocketOwner::Routing)
            .unwrap();
        table
            .bind(SocketAddrV4::new(BCAST, 654), SocketOwner::Routing)
            .unwrap();

        assert_eq!(
            table.bind(SocketAddrV4::new(LOCAL, 654), SocketOwner::Routing),
            Err(AddrInUse(SocketAddrV4::new(LOCAL, 654)))
        );
        assert!(table
            .bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 654), SocketOwner::Routing)
            .is_err());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_lookup_prefers_exact() {
        let mut table = UdpSocketTable::new();
        let any = table
            .bind(
                SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9),
                SocketOwner::Application(AppId::from(0)),
            )
            .unwrap();
        let bcast = table
            .bind(SocketAddrV4::new(BCAST, 654), SocketOwner::Routing)
            .unwrap();

        assert_eq!(table.lookup(SocketAddrV4::new(LOCAL, 9)).unwrap().id, any);
        assert_eq!(table.lookup(SocketAddrV4::new(BCAST, 654)).unwrap().id, bcast);
        assert!(table.lookup(SocketAddrV4::new(LOCAL, 654)).is_none());

        assert!(table.close(bcast));
        assert!(!table.close(bcast));
        assert!(table.lookup(SocketAddrV4::new(BCAST, 654)).is_none());
    }

    #[test]
    fn test_random_free_port() {
        let mut table = UdpSocketTable::new();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for _ in 0..100 {
            let port = table.get_random_free_port(LOCAL, &mut rng).unwrap();
            assert!(port >= MIN_RANDOM_PORT);
            table
                .bind(SocketAddrV4::new(LOCAL, port), SocketOwner::Routing)
                .unwrap();
        }
        assert_eq!(table.len(), 100);
    }
}
