//! A read-only map from link-layer and IPv4 addresses to the nodes that own them. It is built
//! once while the topology is set up and then shared by reference with every component that
//! needs to resolve an address it observed on the network.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Display;
use std::net::Ipv4Addr;

use sim_helper::NodeId;

use super::MacAddress;

#[derive(Debug, PartialEq, Eq)]
pub enum RegistrationError {
    InvalidMac,
    InvalidAddr,
    MacExists,
    AddrExists,
}

impl Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::InvalidMac => {
                write!(f, "link-layer address is invalid for registration")
            }
            RegistrationError::InvalidAddr => write!(f, "address is invalid for registration"),
            RegistrationError::MacExists => {
                write!(f, "a registration record already exists for link-layer address")
            }
            RegistrationError::AddrExists => {
                write!(f, "a registration record already exists for address")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

#[derive(Debug, Default)]
pub struct DirectoryBuilder {
    mac_index: HashMap<MacAddress, NodeId>,
    addr_index: HashMap<Ipv4Addr, (NodeId, MacAddress)>,
}

impl DirectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device of `node`. Devices without an IPv4 address (for example those of
    /// passive observers) pass `None`.
    pub fn register(
        &mut self,
        node: NodeId,
        mac: MacAddress,
        addr: Option<Ipv4Addr>,
    ) -> Result<(), RegistrationError> {
        if mac.is_group() {
            return Err(RegistrationError::InvalidMac);
        }
        if let Some(addr) = addr {
            if addr.is_loopback() || addr.is_unspecified() || addr.is_broadcast() || addr.is_multicast()
            {
                return Err(RegistrationError::InvalidAddr);
            }
            if self.addr_index.contains_key(&addr) {
                return Err(RegistrationError::AddrExists);
            }
        }

        // check both indexes before inserting into either
        match self.mac_index.entry(mac) {
            Entry::Occupied(_) => Err(RegistrationError::MacExists),
            Entry::Vacant(mac_entry) => {
                mac_entry.insert(node);
                if let Some(addr) = addr {
                    self.addr_index.insert(addr, (node, mac));
                }
                Ok(())
            }
        }
    }

    pub fn into_directory(self) -> NodeDirectory {
        log::debug!(
            "Node directory holds {} link-layer and {} IPv4 addresses",
            self.mac_index.len(),
            self.addr_index.len()
        );
        NodeDirectory {
            mac_index: self.mac_index,
            addr_index: self.addr_index,
        }
    }
}

#[derive(Debug)]
pub struct NodeDirectory {
    mac_index: HashMap<MacAddress, NodeId>,
    addr_index: HashMap<Ipv4Addr, (NodeId, MacAddress)>,
}

impl NodeDirectory {
    pub fn node_for_mac(&self, mac: MacAddress) -> Option<NodeId> {
        self.mac_index.get(&mac).copied()
    }

    pub fn node_for_addr(&self, addr: Ipv4Addr) -> Option<NodeId> {
        self.addr_index.get(&addr).map(|(node, _)| *node)
    }

    /// The link-layer address of the device that holds `addr`.
    pub fn mac_for_addr(&self, addr: Ipv4Addr) -> Option<MacAddress> {
        self.addr_index.get(&addr).map(|(_, mac)| *mac)
    }

    /// Number of registered link-layer addresses.
    pub fn len(&self) -> usize {
        self.mac_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mac_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_a() -> (NodeId, MacAddress, Ipv4Addr) {
        (
            NodeId::from(0),
            MacAddress::from_index(0),
            Ipv4Addr::new(10, 0, 0, 1),
        )
    }

    fn node_b() -> (NodeId, MacAddress, Ipv4Addr) {
        (
            NodeId::from(1),
            MacAddress::from_index(1),
            Ipv4Addr::new(10, 0, 0, 2),
        )
    }

    #[test]
    fn test_register() {
        let (id_a, mac_a, addr_a) = node_a();
        let (id_b, mac_b, addr_b) = node_b();

        let mut builder = DirectoryBuilder::new();

        assert!(builder.register(id_a, mac_a, Some(addr_a)).is_ok());

        assert_eq!(
            builder.register(id_b, MacAddress::BROADCAST, Some(addr_b)),
            Err(RegistrationError::InvalidMac)
        );
        for bad in [
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(224, 0, 0, 1),
        ] {
            assert_eq!(
                builder.register(id_b, mac_b, Some(bad)),
                Err(RegistrationError::InvalidAddr)
            );
        }
        assert_eq!(
            builder.register(id_b, mac_a, Some(addr_b)),
            Err(RegistrationError::MacExists)
        );
        assert_eq!(
            builder.register(id_b, mac_b, Some(addr_a)),
            Err(RegistrationError::AddrExists)
        );

        // a failed registration must not leave a partial record behind
        assert!(builder.register(id_b, mac_b, Some(addr_b)).is_ok());
    }

    #[test]
    fn test_lookups() {
        let (id_a, mac_a, addr_a) = node_a();
        let (id_b, mac_b, addr_b) = node_b();
        let observer_mac = MacAddress::from_index(7);

        let mut builder = DirectoryBuilder::new();
        builder.register(id_a, mac_a, Some(addr_a)).unwrap();
        builder.register(id_b, mac_b, Some(addr_b)).unwrap();
        builder.register(NodeId::from(7), observer_mac, None).unwrap();
        let directory = builder.into_directory();

        assert_eq!(directory.len(), 3);
        assert_eq!(directory.node_for_mac(mac_a), Some(id_a));
        assert_eq!(directory.node_for_mac(mac_b), Some(id_b));
        assert_eq!(directory.node_for_mac(observer_mac), Some(NodeId::from(7)));
        assert_eq!(directory.node_for_mac(MacAddress::from_index(42)), None);

        assert_eq!(directory.node_for_addr(addr_a), Some(id_a));
        assert_eq!(directory.node_for_addr(addr_b), Some(id_b));
        assert_eq!(directory.node_for_addr(Ipv4Addr::new(1, 2, 3, 4)), None);
        assert_eq!(directory.mac_for_addr(addr_b), Some(mac_b));
    }
}
