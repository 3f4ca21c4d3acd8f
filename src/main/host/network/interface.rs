use std::net::Ipv4Addr;

use crate::network::MacAddress;

/// An IPv4 address assigned to an interface, together with the prefix length of its subnet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InterfaceAddress {
    local: Ipv4Addr,
    prefix_len: u8,
}

impl InterfaceAddress {
    pub fn new(local: Ipv4Addr, prefix_len: u8) -> Self {
        assert!(prefix_len <= 32, "Invalid prefix length {prefix_len}");
        Self { local, prefix_len }
    }

    pub fn local(&self) -> Ipv4Addr {
        self.local
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn mask(&self) -> Ipv4Addr {
        let bits = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
        Ipv4Addr::from(bits)
    }

    /// The subnet-directed broadcast address.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.local) | !u32::from(self.mask()))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask());
        u32::from(self.local) & mask == u32::from(addr) & mask
    }
}

impl std::fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.local, self.prefix_len)
    }
}

/// An IPv4 interface of a node's stack. Interface 0 is always the loopback interface, which has
/// no link-layer device behind it.
#[derive(Debug)]
pub struct NetworkInterface {
    index: u32,
    name: String,
    device: Option<(u32, MacAddress)>,
    addresses: Vec<InterfaceAddress>,
    up: bool,
    forwarding: bool,
}

impl NetworkInterface {
    pub fn new_loopback() -> Self {
        Self {
            index: 0,
            name: "lo".into(),
            device: None,
            addresses: vec![InterfaceAddress::new(Ipv4Addr::LOCALHOST, 8)],
            up: false,
            forwarding: true,
        }
    }

    /// An interface on top of link-layer device `device`. Interfaces start down and without
    /// addresses.
    pub fn new(index: u32, name: &str, device: u32, mac: MacAddress) -> Self {
        Self {
            index,
            name: name.into(),
            device: Some((device, mac)),
            addresses: Vec::new(),
            up: false,
            forwarding: true,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loopback(&self) -> bool {
        self.device.is_none()
    }

    /// The device index and link-layer address, unless this is loopback.
    pub fn device(&self) -> Option<(u32, MacAddress)> {
        self.device
    }

    pub fn addresses(&self) -> &[InterfaceAddress] {
        &self.addresses
    }

    pub fn has_local(&self, addr: Ipv4Addr) -> bool {
        self.addresses.iter().any(|a| a.local() == addr)
    }

    pub(super) fn add_address(&mut self, address: InterfaceAddress) -> bool {
        if self.addresses.contains(&address) {
            return false;
        }
        self.addresses.push(address);
        true
    }

    pub(super) fn remove_address(&mut self, addr: Ipv4Addr) -> Option<InterfaceAddress> {
        let pos = self.addresses.iter().position(|a| a.local() == addr)?;
        Some(self.addresses.remove(pos))
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub(super) fn set_up(&mut self, up: bool) {
        self.up = up;
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarding
    }

    pub(super) fn set_forwarding(&mut self, forwarding: bool) {
        self.forwarding = forwarding;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet() {
        let addr = InterfaceAddress::new(Ipv4Addr::new(10, 0, 0, 7), 24);
        assert_eq!(addr.mask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(addr.broadcast(), Ipv4Addr::new(10, 0, 0, 255));
        assert!(addr.contains(Ipv4Addr::new(10, 0, 0, 200)));
        assert!(!addr.contains(Ipv4Addr::new(10, 0, 1, 1)));
        assert_eq!(addr.to_string(), "10.0.0.7/24");

        let host = InterfaceAddress::new(Ipv4Addr::new(10, 0, 0, 7), 32);
        assert_eq!(host.broadcast(), Ipv4Addr::new(10, 0, 0, 7));

        let any = InterfaceAddress::new(Ipv4Addr::new(10, 0, 0, 7), 0);
        assert_eq!(any.mask(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(any.broadcast(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_loopback() {
        let lo = NetworkInterface::new_loopback();
        assert!(lo.is_loopback());
        assert_eq!(lo.index(), 0);
        assert!(lo.has_local(Ipv4Addr::LOCALHOST));
        assert_eq!(lo.addresses()[0].broadcast(), Ipv4Addr::new(127, 255, 255, 255));
    }
}
