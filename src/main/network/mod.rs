pub mod channel;
pub mod directory;
pub mod packet;

use self::packet::PacketRc;

/// The link-layer protocol number for IPv4 payloads.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// A 48-bit link-layer address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const BROADCAST: Self = Self([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// The `n`th address of a sequential allocator (00:00:00:00:00:01 is the first).
    pub fn from_index(n: u64) -> Self {
        assert!(n < (1 << 48) - 1, "link-layer address space exhausted");
        let bytes = (n + 1).to_be_bytes();
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&bytes[2..]);
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group addresses have the low bit of the first octet set. This includes broadcast.
    pub fn is_group(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// How a received frame relates to the receiving device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketType {
    /// Addressed to this device.
    Host,
    Broadcast,
    Multicast,
    /// Addressed to some other device; only seen in promiscuous mode.
    OtherHost,
}

impl PacketType {
    pub fn classify(dst: MacAddress, own: MacAddress) -> Self {
        if dst.is_broadcast() {
            PacketType::Broadcast
        } else if dst.is_group() {
            PacketType::Multicast
        } else if dst == own {
            PacketType::Host
        } else {
            PacketType::OtherHost
        }
    }
}

/// A link-layer frame carrying an IPv4 packet.
#[derive(Clone, Debug)]
pub struct Frame {
    pub src: MacAddress,
    pub dst: MacAddress,
    pub ether_type: u16,
    pub packet: PacketRc,
}
