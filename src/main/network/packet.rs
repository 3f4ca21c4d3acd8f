use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use bytes::Bytes;

/// Checkpoints that a packet reaches as it moves through the simulated stacks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketStatus {
    SndCreated,
    SndInterfaceSent,
    RcvInterfaceReceived,
    RcvInterfaceObserved,
    RouteLocalDelivery,
    RouteForwarded,
    RouteDuplicate,
    RouteDropped,
    IpTtlExpired,
    RcvSocketDelivered,
    RcvSocketDropped,
}

/// Official IANA-assigned protocols supported in our packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IanaProtocol {
    Udp,
}

impl IanaProtocol {
    /// The IANA-assigned protocol number.
    // https://www.iana.org/assignments/protocol-numbers/protocol-numbers.xhtml
    pub fn number(&self) -> u8 {
        match self {
            IanaProtocol::Udp => 17,
        }
    }
}

/// The IPv4 header fields that routing decisions are made on.
///
/// `uid` identifies the datagram end to end. The originating stack assigns it and every forwarded
/// copy keeps it, so `(src, uid)` is what duplicate detection keys on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub protocol: u8,
    pub uid: u64,
}

impl Ipv4Header {
    /// 20 bytes without options: https://en.wikipedia.org/wiki/IPv4
    pub const LEN: usize = 20;
}

/// A shared reference to an immutable [`Packet`].
///
/// Cloning a `PacketRc` only increments a reference count, which is how one transmission is
/// handed to every receiver in range. Use [`new_copy_with_ttl`](Self::new_copy_with_ttl) to
/// derive the packet a forwarding node sends on.
///
/// The `PartialEq` implementation compares the pointer values of the wrapped `Packet`.
#[derive(Clone, Debug)]
pub struct PacketRc {
    inner: Arc<Packet>,
}

impl PacketRc {
    /// Creates a new IPv4 UDP packet.
    pub fn new_ipv4_udp(
        src: SocketAddrV4,
        dst: SocketAddrV4,
        ttl: u8,
        uid: u64,
        payload: Bytes,
    ) -> Self {
        let header = Ipv4Header {
            src: *src.ip(),
            dst: *dst.ip(),
            ttl,
            protocol: IanaProtocol::Udp.number(),
            uid,
        };
        let data = UdpData {
            header: UdpHeader {
                src_port: src.port(),
                dst_port: dst.port(),
            },
            payload,
        };
        Self::from(Packet::new(header, data))
    }

    #[cfg(test)]
    pub fn new_ipv4_udp_mock() -> Self {
        let unspec = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        Self::new_ipv4_udp(unspec, unspec, 64, 0, Bytes::copy_from_slice(&[0; 64]))
    }

    /// A copy of this packet with a different TTL. The payload is shared, and the uid and all
    /// other header fields are preserved.
    pub fn new_copy_with_ttl(&self, ttl: u8) -> Self {
        let mut packet = Packet::new(self.header, self.data.clone());
        packet.header.ttl = ttl;
        Self::from(packet)
    }
}

impl PartialEq for PacketRc {
    /// Compares the pointer rather than the value of the inner `Packet`.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PacketRc {}

impl From<Packet> for PacketRc {
    fn from(packet: Packet) -> Self {
        Self {
            inner: Arc::new(packet),
        }
    }
}

impl std::ops::Deref for PacketRc {
    type Target = Packet;
    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

/// An IPv4 header plus a UDP datagram. Read-only after creation, apart from the status trail
/// which is only recorded when trace logging is enabled.
#[derive(Debug)]
pub struct Packet {
    header: Ipv4Header,
    data: UdpData,
    statuses: Option<AtomicRefCell<Vec<PacketStatus>>>,
}

impl Packet {
    fn new(header: Ipv4Header, data: UdpData) -> Self {
        let statuses = log::log_enabled!(log::Level::Trace).then(|| AtomicRefCell::new(Vec::new()));
        Self {
            header,
            data,
            statuses,
        }
    }

    pub fn ipv4_header(&self) -> Ipv4Header {
        self.header
    }

    pub fn uid(&self) -> u64 {
        self.header.uid
    }

    pub fn ttl(&self) -> u8 {
        self.header.ttl
    }

    pub fn iana_protocol(&self) -> Option<IanaProtocol> {
        (self.header.protocol == IanaProtocol::Udp.number()).then_some(IanaProtocol::Udp)
    }

    pub fn src_address(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.header.src, self.data.header.src_port)
    }

    pub fn dst_address(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.header.dst, self.data.header.dst_port)
    }

    /// The UDP destination port, if this is a UDP packet.
    pub fn udp_dst_port(&self) -> Option<u16> {
        self.iana_protocol().map(|_| self.data.header.dst_port)
    }

    pub fn payload(&self) -> Bytes {
        self.data.payload.clone()
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        Ipv4Header::LEN + self.data.len()
    }

    pub fn payload_len(&self) -> usize {
        self.data.payload.len()
    }

    pub fn add_status(&self, status: PacketStatus) {
        if log::log_enabled!(log::Level::Trace) {
            if let Some(vec) = self.statuses.as_ref() {
                vec.borrow_mut().push(status);
            }
            log::trace!(
                "[{status:?}] {}->{} uid={} ttl={}",
                self.src_address(),
                self.dst_address(),
                self.header.uid,
                self.header.ttl
            );
        }
    }

    /// The statuses recorded so far. Always empty unless trace logging was enabled when the
    /// packet was created.
    pub fn statuses(&self) -> Vec<PacketStatus> {
        self.statuses
            .as_ref()
            .map(|x| x.borrow().clone())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
struct UdpData {
    header: UdpHeader,
    payload: Bytes,
}

impl UdpData {
    fn len(&self) -> usize {
        UdpHeader::LEN + self.payload.len()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct UdpHeader {
    src_port: u16,
    dst_port: u16,
}

impl UdpHeader {
    // https://en.wikipedia.org/wiki/User_Datagram_Protocol
    const LEN: usize = 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> (SocketAddrV4, SocketAddrV4) {
        (
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 49152),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9),
        )
    }

    #[test]
    fn test_ipv4_udp() {
        let (src, dst) = addrs();
        let payload = Bytes::from_static(b"0123456789");
        let packet = PacketRc::new_ipv4_udp(src, dst, 64, 7, payload.clone());

        assert_eq!(packet.src_address(), src);
        assert_eq!(packet.dst_address(), dst);
        assert_eq!(packet.udp_dst_port(), Some(9));
        assert_eq!(packet.iana_protocol(), Some(IanaProtocol::Udp));
        assert_eq!(packet.uid(), 7);
        assert_eq!(packet.ttl(), 64);
        assert_eq!(packet.payload(), payload);
        assert_eq!(packet.payload_len(), 10);
        assert_eq!(packet.len(), 20 + 8 + 10);

        let header = packet.ipv4_header();
        assert_eq!(header.src, *src.ip());
        assert_eq!(header.dst, *dst.ip());
        assert_eq!(header.protocol, 17);
    }

    #[test]
    fn test_copy_with_ttl_preserves_identity() {
        let (src, dst) = addrs();
        let packet = PacketRc::new_ipv4_udp(src, dst, 64, 99, Bytes::from_static(b"abc"));
        let forwarded = packet.new_copy_with_ttl(63);

        assert_ne!(packet, forwarded);
        assert_eq!(forwarded.ttl(), 63);
        assert_eq!(forwarded.uid(), packet.uid());
        assert_eq!(forwarded.src_address(), packet.src_address());
        assert_eq!(forwarded.dst_address(), packet.dst_address());
        assert_eq!(forwarded.payload(), packet.payload());
        // the original is unchanged
        assert_eq!(packet.ttl(), 64);
    }

    #[test]
    fn test_clones_share_the_packet() {
        let packet = PacketRc::new_ipv4_udp_mock();
        let clone = packet.clone();
        assert_eq!(packet, clone);
        assert_ne!(packet, PacketRc::new_ipv4_udp_mock());
    }
}
