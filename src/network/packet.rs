//! TCP header codec, checksum arithmetic and SYN probe construction

use super::{FLAG_ACK, FLAG_RST, FLAG_SYN};
use crate::error::ScanError;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use std::net::Ipv4Addr;

/// On-wire TCP header size; no options are ever emitted
pub const TCP_HEADER_LEN: usize = 20;

/// IPv4 header size with IHL = 5
pub const IP_HEADER_LEN: usize = 20;

/// Advertised receive window on outgoing probes
const SYN_WINDOW: u16 = 64240;

/// A 20-byte TCP header, serialized big-endian
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub data_offset: u8,
    pub flags: u8,
    pub window: u16,
    pub checksum: u16,
    pub urg_ptr: u16,
}

impl TcpHeader {
    /// Header for an outgoing SYN probe; checksum left at zero until
    /// the endpoints are known.
    pub fn syn(src_port: u16, dst_port: u16, seq: u32) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack: 0,
            data_offset: 5,
            flags: FLAG_SYN,
            window: SYN_WINDOW,
            checksum: 0,
            urg_ptr: 0,
        }
    }

    /// Serialize in network byte order. The data offset occupies the high
    /// nibble of byte 12; the reserved bits stay zero.
    pub fn to_bytes(&self) -> [u8; TCP_HEADER_LEN] {
        let mut buf = [0u8; TCP_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack.to_be_bytes());
        buf[12] = self.data_offset << 4;
        buf[13] = self.flags;
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        buf[18..20].copy_from_slice(&self.urg_ptr.to_be_bytes());
        buf
    }

    /// Parse the leading 20 bytes of a TCP segment.
    pub fn parse(segment: &[u8]) -> crate::Result<Self> {
        if segment.len() < TCP_HEADER_LEN {
            return Err(ScanError::ShortSegment);
        }
        Ok(Self {
            src_port: u16::from_be_bytes([segment[0], segment[1]]),
            dst_port: u16::from_be_bytes([segment[2], segment[3]]),
            seq: u32::from_be_bytes([segment[4], segment[5], segment[6], segment[7]]),
            ack: u32::from_be_bytes([segment[8], segment[9], segment[10], segment[11]]),
            data_offset: segment[12] >> 4,
            flags: segment[13],
            window: u16::from_be_bytes([segment[14], segment[15]]),
            checksum: u16::from_be_bytes([segment[16], segment[17]]),
            urg_ptr: u16::from_be_bytes([segment[18], segment[19]]),
        })
    }

    pub fn is_syn_ack(&self) -> bool {
        self.flags & (FLAG_SYN | FLAG_ACK) == (FLAG_SYN | FLAG_ACK)
    }

    pub fn is_rst(&self) -> bool {
        self.flags & FLAG_RST != 0
    }

    /// Compute and store the checksum for the given endpoints.
    pub fn fill_checksum(&mut self, src: Ipv4Addr, dst: Ipv4Addr) {
        self.checksum = 0;
        self.checksum = tcp_checksum(src, dst, &self.to_bytes());
    }
}

/// One's-complement checksum over the IPv4 pseudo-header and a TCP
/// segment whose checksum field is zeroed.
///
/// The pseudo-header is `src(4) | dst(4) | 0 | 6 | tcp_length(2)`. A
/// segment carrying a correct checksum sums to 0xFFFF, so this returns 0
/// for it.
pub fn tcp_checksum(src: Ipv4Addr, dst: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src.octets());
    pseudo[4..8].copy_from_slice(&dst.octets());
    pseudo[9] = 6; // TCP protocol number
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());

    let sum = sum_be_words(segment, sum_be_words(&pseudo, 0));
    fold_complement(sum)
}

/// Accumulate big-endian 16-bit words; an odd trailing byte is padded
/// with zero on the right.
fn sum_be_words(buf: &[u8], mut acc: u32) -> u32 {
    let mut chunks = buf.chunks_exact(2);
    for chunk in &mut chunks {
        acc += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        acc += u32::from(*last) << 8;
    }
    acc
}

/// Fold the carries into the low 16 bits and complement. The first fold
/// can itself produce a carry, hence the second add.
fn fold_complement(mut sum: u32) -> u16 {
    sum = (sum >> 16) + (sum & 0xffff);
    sum += sum >> 16;
    !(sum as u16)
}

/// Build a complete 40-byte IPv4+TCP SYN probe.
pub fn build_syn_probe(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ip_id: u16,
) -> Vec<u8> {
    let mut header = TcpHeader::syn(src_port, dst_port, seq);
    header.fill_checksum(src_ip, dst_ip);

    let mut buf = vec![0u8; IP_HEADER_LEN + TCP_HEADER_LEN];
    {
        // Buffer is exactly one header long, so construction cannot fail.
        let mut ip = MutableIpv4Packet::new(&mut buf[..IP_HEADER_LEN]).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length((IP_HEADER_LEN + TCP_HEADER_LEN) as u16);
        ip.set_identification(ip_id);
        ip.set_ttl(64);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
        ip.set_source(src_ip);
        ip.set_destination(dst_ip);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }
    buf[IP_HEADER_LEN..].copy_from_slice(&header.to_bytes());
    buf
}

/// A TCP segment attributed to the host that sent it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpReply {
    pub source: Ipv4Addr,
    pub header: TcpHeader,
}

/// Parse an inbound IPv4 datagram into the TCP reply it carries.
///
/// Non-TCP payloads and segments shorter than a header are skipped with
/// `None`; deciding what a reply means is the receiver's business.
pub fn parse_reply(datagram: &[u8]) -> Option<TcpReply> {
    let ip = Ipv4Packet::new(datagram)?;
    if ip.get_version() != 4 || ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < IP_HEADER_LEN || datagram.len() < header_len {
        return None;
    }
    let header = TcpHeader::parse(&datagram[header_len..]).ok()?;
    Some(TcpReply {
        source: ip.get_source(),
        header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    #[test]
    fn serialize_parse_symmetry() {
        let mut header = TcpHeader::syn(40123, 443, 0xdeadbeef);
        header.fill_checksum(SRC, DST);
        let parsed = TcpHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn short_segment_is_rejected() {
        assert!(matches!(
            TcpHeader::parse(&[0u8; 19]),
            Err(ScanError::ShortSegment)
        ));
    }

    #[test]
    fn flag_predicates() {
        let mut header = TcpHeader::syn(1024, 80, 0);
        assert!(!header.is_syn_ack());
        assert!(!header.is_rst());

        header.flags = FLAG_SYN | FLAG_ACK;
        assert!(header.is_syn_ack());

        header.flags = FLAG_RST | FLAG_ACK;
        assert!(header.is_rst());
        assert!(!header.is_syn_ack());
    }

    #[test]
    fn rfc1071_worked_example() {
        // Words 0001 f203 f4f5 f6f7 sum to 2ddf0; folding gives ddf2 and
        // the checksum is its complement, 220d.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        let sum = sum_be_words(&data, 0);
        assert_eq!(sum, 0x2ddf0);
        assert_eq!(fold_complement(sum), 0x220d);
    }

    #[test]
    fn checksum_is_a_right_inverse() {
        for (src_port, seq) in [(1024u16, 0u32), (40000, 0xffff_ffff), (65535, 12345)] {
            let mut header = TcpHeader::syn(src_port, 80, seq);
            header.fill_checksum(SRC, DST);

            let mut zeroed = header.to_bytes();
            zeroed[16] = 0;
            zeroed[17] = 0;
            assert_eq!(tcp_checksum(SRC, DST, &zeroed), header.checksum);
        }
    }

    #[test]
    fn correct_segment_verifies_to_zero() {
        let mut header = TcpHeader::syn(50000, 22, 7);
        header.fill_checksum(SRC, DST);
        // With the checksum in place the one's-complement sum is 0xffff,
        // so recomputing yields 0.
        assert_eq!(tcp_checksum(SRC, DST, &header.to_bytes()), 0);
    }

    #[test]
    fn double_fold_handles_the_second_carry() {
        // 0x1ffff folds to 0x10000, which needs the second fold.
        assert_eq!(fold_complement(0x1ffff), !1u16);
    }

    #[test]
    fn probe_layout() {
        let probe = build_syn_probe(SRC, DST, 41000, 8080, 99, 7);
        assert_eq!(probe.len(), 40);

        let ip = Ipv4Packet::new(&probe).unwrap();
        assert_eq!(ip.get_version(), 4);
        assert_eq!(ip.get_header_length(), 5);
        assert_eq!(ip.get_total_length(), 40);
        assert_eq!(ip.get_ttl(), 64);
        assert_eq!(ip.get_next_level_protocol(), IpNextHeaderProtocols::Tcp);
        assert_eq!(ip.get_source(), SRC);
        assert_eq!(ip.get_destination(), DST);

        let tcp = TcpHeader::parse(&probe[IP_HEADER_LEN..]).unwrap();
        assert_eq!(tcp.src_port, 41000);
        assert_eq!(tcp.dst_port, 8080);
        assert_eq!(tcp.flags, FLAG_SYN);
        assert_eq!(tcp.data_offset, 5);
        assert_eq!(tcp.window, SYN_WINDOW);
    }

    fn reply_with_flags(flags: u8) -> Vec<u8> {
        let mut datagram = build_syn_probe(DST, SRC, 443, 40123, 1, 1);
        datagram[IP_HEADER_LEN + 13] = flags;
        datagram
    }

    #[test]
    fn reply_is_attributed_to_its_sender() {
        let datagram = reply_with_flags(FLAG_SYN | FLAG_ACK);
        let reply = parse_reply(&datagram).unwrap();
        assert_eq!(reply.source, DST);
        assert_eq!(reply.header.src_port, 443);
        assert!(reply.header.is_syn_ack());
    }

    #[test]
    fn reply_flags_survive_parsing() {
        let rst = parse_reply(&reply_with_flags(FLAG_RST | FLAG_ACK)).unwrap();
        assert!(rst.header.is_rst());
        assert!(!rst.header.is_syn_ack());

        // Only the SYN+ACK mask matters to callers; ECE alongside is fine.
        let ece = parse_reply(&reply_with_flags(FLAG_SYN | FLAG_ACK | 0x40)).unwrap();
        assert!(ece.header.is_syn_ack());
    }

    #[test]
    fn truncated_datagrams_are_skipped() {
        let datagram = reply_with_flags(FLAG_SYN | FLAG_ACK);
        assert!(parse_reply(&datagram[..IP_HEADER_LEN + 10]).is_none());
        assert!(parse_reply(&datagram[..12]).is_none());
        assert!(parse_reply(&[]).is_none());
    }
}
