use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use crate::metadata::{MetadataRecord, ProtoCode};

/// Reduces one captured frame to its metadata tuple.
///
/// Returns `None` for anything outside the IPv4 stack, including frames too
/// mangled to slice. TCP frames classify on flags with SYN taking precedence
/// over FIN over RST; an IPv4 payload that is neither TCP nor UDP lands in
/// `Unknown`.
pub fn decode_frame(data: &[u8], timestamp: f64) -> Option<MetadataRecord> {
    let sliced = SlicedPacket::from_ethernet(data).ok()?;

    let ipv4 = match &sliced.net {
        Some(NetSlice::Ipv4(slice)) => slice,
        _ => return None,
    };
    let header = ipv4.header();
    let src_addr = u32::from(header.source_addr());
    let pkt_len = header.total_len();

    let proto = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            if tcp.syn() {
                ProtoCode::TcpSyn
            } else if tcp.fin() {
                ProtoCode::TcpFin
            } else if tcp.rst() {
                ProtoCode::TcpRst
            } else {
                ProtoCode::TcpOther
            }
        }
        Some(TransportSlice::Udp(_)) => ProtoCode::Udp,
        _ => ProtoCode::Unknown,
    };

    Some(MetadataRecord::new(src_addr, proto, pkt_len, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    const SRC_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
    const DST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 2];
    const SRC_IP: [u8; 4] = [10, 0, 0, 7];
    const DST_IP: [u8; 4] = [10, 0, 0, 9];

    fn tcp_frame(payload: &[u8], set: impl FnOnce(TcpStep) -> TcpStep) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4(SRC_IP, DST_IP, 64)
            .tcp(40000, 80, 1, 8192);
        let builder = set(builder);
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).expect("build tcp frame");
        out
    }

    type TcpStep = etherparse::PacketBuilderStep<etherparse::TcpHeader>;

    #[test]
    fn single_syn_frame_yields_one_record() {
        // IPv4 total length 60 = 20 (IP) + 20 (TCP) + 20 payload bytes.
        let frame = tcp_frame(&[0u8; 20], |b| b.syn());
        let rec = decode_frame(&frame, 1.0).expect("ipv4 frame decodes");

        assert_eq!(rec.src_addr, u32::from_be_bytes(SRC_IP));
        assert_eq!(rec.proto, ProtoCode::TcpSyn);
        assert_eq!(rec.pkt_len, 60);
        assert!((rec.timestamp - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tcp_flag_precedence() {
        let syn = tcp_frame(&[], |b| b.syn());
        let fin = tcp_frame(&[], |b| b.fin());
        let rst = tcp_frame(&[], |b| b.rst());
        let ack = tcp_frame(&[], |b| b.ack(7));

        assert_eq!(decode_frame(&syn, 0.0).map(|r| r.proto), Some(ProtoCode::TcpSyn));
        assert_eq!(decode_frame(&fin, 0.0).map(|r| r.proto), Some(ProtoCode::TcpFin));
        assert_eq!(decode_frame(&rst, 0.0).map(|r| r.proto), Some(ProtoCode::TcpRst));
        assert_eq!(decode_frame(&ack, 0.0).map(|r| r.proto), Some(ProtoCode::TcpOther));
    }

    #[test]
    fn udp_frame_classifies_as_udp() {
        let builder =
            PacketBuilder::ethernet2(SRC_MAC, DST_MAC).ipv4(SRC_IP, DST_IP, 64).udp(5353, 53);
        let mut frame = Vec::with_capacity(builder.size(4));
        builder.write(&mut frame, &[1, 2, 3, 4]).expect("build udp frame");

        let rec = decode_frame(&frame, 0.5).expect("ipv4 frame decodes");
        assert_eq!(rec.proto, ProtoCode::Udp);
        assert_eq!(rec.pkt_len, 20 + 8 + 4);
    }

    #[test]
    fn icmp_lands_in_unknown() {
        // The classifier only separates TCP and UDP; everything else in the
        // IPv4 stack keeps the Unknown tag.
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4(SRC_IP, DST_IP, 64)
            .icmpv4_echo_request(1, 1);
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).expect("build icmp frame");

        let rec = decode_frame(&frame, 0.0).expect("ipv4 frame decodes");
        assert_eq!(rec.proto, ProtoCode::Unknown);
    }

    #[test]
    fn non_ipv4_frame_is_discarded() {
        // An ARP ethertype never reaches the metadata stage.
        let mut frame = Vec::new();
        frame.extend_from_slice(&DST_MAC);
        frame.extend_from_slice(&SRC_MAC);
        frame.extend_from_slice(&[0x08, 0x06]);
        frame.extend_from_slice(&[0u8; 28]);

        assert!(decode_frame(&frame, 0.0).is_none());
    }

    #[test]
    fn truncated_frame_is_discarded() {
        let frame = tcp_frame(&[], |b| b.syn());
        assert!(decode_frame(&frame[..20], 0.0).is_none());
    }
}
