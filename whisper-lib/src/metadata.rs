/// Protocol classification of one parsed frame.
///
/// Each tag carries a fixed integer weight consumed by the flow encoder
/// (`weight() / 10` enters the per-packet scalar). SYN and RST share a
/// weight on purpose: both mark connection-state churn and the encoder
/// treats them as the same signal class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtoCode {
    TcpSyn,
    TcpFin,
    TcpRst,
    TcpOther,
    Udp,
    Icmp,
    Igmp,
    #[default]
    Unknown,
}

impl ProtoCode {
    /// Encoder weight of this protocol class.
    pub fn weight(self) -> u16 {
        match self {
            ProtoCode::TcpSyn => 1,
            ProtoCode::TcpFin => 40,
            ProtoCode::TcpRst => 1,
            ProtoCode::TcpOther => 1000,
            ProtoCode::Udp => 3,
            ProtoCode::Icmp => 10,
            ProtoCode::Igmp => 9,
            ProtoCode::Unknown => 10,
        }
    }
}

/// Fixed-size per-packet tuple shared between the parser and analyzer stages.
///
/// Produced by exactly one parser, consumed by exactly one analyzer. Only
/// IPv4 frames ever become a record; everything else is discarded at decode
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetadataRecord {
    /// IPv4 source address, host byte order. The aggregation key.
    pub src_addr: u32,
    /// Protocol class of the frame.
    pub proto: ProtoCode,
    /// IPv4 total length in bytes.
    pub pkt_len: u16,
    /// Capture timestamp in seconds. Rewritten in place to an inter-arrival
    /// delta during analysis.
    pub timestamp: f64,
}

impl MetadataRecord {
    pub fn new(src_addr: u32, proto: ProtoCode, pkt_len: u16, timestamp: f64) -> Self {
        Self { src_addr, proto, pkt_len, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syn_and_rst_share_a_weight() {
        // Connection churn classes are deliberately indistinguishable to the
        // encoder; this pins the weight table down.
        assert_eq!(ProtoCode::TcpSyn.weight(), ProtoCode::TcpRst.weight());
        assert_eq!(ProtoCode::TcpSyn.weight(), 1);
        assert_eq!(ProtoCode::TcpFin.weight(), 40);
        assert_eq!(ProtoCode::TcpOther.weight(), 1000);
        assert_eq!(ProtoCode::Udp.weight(), 3);
        assert_eq!(ProtoCode::Icmp.weight(), 10);
        assert_eq!(ProtoCode::Igmp.weight(), 9);
        assert_eq!(ProtoCode::Unknown.weight(), 10);
    }
}
