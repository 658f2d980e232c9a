use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::collectors::record::{truncate_info, ClassifiedRecord, Draft, RawDump};
use crate::collectors::sanitize::sanitize;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;

const IPPROTO_HOPOPTS: u8 = 0;
const IPPROTO_ICMP: u8 = 1;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const IPPROTO_ROUTING: u8 = 43;
const IPPROTO_FRAGMENT: u8 = 44;
const IPPROTO_ICMPV6: u8 = 58;
const IPPROTO_DSTOPTS: u8 = 60;

/// Data-link framing of a capture, which decides where the network layer
/// starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Linux "cooked" capture, what the `any` pseudo-device produces.
    LinuxSll,
    LinuxSll2,
    RawIp,
    /// BSD loopback: a 4-byte address family in host byte order.
    Null,
    Unknown(i32),
}

impl LinkLayer {
    /// Maps a pcap `LINKTYPE_*`/`DLT_*` value.
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => LinkLayer::Ethernet,
            113 => LinkLayer::LinuxSll,
            276 => LinkLayer::LinuxSll2,
            12 | 14 | 101 | 228 | 229 => LinkLayer::RawIp,
            0 | 108 => LinkLayer::Null,
            other => LinkLayer::Unknown(other),
        }
    }
}

/// Capture timestamp as delivered by pcap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime {
    pub secs: i64,
    pub micros: i64,
}

impl CaptureTime {
    /// A zero timeval means the frame carried no timestamp.
    pub fn from_timeval(secs: i64, micros: i64) -> Option<Self> {
        if secs == 0 && micros == 0 {
            None
        } else {
            Some(Self { secs, micros })
        }
    }

    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            secs: now.timestamp(),
            micros: now.timestamp_subsec_micros() as i64,
        }
    }
}

/// Epoch seconds with microsecond precision, e.g. `1699999999.123456`.
impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

/// One captured frame, borrowed from the capture handle for the duration of
/// classification.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub data: &'a [u8],
    pub time: Option<CaptureTime>,
    pub link: LinkLayer,
}

// Layer name and the number of bytes it spans.
type Layer = (&'static str, usize);

enum Transport<'a> {
    Matched,
    Payload(&'a [u8]),
    Unmatched,
}

/// Decodes a frame into its display record. Never fails: frames that cannot
/// be decoded degrade to a summary of whatever layers were recognised.
pub fn classify(frame: &RawFrame<'_>) -> ClassifiedRecord {
    let mut layers: Vec<Layer> = Vec::new();
    let mut draft = Draft {
        timestamp: frame.time.map(|t| t.to_string()).unwrap_or_default(),
        ..Draft::default()
    };
    let mut transport = Transport::Unmatched;

    if let Some((ethertype, net)) = strip_link(frame.link, frame.data, &mut layers) {
        match ethertype {
            ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => {
                let header = if ethertype == ETHERTYPE_IPV4 {
                    decode_ipv4(net)
                } else {
                    decode_ipv6(net)
                };
                match header {
                    Some(ip) => {
                        layers.push((ip.layer, ip.header_len));
                        draft.source = ip.src;
                        draft.destination = ip.dst;
                        draft.protocol = ip_protocol_name(ip.protocol);
                        transport = match ip.fragment_offset {
                            Some(offset) => {
                                layers.push(("Fragment", ip.payload.len()));
                                draft.info = format!(
                                    "fragment offset={} len={}",
                                    offset,
                                    ip.payload.len()
                                );
                                Transport::Unmatched
                            }
                            None => classify_transport(
                                ip.transport,
                                ip.payload,
                                &mut draft,
                                &mut layers,
                            ),
                        };
                    }
                    None => decode_failure(net, &mut layers),
                }
            }
            ETHERTYPE_ARP => match decode_arp(net) {
                Some(arp) => {
                    layers.push(("ARP", arp.len));
                    draft.source = arp.src;
                    draft.destination = arp.dst;
                    draft.protocol = "ARP".into();
                    draft.info = arp.info;
                }
                None => decode_failure(net, &mut layers),
            },
            _ if !net.is_empty() => {
                layers.push(("Payload", net.len()));
                transport = Transport::Payload(net);
            }
            _ => {}
        }
    }

    if let Transport::Payload(payload) = transport {
        draft.protocol = "APP".into();
        // Escape-only payloads sanitize to nothing and take the summary below.
        draft.info = truncate_info(&sanitize(&String::from_utf8_lossy(payload)));
    }

    if draft.protocol.is_empty() && !layers.is_empty() {
        draft.protocol = layers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join("/");
    }
    if draft.info.is_empty() {
        draft.info = truncate_info(&frame_summary(frame.data.len(), &layers));
    }

    draft.fill_defaults(|| CaptureTime::now().to_string());
    draft.freeze(RawDump::Frame(frame.data))
}

// ── Link layer ──────────────────────────────────────────────

/// Strips the link header and returns the ethertype of what follows. An
/// ethertype of 0 stands for "unknown network protocol".
fn strip_link<'a>(
    link: LinkLayer,
    data: &'a [u8],
    layers: &mut Vec<Layer>,
) -> Option<(u16, &'a [u8])> {
    match link {
        LinkLayer::Ethernet => {
            if data.len() < 14 {
                decode_failure(data, layers);
                return None;
            }
            layers.push(("Ethernet", 14));
            let mut ethertype = be16(data, 12);
            let mut rest = &data[14..];
            while (ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ) && rest.len() >= 4 {
                layers.push(("Dot1Q", 4));
                ethertype = be16(rest, 2);
                rest = &rest[4..];
            }
            Some((ethertype, rest))
        }
        LinkLayer::LinuxSll => {
            if data.len() < 16 {
                decode_failure(data, layers);
                return None;
            }
            layers.push(("LinuxSLL", 16));
            Some((be16(data, 14), &data[16..]))
        }
        LinkLayer::LinuxSll2 => {
            if data.len() < 20 {
                decode_failure(data, layers);
                return None;
            }
            layers.push(("LinuxSLL2", 20));
            Some((be16(data, 0), &data[20..]))
        }
        LinkLayer::RawIp => {
            let ethertype = match data.first().map(|b| b >> 4) {
                Some(4) => ETHERTYPE_IPV4,
                Some(6) => ETHERTYPE_IPV6,
                _ => 0,
            };
            Some((ethertype, data))
        }
        LinkLayer::Null => {
            if data.len() < 4 {
                decode_failure(data, layers);
                return None;
            }
            layers.push(("Loopback", 4));
            let mut family = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            if family > 0xffff {
                family = family.swap_bytes();
            }
            let ethertype = match family {
                2 => ETHERTYPE_IPV4,
                24 | 28 | 30 => ETHERTYPE_IPV6,
                _ => 0,
            };
            Some((ethertype, &data[4..]))
        }
        LinkLayer::Unknown(_) => Some((0, data)),
    }
}

// ── Network layer ───────────────────────────────────────────

struct IpHeader<'a> {
    layer: &'static str,
    src: String,
    dst: String,
    /// Protocol named by the fixed header (IPv6: first next-header).
    protocol: u8,
    /// Protocol of `payload` once extension headers are skipped.
    transport: u8,
    header_len: usize,
    fragment_offset: Option<u16>,
    payload: &'a [u8],
}

fn decode_ipv4(data: &[u8]) -> Option<IpHeader<'_>> {
    if data.len() < 20 || data[0] >> 4 != 4 {
        return None;
    }
    let ihl = ((data[0] & 0x0F) as usize) * 4;
    if ihl < 20 || data.len() < ihl {
        return None;
    }
    // Total length bounds the payload so Ethernet padding is not counted.
    // Zero happens with segmentation offload; trust the capture then.
    let total_len = be16(data, 2) as usize;
    let end = if total_len >= ihl { total_len.min(data.len()) } else { data.len() };
    let frag = be16(data, 6) & 0x1FFF;
    let protocol = data[9];

    Some(IpHeader {
        layer: "IPv4",
        src: Ipv4Addr::new(data[12], data[13], data[14], data[15]).to_string(),
        dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]).to_string(),
        protocol,
        transport: protocol,
        header_len: ihl,
        fragment_offset: (frag != 0).then_some(frag * 8),
        payload: &data[ihl..end],
    })
}

fn decode_ipv6(data: &[u8]) -> Option<IpHeader<'_>> {
    if data.len() < 40 || data[0] >> 4 != 6 {
        return None;
    }
    let payload_len = be16(data, 4) as usize;
    let end = if payload_len == 0 { data.len() } else { (40 + payload_len).min(data.len()) };
    let src: [u8; 16] = data[8..24].try_into().ok()?;
    let dst: [u8; 16] = data[24..40].try_into().ok()?;
    let protocol = data[6];

    let mut next = protocol;
    let mut offset = 40;
    let mut fragment_offset = None;
    loop {
        match next {
            IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_DSTOPTS if offset + 8 <= end => {
                let ext_len = (data[offset + 1] as usize + 1) * 8;
                next = data[offset];
                offset = (offset + ext_len).min(end);
            }
            IPPROTO_FRAGMENT if offset + 8 <= end => {
                let frag = be16(data, offset + 2) >> 3;
                next = data[offset];
                offset += 8;
                if frag != 0 {
                    fragment_offset = Some(frag * 8);
                }
                break;
            }
            _ => break,
        }
    }

    Some(IpHeader {
        layer: "IPv6",
        src: Ipv6Addr::from(src).to_string(),
        dst: Ipv6Addr::from(dst).to_string(),
        protocol,
        transport: next,
        header_len: offset,
        fragment_offset,
        payload: &data[offset..end],
    })
}

struct ArpPacket {
    src: String,
    dst: String,
    info: String,
    len: usize,
}

fn decode_arp(data: &[u8]) -> Option<ArpPacket> {
    if data.len() < 8 {
        return None;
    }
    let hlen = data[4] as usize;
    let plen = data[5] as usize;
    let op = be16(data, 6);
    let len = 8 + 2 * (hlen + plen);
    if data.len() < len {
        return None;
    }
    let sha = &data[8..8 + hlen];
    let spa = &data[8 + hlen..8 + hlen + plen];
    let tha = &data[8 + hlen + plen..8 + 2 * hlen + plen];
    let tpa = &data[8 + 2 * hlen + plen..len];

    // Protocol addresses win over hardware addresses when present.
    let (src, dst) = if plen >= 4 {
        (format_proto_addr(spa), format_proto_addr(tpa))
    } else {
        (format_mac(sha), format_mac(tha))
    };
    let info = match op {
        1 => format!("who-has {} tell {}", dst, src),
        2 => format!("{} is-at {}", src, format_mac(sha)),
        _ => format!("op={}", op),
    };
    Some(ArpPacket { src, dst, info, len })
}

// ── Transport layer ─────────────────────────────────────────

fn classify_transport<'a>(
    proto: u8,
    data: &'a [u8],
    draft: &mut Draft,
    layers: &mut Vec<Layer>,
) -> Transport<'a> {
    match proto {
        IPPROTO_TCP => {
            if data.len() < 20 {
                decode_failure(data, layers);
                return Transport::Unmatched;
            }
            let data_offset = ((data[12] >> 4) as usize) * 4;
            if data_offset < 20 || data_offset > data.len() {
                decode_failure(data, layers);
                return Transport::Unmatched;
            }
            let payload_len = data.len() - data_offset;
            layers.push(("TCP", data_offset));
            if payload_len > 0 {
                layers.push(("Payload", payload_len));
            }
            attach_ports(draft, be16(data, 0), be16(data, 2));
            draft.protocol = "TCP".into();
            draft.info = format!("flags={} len={}", tcp_flag_names(data[13]), payload_len);
            Transport::Matched
        }
        IPPROTO_UDP => {
            if data.len() < 8 {
                decode_failure(data, layers);
                return Transport::Unmatched;
            }
            let udp_len = be16(data, 4) as usize;
            let end = if udp_len >= 8 { udp_len.min(data.len()) } else { data.len() };
            let payload_len = end - 8;
            layers.push(("UDP", 8));
            if payload_len > 0 {
                layers.push(("Payload", payload_len));
            }
            attach_ports(draft, be16(data, 0), be16(data, 2));
            draft.protocol = "UDP".into();
            draft.info = format!("len={}", payload_len);
            Transport::Matched
        }
        IPPROTO_ICMP if data.len() >= 4 => {
            layers.push(("ICMPv4", data.len()));
            draft.protocol = "ICMPv4".into();
            draft.info = format!("type={} code={}", data[0], data[1]);
            Transport::Matched
        }
        IPPROTO_ICMPV6 if data.len() >= 4 => {
            layers.push(("ICMPv6", data.len()));
            draft.protocol = "ICMPv6".into();
            draft.info = "icmpv6".into();
            Transport::Matched
        }
        IPPROTO_ICMP | IPPROTO_ICMPV6 => {
            decode_failure(data, layers);
            Transport::Unmatched
        }
        _ if !data.is_empty() => {
            layers.push(("Payload", data.len()));
            Transport::Payload(data)
        }
        _ => Transport::Unmatched,
    }
}

fn attach_ports(draft: &mut Draft, src_port: u16, dst_port: u16) {
    if !draft.source.is_empty() && !draft.destination.is_empty() {
        draft.source = format!("{}:{}", draft.source, src_port);
        draft.destination = format!("{}:{}", draft.destination, dst_port);
    } else {
        draft.source = src_port.to_string();
        draft.destination = dst_port.to_string();
    }
}

/// Set TCP flags joined by `|`, or `-` when none is set.
pub fn tcp_flag_names(flags: u8) -> String {
    const NAMES: [(u8, &str); 8] = [
        (0x02, "SYN"),
        (0x10, "ACK"),
        (0x01, "FIN"),
        (0x04, "RST"),
        (0x08, "PSH"),
        (0x20, "URG"),
        (0x40, "ECE"),
        (0x80, "CWR"),
    ];
    let set: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if set.is_empty() { "-".into() } else { set.join("|") }
}

// ── Helpers ─────────────────────────────────────────────────

fn decode_failure(data: &[u8], layers: &mut Vec<Layer>) {
    if !data.is_empty() {
        layers.push(("DecodeFailure", data.len()));
    }
}

fn frame_summary(total: usize, layers: &[Layer]) -> String {
    if layers.is_empty() {
        return format!("{} bytes", total);
    }
    let parts: Vec<String> = layers
        .iter()
        .map(|(name, len)| format!("{}({})", name, len))
        .collect();
    format!("{} bytes: {}", total, parts.join(" "))
}

fn be16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn format_mac(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
}

fn format_proto_addr(bytes: &[u8]) -> String {
    match <[u8; 16]>::try_from(bytes) {
        Ok(v6) => Ipv6Addr::from(v6).to_string(),
        Err(_) => Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string(),
    }
}

fn ip_protocol_name(proto: u8) -> String {
    match proto {
        0 => "HopByHop".into(),
        1 => "ICMP".into(),
        2 => "IGMP".into(),
        6 => "TCP".into(),
        17 => "UDP".into(),
        41 => "IPv6-encap".into(),
        43 => "IPv6-Route".into(),
        44 => "IPv6-Frag".into(),
        47 => "GRE".into(),
        50 => "ESP".into(),
        51 => "AH".into(),
        58 => "ICMPv6".into(),
        59 => "NoNext".into(),
        60 => "IPv6-Opts".into(),
        89 => "OSPF".into(),
        132 => "SCTP".into(),
        _ => format!("Proto({})", proto),
    }
}
