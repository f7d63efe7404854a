use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

pub const PAYLOAD_LEN: usize = 32;
const ICMP_HEADER_LEN: usize = 8;
const PAYLOAD_MAGIC: &[u8; 4] = b"LGEO";

const ICMPV4_ECHO_REQUEST: u8 = 8;
const ICMPV4_ECHO_REPLY: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Unprivileged ping socket; the kernel owns the identifier and checksum.
    Dgram,
    /// Raw socket; needs root or CAP_NET_RAW. IPv4 replies carry the IP header.
    Raw,
}

/// ICMP echo prober bound to one destination.
///
/// Each echo carries a payload tagged with an HMAC under a key private to this
/// prober, and only a reply echoing that exact payload counts.
pub struct IcmpProber {
    socket: Socket,
    kind: SocketKind,
    is_v6: bool,
    ident: u16,
    seq: u16,
    key: [u8; 32],
    recv_buf: [u8; 2048],
    cmsg_buf: [u8; 256],
}

impl IcmpProber {
    pub fn new(addr: SocketAddr) -> io::Result<Self> {
        let is_v6 = addr.is_ipv6();
        let (domain, protocol) = if is_v6 {
            (Domain::IPV6, Protocol::ICMPV6)
        } else {
            (Domain::IPV4, Protocol::ICMPV4)
        };

        let (socket, kind) = match Socket::new(domain, Type::DGRAM, Some(protocol)) {
            Ok(s) => (s, SocketKind::Dgram),
            Err(_) => (Socket::new(domain, Type::RAW, Some(protocol))?, SocketKind::Raw),
        };
        socket.connect(&addr.into())?;

        enable_rx_timestamping(socket.as_raw_fd())?;

        let mut rng = rand::thread_rng();
        let mut key = [0u8; 32];
        rng.fill(&mut key);

        Ok(Self {
            socket,
            kind,
            is_v6,
            ident: rng.gen(),
            seq: 0,
            key,
            recv_buf: [0u8; 2048],
            cmsg_buf: [0u8; 256],
        })
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Sends one echo request and waits up to `timeout` for its reply.
    ///
    /// `Ok(None)` means no matching reply arrived in time.
    pub fn echo(&mut self, timeout: Duration) -> io::Result<Option<f64>> {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        let nonce: u64 = rand::thread_rng().gen();
        let send_realtime_ns = realtime_now_ns();
        let send_mono_ns = monotonic_now_ns();
        let payload = build_payload(seq, send_realtime_ns, nonce, &self.key);
        let msg = build_echo_request(self.is_v6, self.ident, seq, &payload);

        let fd = self.socket.as_raw_fd();
        let send_instant = Instant::now();
        let sent = unsafe { libc::send(fd, msg.as_ptr() as *const _, msg.len(), 0) };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        if sent as usize != msg.len() {
            return Err(io::Error::new(io::ErrorKind::Other, "short send"));
        }

        let deadline = send_instant + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining_ms = (deadline - now)
                .as_millis()
                .clamp(1, i32::MAX as u128) as i32;

            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let rv = unsafe { libc::poll(&mut pfd, 1, remaining_ms) };
            if rv < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if rv == 0 {
                return Ok(None);
            }
            if (pfd.revents & libc::POLLIN) == 0 {
                continue;
            }

            let (n, recv_ns) = self.recv_with_timestamp()?;
            let Some(reply) = parse_echo_reply(&self.recv_buf[..n], self.kind, self.is_v6) else {
                continue;
            };
            if self.kind == SocketKind::Raw && reply.ident != self.ident {
                continue;
            }
            if reply.seq != seq || reply.payload != &payload[..] {
                continue;
            }
            let fallback_rtt_ms = send_instant.elapsed().as_secs_f64() * 1000.0;
            let rtt_ms = recv_ns
                .and_then(|ns| choose_rtt_ms(ns, send_realtime_ns, send_mono_ns))
                .unwrap_or(fallback_rtt_ms);
            return Ok(Some(rtt_ms));
        }
    }

    fn recv_with_timestamp(&mut self) -> io::Result<(usize, Option<u64>)> {
        unsafe {
            let mut iov = libc::iovec {
                iov_base: self.recv_buf.as_mut_ptr() as *mut _,
                iov_len: self.recv_buf.len(),
            };
            let mut hdr: libc::msghdr = std::mem::zeroed();
            hdr.msg_iov = &mut iov;
            hdr.msg_iovlen = 1;
            hdr.msg_control = self.cmsg_buf.as_mut_ptr() as *mut _;
            hdr.msg_controllen = self.cmsg_buf.len() as _;

            let n = libc::recvmsg(self.socket.as_raw_fd(), &mut hdr, 0);
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok((n as usize, recv_timestamp_ns(&hdr)))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct EchoReply<'a> {
    pub ident: u16,
    pub seq: u16,
    pub payload: &'a [u8],
}

pub fn build_payload(seq: u16, send_ns: u64, nonce: u64, key: &[u8]) -> [u8; PAYLOAD_LEN] {
    let mut buf = [0u8; PAYLOAD_LEN];
    buf[0..4].copy_from_slice(PAYLOAD_MAGIC);
    buf[4..6].copy_from_slice(&1u16.to_be_bytes());
    buf[6..8].copy_from_slice(&seq.to_be_bytes());
    buf[8..16].copy_from_slice(&send_ns.to_be_bytes());
    buf[16..24].copy_from_slice(&nonce.to_be_bytes());

    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC key");
    mac.update(&buf[..24]);
    let tag = mac.finalize().into_bytes();
    buf[24..32].copy_from_slice(&tag[..8]);

    buf
}

/// Echo request with the checksum filled in for IPv4. The kernel computes the
/// ICMPv6 checksum itself.
pub fn build_echo_request(is_v6: bool, ident: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(ICMP_HEADER_LEN + payload.len());
    msg.push(if is_v6 { ICMPV6_ECHO_REQUEST } else { ICMPV4_ECHO_REQUEST });
    msg.push(0);
    msg.extend_from_slice(&[0, 0]);
    msg.extend_from_slice(&ident.to_be_bytes());
    msg.extend_from_slice(&seq.to_be_bytes());
    msg.extend_from_slice(payload);
    if !is_v6 {
        let sum = checksum(&msg);
        msg[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    msg
}

/// Internet checksum (RFC 1071).
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += u32::from(word);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

pub fn parse_echo_reply(buf: &[u8], kind: SocketKind, is_v6: bool) -> Option<EchoReply<'_>> {
    let icmp = if kind == SocketKind::Raw && !is_v6 {
        let ihl = usize::from(*buf.first()? & 0x0f) * 4;
        buf.get(ihl..)?
    } else {
        buf
    };
    if icmp.len() < ICMP_HEADER_LEN {
        return None;
    }
    let want = if is_v6 { ICMPV6_ECHO_REPLY } else { ICMPV4_ECHO_REPLY };
    if icmp[0] != want || icmp[1] != 0 {
        return None;
    }
    Some(EchoReply {
        ident: u16::from_be_bytes([icmp[4], icmp[5]]),
        seq: u16::from_be_bytes([icmp[6], icmp[7]]),
        payload: &icmp[ICMP_HEADER_LEN..],
    })
}

pub fn realtime_now_ns() -> u64 {
    unsafe {
        let mut ts: libc::timespec = std::mem::zeroed();
        if libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) != 0 {
            return 0;
        }
        (ts.tv_sec as u64) * 1_000_000_000u64 + (ts.tv_nsec as u64)
    }
}

pub fn monotonic_now_ns() -> u64 {
    unsafe {
        let mut ts: libc::timespec = std::mem::zeroed();
        if libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) != 0 {
            return 0;
        }
        (ts.tv_sec as u64) * 1_000_000_000u64 + (ts.tv_nsec as u64)
    }
}

fn choose_rtt_ms(recv_ns: u64, send_realtime_ns: u64, send_mono_ns: u64) -> Option<f64> {
    const THRESH_NS: u64 = 5_000_000_000;

    let now_realtime = realtime_now_ns();
    if now_realtime > 0 && recv_ns.abs_diff(now_realtime) <= THRESH_NS {
        let diff = recv_ns.saturating_sub(send_realtime_ns);
        let rtt_ms = diff as f64 / 1_000_000.0;
        if rtt_ms.is_finite() && rtt_ms <= 60_000.0 {
            return Some(rtt_ms);
        }
    }

    let now_mono = monotonic_now_ns();
    if now_mono > 0 && recv_ns.abs_diff(now_mono) <= THRESH_NS {
        let diff = recv_ns.saturating_sub(send_mono_ns);
        let rtt_ms = diff as f64 / 1_000_000.0;
        if rtt_ms.is_finite() && rtt_ms <= 60_000.0 {
            return Some(rtt_ms);
        }
    }

    None
}

/// Resolves `host`, preferring an IPv4 address when both families exist.
pub fn resolve_first(host: &str) -> io::Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 0));
    }
    let addrs: Vec<SocketAddr> = (host, 0).to_socket_addrs()?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no resolved addresses"))
}

fn enable_rx_timestamping(fd: RawFd) -> io::Result<()> {
    let on: libc::c_int = 1;
    let rv = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TIMESTAMPNS,
            &on as *const _ as *const _,
            std::mem::size_of_val(&on) as libc::socklen_t,
        )
    };
    if rv != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn recv_timestamp_ns(msg: &libc::msghdr) -> Option<u64> {
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            let cmsg_ref = &*cmsg;
            if cmsg_ref.cmsg_level == libc::SOL_SOCKET
                && cmsg_ref.cmsg_type == libc::SCM_TIMESTAMPNS
            {
                let data = libc::CMSG_DATA(cmsg) as *const libc::timespec;
                if !data.is_null() {
                    let ts = std::ptr::read_unaligned(data);
                    return Some((ts.tv_sec as u64) * 1_000_000_000u64 + (ts.tv_nsec as u64));
                }
            }
            cmsg = libc::CMSG_NXTHDR(msg, cmsg);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn payload_layout_and_tag_depend_on_key() {
        let a = build_payload(3, 42, 99, &TEST_KEY);
        let b = build_payload(3, 42, 99, &[8u8; 32]);
        assert_eq!(&a[0..4], b"LGEO");
        assert_eq!(u16::from_be_bytes([a[6], a[7]]), 3);
        assert_eq!(&a[..24], &b[..24]);
        assert_ne!(&a[24..], &b[24..]);
        assert_eq!(a, build_payload(3, 42, 99, &TEST_KEY));
    }

    #[test]
    fn v4_request_checksums_to_zero() {
        let payload = build_payload(1, 2, 3, &TEST_KEY);
        let msg = build_echo_request(false, 0x1234, 1, &payload);
        assert_eq!(msg[0], ICMPV4_ECHO_REQUEST);
        assert_eq!(msg.len(), ICMP_HEADER_LEN + PAYLOAD_LEN);
        assert_eq!(checksum(&msg), 0);
    }

    #[test]
    fn v6_request_leaves_checksum_to_kernel() {
        let msg = build_echo_request(true, 1, 1, &[0u8; 4]);
        assert_eq!(msg[0], ICMPV6_ECHO_REQUEST);
        assert_eq!(&msg[2..4], &[0, 0]);
    }

    #[test]
    fn checksum_handles_odd_length() {
        // 0x0102 + 0x0300 = 0x0402
        assert_eq!(checksum(&[1, 2, 3]), !0x0402);
    }

    #[test]
    fn parse_dgram_reply() {
        let payload = build_payload(5, 0, 0, &TEST_KEY);
        let mut reply = build_echo_request(false, 77, 5, &payload);
        reply[0] = ICMPV4_ECHO_REPLY;
        let parsed = parse_echo_reply(&reply, SocketKind::Dgram, false).unwrap();
        assert_eq!(parsed.ident, 77);
        assert_eq!(parsed.seq, 5);
        assert_eq!(parsed.payload, &payload[..]);
    }

    #[test]
    fn parse_raw_v4_reply_skips_ip_header() {
        let payload = build_payload(9, 0, 0, &TEST_KEY);
        let mut icmp = build_echo_request(false, 1, 9, &payload);
        icmp[0] = ICMPV4_ECHO_REPLY;
        let mut packet = vec![0x45u8];
        packet.extend_from_slice(&[0u8; 19]);
        packet.extend_from_slice(&icmp);
        let parsed = parse_echo_reply(&packet, SocketKind::Raw, false).unwrap();
        assert_eq!(parsed.seq, 9);
        assert_eq!(parsed.payload, &payload[..]);
    }

    #[test]
    fn parse_rejects_requests_and_short_packets() {
        let request = build_echo_request(false, 1, 1, &[0u8; 8]);
        assert!(parse_echo_reply(&request, SocketKind::Dgram, false).is_none());
        assert!(parse_echo_reply(&[0u8; 4], SocketKind::Dgram, false).is_none());
        assert!(parse_echo_reply(&[], SocketKind::Raw, false).is_none());
    }

    #[test]
    fn parse_v6_reply_type() {
        let mut reply = build_echo_request(true, 1, 2, &[1, 2, 3]);
        reply[0] = ICMPV6_ECHO_REPLY;
        let parsed = parse_echo_reply(&reply, SocketKind::Raw, true).unwrap();
        assert_eq!(parsed.payload, &[1, 2, 3]);
    }

    #[test]
    fn resolve_literal_skips_dns() {
        let addr = resolve_first("192.0.2.7").unwrap();
        assert_eq!(addr.ip().to_string(), "192.0.2.7");
    }
}
