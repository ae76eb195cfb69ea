/*! UDP multi-packet source.

Binds a datagram socket (joining a multicast group when the configured
address calls for one) and receives datagrams in batches with a single
`recvmmsg(2)` call per `process()`. Receive buffers are pre-allocated
in message groups kept topped up by a dedicated filler thread, so the
hot path never allocates; a group that fails to receive is simply
dropped and replaced.

Emits each batch downstream as a byte-vector-of-byte-vectors with a
wall-clock timestamp.
*/
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::component::{Component, PropertyValue, Retval};
use crate::port::{InputPort, OutputPort, Timestamp, channel};
use crate::{Error, Result};

const DEFAULT_RECV_BUF_SIZE: u32 = 0xFFFF;

/// Ring of pre-allocated message groups shared with the filler thread.
struct Ring {
    queue: Mutex<VecDeque<Vec<Vec<u8>>>>,
    cv: Condvar,
    target: usize,
    num_msgs: usize,
    msg_size: usize,
}

impl Ring {
    fn new_group(&self) -> Vec<Vec<u8>> {
        (0..self.num_msgs)
            .map(|_| vec![0xFF; self.msg_size])
            .collect()
    }
}

/// Resolve an interface name (e.g. `"eth0"`) to its IPv4 address via
/// the `SIOCGIFADDR` ioctl.
fn interface_ip(fd: i32, interface: &str) -> Option<Ipv4Addr> {
    if interface.is_empty() {
        return None;
    }
    // SAFETY: ifreq is zeroed, the copied name fits with a trailing NUL,
    // and the ioctl only writes within the struct.
    unsafe {
        let mut ifr: libc::ifreq = std::mem::zeroed();
        let name = interface.as_bytes();
        if name.len() >= ifr.ifr_name.len() {
            return None;
        }
        for (dst, &src) in ifr.ifr_name.iter_mut().zip(name) {
            *dst = src as libc::c_char;
        }
        if libc::ioctl(fd, libc::SIOCGIFADDR, &mut ifr) == -1 {
            return None;
        }
        let addr = &ifr.ifr_ifru.ifru_addr as *const libc::sockaddr as *const libc::sockaddr_in;
        Some(Ipv4Addr::from(u32::from_be((*addr).sin_addr.s_addr)))
    }
}

/// UDP multi-packet source component.
pub struct UdpSource {
    // Properties.
    interface: String,
    ip_addr: String,
    port: u32,
    recv_buf_size: u32,
    msg_size: u32,
    num_msgs: u32,

    // Ports.
    dst: OutputPort<Vec<Vec<u8>>>,

    // Members.
    socket: Option<UdpSocket>,
    ring: Option<Arc<Ring>>,
    stop: Arc<AtomicBool>,
    filler: Option<std::thread::JoinHandle<()>>,
}

impl UdpSource {
    /// Create a new UDP source.
    pub fn new() -> (Self, InputPort<Vec<Vec<u8>>>) {
        let (dst, dr) = channel();
        (
            Self {
                interface: String::new(),
                ip_addr: String::new(),
                port: 0,
                recv_buf_size: DEFAULT_RECV_BUF_SIZE,
                msg_size: 0,
                num_msgs: 0,
                dst,
                socket: None,
                ring: None,
                stop: Arc::new(AtomicBool::new(false)),
                filler: None,
            },
            dr,
        )
    }

    /// The bound socket address, available after `initialize()`.
    ///
    /// Mainly useful when binding to port 0 in tests.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| Error::config("udp_source: not initialized"))?;
        Ok(socket.local_addr()?)
    }

    /// Keep the ring topped up to its target depth.
    fn keep_full(ring: Arc<Ring>, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::Relaxed) {
            let guard = ring.queue.lock().unwrap();
            let (mut guard, _) = ring
                .cv
                .wait_timeout_while(guard, Duration::from_secs(1), |q| q.len() >= ring.target)
                .unwrap();
            if guard.len() < ring.target {
                let group = ring.new_group();
                guard.push_back(group);
            }
        }
    }

    /// Receive up to one group's worth of datagrams into `group`.
    ///
    /// Returns the number received, or a negative errno-style result
    /// straight from `recvmmsg`.
    fn receive_batch(fd: i32, group: &mut [Vec<u8>]) -> i32 {
        let mut iovecs: Vec<libc::iovec> = group
            .iter_mut()
            .map(|b| libc::iovec {
                iov_base: b.as_mut_ptr() as *mut libc::c_void,
                iov_len: b.len(),
            })
            .collect();
        let mut msgs: Vec<libc::mmsghdr> = iovecs
            .iter_mut()
            .map(|io| {
                // SAFETY: zeroed mmsghdr is a valid "no ancillary data"
                // header.
                let mut m: libc::mmsghdr = unsafe { std::mem::zeroed() };
                m.msg_hdr.msg_iov = io as *mut libc::iovec;
                m.msg_hdr.msg_iovlen = 1;
                m
            })
            .collect();
        let mut timeout = libc::timespec {
            tv_sec: 1,
            tv_nsec: 0,
        };
        // SAFETY: msgs and iovecs point into `group` buffers which
        // outlive the call; vlen matches the array length.
        let recvd = unsafe {
            libc::recvmmsg(
                fd,
                msgs.as_mut_ptr(),
                msgs.len() as u32,
                0,
                &mut timeout,
            )
        };
        if recvd > 0 {
            for (buf, m) in group.iter_mut().zip(&msgs).take(recvd as usize) {
                buf.truncate(m.msg_len as usize);
            }
        }
        recvd
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(ring) = &self.ring {
            ring.cv.notify_all();
        }
        if let Some(handle) = self.filler.take()
            && handle.join().is_err()
        {
            warn!("udp_source: filler thread panicked");
        }
    }
}

impl Component for UdpSource {
    fn name(&self) -> &str {
        "udp_source"
    }

    fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match name {
            "interface" => self.interface = value.into_string(name)?,
            "ip_addr" => self.ip_addr = value.into_string(name)?,
            "port" => self.port = value.into_u32(name)?,
            "recv_buf_size" => self.recv_buf_size = value.into_u32(name)?,
            "msg_size" => self.msg_size = value.into_u32(name)?,
            "num_msgs" => self.num_msgs = value.into_u32(name)?,
            _ => {
                return Err(Error::config(format!(
                    "udp_source: unknown property {name}"
                )));
            }
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        if self.msg_size == 0 || self.num_msgs == 0 {
            return Err(Error::config("msg_size and num_msgs must be nonzero"));
        }
        if self.port > u32::from(u16::MAX) {
            return Err(Error::config(format!("port {} out of range", self.port)));
        }
        let ip: Ipv4Addr = self
            .ip_addr
            .parse()
            .map_err(|e| Error::config(format!("bad ip_addr {:?}: {e}", self.ip_addr)))?;
        let multicast = ip.is_multicast();
        let bind_ip = if multicast { Ipv4Addr::UNSPECIFIED } else { ip };
        let socket = UdpSocket::bind((bind_ip, self.port as u16))?;
        let fd = socket.as_raw_fd();
        // Receive buffer size and a 1 second receive timeout.
        let bufsz = self.recv_buf_size as libc::c_int;
        let tv = libc::timeval {
            tv_sec: 1,
            tv_usec: 0,
        };
        // SAFETY: option values are plain C structs passed with their
        // own sizes.
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &bufsz as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            );
        }
        socket.set_nonblocking(true)?;
        if multicast {
            let iface = interface_ip(fd, &self.interface).unwrap_or(Ipv4Addr::UNSPECIFIED);
            debug!(
                "udp_source: joining {ip} on {:?} ({iface})",
                self.interface
            );
            socket.join_multicast_v4(&ip, &iface)?;
        }
        let ring = Arc::new(Ring {
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            target: (self.num_msgs / 2).max(1) as usize,
            num_msgs: self.num_msgs as usize,
            msg_size: self.msg_size as usize,
        });
        {
            let mut q = ring.queue.lock().unwrap();
            for _ in 0..ring.target {
                q.push_back(ring.new_group());
            }
        }
        self.socket = Some(socket);
        self.ring = Some(ring);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let Some(ring) = &self.ring else {
            return Err(Error::config("udp_source: start before initialize"));
        };
        let ring = ring.clone();
        let stop = self.stop.clone();
        self.filler = Some(
            std::thread::Builder::new()
                .name("udp-filler".into())
                .spawn(move || Self::keep_full(ring, stop))?,
        );
        Ok(())
    }

    fn process(&mut self) -> Result<Retval> {
        let (Some(socket), Some(ring)) = (&self.socket, &self.ring) else {
            return Err(Error::config("udp_source: process before initialize"));
        };
        let Some(mut group) = ring.queue.lock().unwrap().pop_front() else {
            return Ok(Retval::NoYield);
        };
        ring.cv.notify_one();
        let fd = socket.as_raw_fd();
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: one valid pollfd, 1 second timeout.
        let nev = unsafe { libc::poll(&mut pfd, 1, 1000) };
        if nev > 0 && (pfd.revents & libc::POLLIN) != 0 {
            let recvd = Self::receive_batch(fd, &mut group);
            if recvd >= 0 {
                group.truncate(recvd as usize);
                self.dst.push(group, Timestamp::now());
            } else {
                // Transient receive failure: drop the group silently,
                // the filler replaces it.
                debug!(
                    "udp_source: recvmmsg failed: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        Ok(Retval::NoYield)
    }

    fn stop(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for UdpSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_source(ip: &str, num_msgs: u32, msg_size: u32) -> (UdpSource, InputPort<Vec<Vec<u8>>>) {
        let (mut src, out) = UdpSource::new();
        src.set_property("ip_addr", ip.into()).unwrap();
        src.set_property("port", PropertyValue::U32(0)).unwrap();
        src.set_property("msg_size", PropertyValue::U32(msg_size))
            .unwrap();
        src.set_property("num_msgs", PropertyValue::U32(num_msgs))
            .unwrap();
        (src, out)
    }

    fn drain_datagrams(
        src: &mut UdpSource,
        out: &InputPort<Vec<Vec<u8>>>,
        want: usize,
    ) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut got = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while got.len() < want && std::time::Instant::now() < deadline {
            assert_eq!(src.process()?, Retval::NoYield);
            while let Some((batch, _ts)) = out.pop() {
                got.extend(batch);
            }
        }
        Ok(got)
    }

    #[test]
    fn loopback_unicast_batches() -> anyhow::Result<()> {
        let (mut src, out) = make_source("127.0.0.1", 8, 1024);
        // Room for all datagrams in the socket buffer before the first
        // process() call drains it.
        src.set_property("recv_buf_size", PropertyValue::U32(1 << 20))?;
        src.initialize()?;
        src.start()?;
        let addr = src.local_addr()?;

        let sender = UdpSocket::bind("127.0.0.1:0")?;
        let count = 100usize;
        for i in 0..count {
            let mut payload = vec![0u8; 512];
            payload[0] = i as u8;
            payload[1] = (i >> 8) as u8;
            sender.send_to(&payload, addr)?;
        }

        let got = drain_datagrams(&mut src, &out, count)?;
        src.stop()?;
        assert_eq!(got.len(), count);
        for (i, datagram) in got.iter().enumerate() {
            // Short datagrams are truncated to their received length.
            assert_eq!(datagram.len(), 512);
            assert_eq!(datagram[0] as usize | ((datagram[1] as usize) << 8), i);
        }
        Ok(())
    }

    #[test]
    fn empty_ring_returns_no_yield() -> anyhow::Result<()> {
        let (mut src, _out) = make_source("127.0.0.1", 2, 64);
        src.initialize()?;
        // Not started: the filler never runs, so the pre-filled ring
        // drains and process keeps returning NoYield.
        for _ in 0..2 {
            assert_eq!(src.process()?, Retval::NoYield);
        }
        assert_eq!(src.process()?, Retval::NoYield);
        src.stop()?;
        Ok(())
    }

    #[test]
    fn reject_bad_config() {
        let (mut src, _out) = make_source("not-an-ip", 8, 1024);
        assert!(src.initialize().is_err());
        let (mut src, _out) = make_source("127.0.0.1", 0, 1024);
        assert!(src.initialize().is_err());
        let (mut src, _out) = make_source("127.0.0.1", 8, 0);
        assert!(src.initialize().is_err());
    }

    #[test]
    #[ignore] // Needs multicast routing on lo; run manually.
    fn multicast_loopback() -> anyhow::Result<()> {
        let (mut src, out) = make_source("239.1.2.3", 8, 1024);
        src.set_property("interface", "lo".into())?;
        src.initialize()?;
        src.start()?;
        let port = src.local_addr()?.port();

        let sender = UdpSocket::bind("0.0.0.0:0")?;
        sender.set_multicast_loop_v4(true)?;
        for i in 0..10u8 {
            sender.send_to(&[i; 64], ("239.1.2.3", port))?;
        }
        let got = drain_datagrams(&mut src, &out, 10)?;
        src.stop()?;
        assert_eq!(got.len(), 10);
        Ok(())
    }
}
/* vim: textwidth=80
 */
