// SPDX-License-Identifier: MIT

//! Socket plumbing and the cooperative event loop.
//!
//! One non-blocking IPv6 UDP socket serves every enabled interface;
//! multicast group membership is joined and left per interface, and
//! `IPV6_RECVPKTINFO` tells us which interface a datagram arrived on and
//! whether it was multicast. All engine work happens on the thread that
//! calls [`Daemon::poll_once`]; the loop sleeps in `poll(2)` until the
//! earliest engine or allocator deadline.

use std::collections::BTreeMap;
use std::ffi::CStr;
use std::io;
use std::mem;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::os::unix::io::AsRawFd;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use socket2::{Domain, Protocol, Socket, Type};

use crate::core::{Config, Hncp, Transport, MAX_PAYLOAD_SIZE};
use crate::error::Error;
use crate::pa::store::PaStore;
use crate::pa::{HncpPaHandle, UlaConf};
use crate::time::{tmin, Clock, SystemClock, Time};

/// Failed multicast joins are retried this often; a join racing
/// duplicate address detection fails transiently.
const JOIN_RETRY_DELAY: Time = 1000;

fn ifindex(ifname: &str) -> Result<u32, Error> {
    let cname = std::ffi::CString::new(ifname)
        .map_err(|_| Error::NoSuchInterface(ifname.to_string()))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        Err(Error::NoSuchInterface(ifname.to_string()))
    } else {
        Ok(index)
    }
}

fn ifname_of(index: u32) -> Option<String> {
    let mut buf = [0u8; libc::IF_NAMESIZE + 1];
    let name = unsafe {
        libc::if_indextoname(index, buf.as_mut_ptr() as *mut libc::c_char)
    };
    if name.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(name) }
        .to_str()
        .ok()
        .map(str::to_string)
}

/// The lowest and highest hardware addresses of the host, concatenated.
/// Stable identifier material for the node id and allocator seeds.
pub fn get_hwaddrs() -> Vec<u8> {
    const ETHER_ADDR_LEN: usize = 6;
    let mut lowest = [0u8; ETHER_ADDR_LEN];
    let mut highest = [0u8; ETHER_ADDR_LEN];
    let mut found = false;

    let mut ifap: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut ifap) } != 0 {
        return Vec::new();
    }
    let mut cursor = ifap;
    while !cursor.is_null() {
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;
        if entry.ifa_addr.is_null() {
            continue;
        }
        let family = unsafe { (*entry.ifa_addr).sa_family };
        if libc::c_int::from(family) != libc::AF_PACKET {
            continue;
        }
        let sll = entry.ifa_addr as *const libc::sockaddr_ll;
        let addr = unsafe { &(&(*sll).sll_addr)[..ETHER_ADDR_LEN] };
        if addr.iter().all(|b| *b == 0) {
            continue;
        }
        if !found || addr < &lowest[..] {
            lowest.copy_from_slice(addr);
        }
        if !found || addr > &highest[..] {
            highest.copy_from_slice(addr);
        }
        found = true;
    }
    unsafe { libc::freeifaddrs(ifap) };
    if !found {
        warn!("no hardware addresses found");
        return Vec::new();
    }
    let mut out = Vec::with_capacity(ETHER_ADDR_LEN * 2);
    out.extend_from_slice(&lowest);
    out.extend_from_slice(&highest);
    out
}

/// The protocol socket: bound to the fixed port, pktinfo on, multicast
/// loopback off.
pub struct HncpSocket {
    socket: Socket,
    port: u16,
    group: Ipv6Addr,
}

impl HncpSocket {
    pub fn bind(port: u16, group: Ipv6Addr) -> Result<Self, Error> {
        let socket =
            Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_only_v6(true)?;
        socket.set_nonblocking(true)?;
        socket.set_multicast_loop_v6(false)?;
        let on: libc::c_int = 1;
        let rc = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::IPPROTO_IPV6,
                libc::IPV6_RECVPKTINFO,
                &on as *const _ as *const libc::c_void,
                mem::size_of_val(&on) as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        socket.bind(
            &SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0).into(),
        )?;
        Ok(HncpSocket {
            socket,
            port,
            group,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn join(&self, ifname: &str) -> Result<(), Error> {
        let index = ifindex(ifname)?;
        self.socket
            .join_multicast_v6(&self.group, index)
            .map_err(|e| {
                debug!("multicast join on {ifname} failed: {e}");
                Error::JoinFailed(ifname.to_string())
            })
    }

    pub fn leave(&self, ifname: &str) -> Result<(), Error> {
        let index = ifindex(ifname)?;
        self.socket.leave_multicast_v6(&self.group, index)?;
        Ok(())
    }

    /// Receive one datagram with its metadata: source, destination
    /// address (multicast or unicast is visible there) and arrival
    /// interface. `None` when the socket would block.
    pub fn recv(
        &self,
        buf: &mut [u8],
    ) -> io::Result<Option<(usize, SocketAddrV6, Ipv6Addr, String)>> {
        let mut src: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };
        let mut cmsg_buf = [0u8; 256];
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = &mut src as *mut _ as *mut libc::c_void;
        msg.msg_namelen = mem::size_of_val(&src) as libc::socklen_t;
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = cmsg_buf.len();

        let len = unsafe {
            libc::recvmsg(self.socket.as_raw_fd(), &mut msg, libc::MSG_DONTWAIT)
        };
        if len < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err);
        }

        let mut dst = None;
        let mut arrival = None;
        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        while !cmsg.is_null() {
            let header = unsafe { &*cmsg };
            if header.cmsg_level == libc::IPPROTO_IPV6
                && header.cmsg_type == libc::IPV6_PKTINFO
            {
                let info = unsafe {
                    &*(libc::CMSG_DATA(cmsg) as *const libc::in6_pktinfo)
                };
                dst = Some(Ipv6Addr::from(info.ipi6_addr.s6_addr));
                arrival = ifname_of(info.ipi6_ifindex);
            }
            cmsg = unsafe { libc::CMSG_NXTHDR(&msg, cmsg) };
        }
        let (Some(dst), Some(arrival)) = (dst, arrival) else {
            debug!("datagram without packet info, dropping");
            return Ok(None);
        };
        let src = SocketAddrV6::new(
            Ipv6Addr::from(src.sin6_addr.s6_addr),
            u16::from_be(src.sin6_port),
            0,
            src.sin6_scope_id,
        );
        Ok(Some((len as usize, src, dst, arrival)))
    }

    pub fn send(
        &self,
        ifname: &str,
        dst: &SocketAddrV6,
        data: &[u8],
    ) -> io::Result<usize> {
        let mut dst = *dst;
        if dst.scope_id() == 0 {
            if let Ok(index) = ifindex(ifname) {
                dst.set_scope_id(index);
            }
        }
        self.socket.send_to(data, &dst.into())
    }
}

impl Transport for HncpSocket {
    fn sendto(
        &mut self,
        ifname: &str,
        dst: &SocketAddrV6,
        data: &[u8],
    ) -> io::Result<usize> {
        HncpSocket::send(self, ifname, dst, data)
    }
}

#[derive(Debug, Default)]
struct JoinState {
    joined: bool,
    retry_at: Option<Time>,
}

/// Everything a running router needs, wired together: engine, allocator
/// glue, socket and clock.
pub struct Daemon {
    pub hncp: Hncp,
    pub pa: HncpPaHandle,
    socket: HncpSocket,
    clock: Box<dyn Clock>,
    joins: BTreeMap<String, JoinState>,
}

impl Daemon {
    pub fn new(
        cfg: Config,
        ula: UlaConf,
        store: PaStore,
    ) -> Result<Self, Error> {
        let socket = HncpSocket::bind(cfg.port, cfg.multicast_group)?;
        let hw_seed = get_hwaddrs();
        let mut entropy = StdRng::from_entropy();
        let mut salt = [0u8; 8];
        rand::RngCore::fill_bytes(&mut entropy, &mut salt);
        let node_id = Hncp::derive_node_id(&hw_seed, &salt);
        let mut hncp = Hncp::new(cfg, node_id, Box::new(entropy));
        hncp.set_hw_seed(hw_seed);
        let pa = HncpPaHandle::new(
            &mut hncp,
            ula,
            store,
            Box::new(StdRng::from_entropy()),
        );
        Ok(Daemon {
            hncp,
            pa,
            socket,
            clock: Box::new(SystemClock::new()),
            joins: BTreeMap::new(),
        })
    }

    /// Enable or disable the protocol on an interface: multicast
    /// membership, the flooding endpoint, and the allocator link.
    pub fn enable_interface(&mut self, ifname: &str, enabled: bool) {
        let now = self.clock.now();
        if enabled {
            let state = self.joins.entry(ifname.to_string()).or_default();
            match self.socket.join(ifname) {
                Ok(()) => {
                    state.joined = true;
                    state.retry_at = None;
                }
                Err(e) => {
                    // Probably duplicate address detection; retry soon.
                    warn!("{e}; retrying in {JOIN_RETRY_DELAY} ms");
                    state.retry_at = Some(now + JOIN_RETRY_DELAY);
                }
            }
            self.pa.set_internal(&mut self.hncp, ifname, true);
        } else {
            if let Some(state) = self.joins.remove(ifname) {
                if state.joined {
                    if let Err(e) = self.socket.leave(ifname) {
                        debug!("multicast leave on {ifname}: {e}");
                    }
                }
            }
            self.pa.set_internal(&mut self.hncp, ifname, false);
        }
    }

    fn retry_joins(&mut self, now: Time) {
        let due: Vec<String> = self
            .joins
            .iter()
            .filter(|(_, s)| {
                !s.joined && matches!(s.retry_at, Some(at) if now >= at)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for ifname in due {
            let result = self.socket.join(&ifname);
            let state = self.joins.get_mut(&ifname).expect("join state");
            match result {
                Ok(()) => {
                    state.joined = true;
                    state.retry_at = None;
                }
                Err(_) => state.retry_at = Some(now + JOIN_RETRY_DELAY),
            }
        }
    }

    fn next_deadline(&self, now: Time) -> Option<Time> {
        let mut deadline = tmin(self.hncp.next_run(), self.pa.next_run());
        for state in self.joins.values() {
            if !state.joined {
                deadline = tmin(deadline, state.retry_at);
            }
        }
        deadline.map(|d| d.max(now))
    }

    /// One loop tick: sleep until the next deadline or readability,
    /// drain the socket, then run engine and allocator timers.
    pub fn poll_once(&mut self) -> Result<(), Error> {
        let now = self.clock.now();
        let timeout = match self.next_deadline(now) {
            Some(deadline) => (deadline - now).min(Time::from(i32::MAX)) as i32,
            None => -1,
        };
        let mut pollfd = libc::pollfd {
            fd: self.socket.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pollfd, 1, timeout) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(Error::Io(err));
            }
        }

        // All decisions within this tick share one timestamp.
        let now = self.clock.now();
        if rc > 0 && pollfd.revents & libc::POLLIN != 0 {
            let mut buf = [0u8; MAX_PAYLOAD_SIZE];
            while let Some((len, src, dst, ifname)) =
                self.socket.recv(&mut buf)?
            {
                self.hncp.handle_datagram(
                    now,
                    &mut self.socket,
                    &ifname,
                    src,
                    dst,
                    &buf[..len],
                );
                // State changes above delivered their callbacks already;
                // drive the allocator before the next datagram.
                self.pa.run(now, &mut self.hncp);
            }
        }
        self.retry_joins(now);
        self.hncp.run(now, &mut self.socket);
        self.pa.run(now, &mut self.hncp);
        Ok(())
    }

    /// Run until an unrecoverable I/O error.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            self.poll_once()?;
        }
    }
}
