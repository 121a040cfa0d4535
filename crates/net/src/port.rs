//! TX/RX queue abstraction over the two Ethernet ports
//!
//! The traffic engine only ever pushes single frames and polls bursts; this
//! module hides where they go. Production runs use `PacketSocket`, a raw
//! `AF_PACKET` socket bound to one interface. Tests and self-test mode use
//! `mem::link`, a bounded in-memory queue pair that behaves like an ideal
//! reflector when cross-wired.

use xlatbench_common::types::MAX_RX_BURST;

/// Largest frame the tester ever receives, FCS excluded, with headroom.
pub const RECV_BUF_LEN: usize = 2048;

/// A reusable receive buffer; `len` bytes of `buf` are valid after a poll.
pub struct RecvFrame {
    buf: Box<[u8; RECV_BUF_LEN]>,
    len: usize,
}

impl RecvFrame {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; RECV_BUF_LEN]),
            len: 0,
        }
    }

    /// Pre-allocate a full burst of receive buffers.
    #[must_use]
    pub fn burst() -> Vec<RecvFrame> {
        (0..MAX_RX_BURST).map(|_| RecvFrame::new()).collect()
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Copy a received frame in; oversized input is truncated.
    #[inline]
    pub fn fill(&mut self, data: &[u8]) {
        let n = data.len().min(RECV_BUF_LEN);
        self.buf[..n].copy_from_slice(&data[..n]);
        self.len = n;
    }

    #[inline]
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len.min(RECV_BUF_LEN);
    }

    #[inline]
    pub(crate) fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }
}

impl Default for RecvFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Transmit side of a port.
pub trait TxQueue: Send {
    /// Push one frame. Returns `false` on back-pressure; the senders retry
    /// in a tight loop until the frame is accepted.
    fn try_transmit(&mut self, frame: &[u8]) -> bool;
}

/// Receive side of a port.
pub trait RxQueue: Send {
    /// Poll up to `frames.len()` frames without blocking; returns how many
    /// buffers were filled.
    fn recv_burst(&mut self, frames: &mut [RecvFrame]) -> usize;
}

pub mod mem {
    //! In-memory loopback link, the test stand-in for a NIC queue pair.

    use super::{RecvFrame, RxQueue, TxQueue};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct Shared {
        queue: Mutex<VecDeque<Box<[u8]>>>,
        capacity: usize,
    }

    pub struct MemTx(Arc<Shared>);
    pub struct MemRx(Arc<Shared>);

    /// A bounded unidirectional link: frames pushed into the `MemTx` come
    /// out of the `MemRx` in order.
    #[must_use]
    pub fn link(capacity: usize) -> (MemTx, MemRx) {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        });
        (MemTx(shared.clone()), MemRx(shared))
    }

    impl TxQueue for MemTx {
        #[inline]
        fn try_transmit(&mut self, frame: &[u8]) -> bool {
            let mut q = self.0.queue.lock();
            if q.len() >= self.0.capacity {
                return false;
            }
            q.push_back(frame.to_vec().into_boxed_slice());
            true
        }
    }

    impl RxQueue for MemRx {
        #[inline]
        fn recv_burst(&mut self, frames: &mut [RecvFrame]) -> usize {
            let mut q = self.0.queue.lock();
            let mut n = 0;
            while n < frames.len() {
                match q.pop_front() {
                    Some(data) => {
                        frames[n].fill(&data);
                        n += 1;
                    }
                    None => break,
                }
            }
            n
        }
    }
}

#[cfg(target_os = "linux")]
pub mod packet {
    //! Raw `AF_PACKET` backend (Linux only).

    use super::{RecvFrame, RxQueue, TxQueue};
    use std::io;
    use tracing::info;
    use xlatbench_common::error::{BenchError, BenchResult};
    use xlatbench_common::types::MAX_PORT_TRIALS;

    /// A non-blocking packet socket bound to one interface. The same socket
    /// serves as TX queue on the sending side and RX queue on the receiving
    /// side; the tester opens one per port per role.
    pub struct PacketSocket {
        fd: i32,
    }

    // The fd is used from a single worker thread at a time.
    unsafe impl Send for PacketSocket {}

    impl PacketSocket {
        /// Open and bind to `interface`, waiting for the link to come up.
        pub fn open(interface: &str, promisc: bool) -> BenchResult<Self> {
            let ifindex = if_index(interface)?;

            let fd = unsafe {
                libc::socket(
                    libc::AF_PACKET,
                    libc::SOCK_RAW,
                    (libc::ETH_P_ALL as u16).to_be() as i32,
                )
            };
            if fd < 0 {
                return Err(BenchError::Io(io::Error::last_os_error()));
            }
            let sock = PacketSocket { fd };

            unsafe {
                // Non-blocking: the engine busy-polls.
                let flags = libc::fcntl(fd, libc::F_GETFL, 0);
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);

                // Large socket buffers for burst tolerance.
                let bufsize: libc::c_int = 32 * 1024 * 1024;
                for opt in [libc::SO_RCVBUF, libc::SO_SNDBUF] {
                    libc::setsockopt(
                        fd,
                        libc::SOL_SOCKET,
                        opt,
                        &bufsize as *const _ as *const libc::c_void,
                        std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                    );
                }

                let mut sll: libc::sockaddr_ll = std::mem::zeroed();
                sll.sll_family = libc::AF_PACKET as libc::sa_family_t;
                sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
                sll.sll_ifindex = ifindex;
                if libc::bind(
                    fd,
                    &sll as *const _ as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                ) < 0
                {
                    return Err(BenchError::Io(io::Error::last_os_error()));
                }

                if promisc {
                    let mut mreq: libc::packet_mreq = std::mem::zeroed();
                    mreq.mr_ifindex = ifindex;
                    mreq.mr_type = libc::PACKET_MR_PROMISC as libc::c_ushort;
                    libc::setsockopt(
                        fd,
                        libc::SOL_PACKET,
                        libc::PACKET_ADD_MEMBERSHIP,
                        &mreq as *const _ as *const libc::c_void,
                        std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
                    );
                }
            }

            sock.wait_link_up(interface)?;
            info!("port '{}' is up (ifindex {})", interface, ifindex);
            Ok(sock)
        }

        fn wait_link_up(&self, interface: &str) -> BenchResult<()> {
            for _ in 0..MAX_PORT_TRIALS {
                if if_running(self.fd, interface)? {
                    return Ok(());
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            Err(BenchError::LinkDown {
                interface: interface.to_string(),
                trials: MAX_PORT_TRIALS,
            })
        }
    }

    impl Drop for PacketSocket {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.fd);
            }
        }
    }

    impl TxQueue for PacketSocket {
        #[inline]
        fn try_transmit(&mut self, frame: &[u8]) -> bool {
            let sent = unsafe {
                libc::send(
                    self.fd,
                    frame.as_ptr() as *const libc::c_void,
                    frame.len(),
                    0,
                )
            };
            sent == frame.len() as isize
        }
    }

    impl RxQueue for PacketSocket {
        #[inline]
        fn recv_burst(&mut self, frames: &mut [RecvFrame]) -> usize {
            let mut n = 0;
            while n < frames.len() {
                let buf = frames[n].raw_mut();
                let mut from: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
                let mut from_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
                let got = unsafe {
                    libc::recvfrom(
                        self.fd,
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                        0,
                        &mut from as *mut _ as *mut libc::sockaddr,
                        &mut from_len,
                    )
                };
                if got <= 0 {
                    break; // EWOULDBLOCK or transient error; the caller re-polls
                }
                // The kernel loops our own transmissions back to every
                // packet socket on the interface; only real arrivals count.
                const PACKET_OUTGOING: u8 = 4; // linux/if_packet.h
                if from.sll_pkttype == PACKET_OUTGOING {
                    continue;
                }
                frames[n].set_len(got as usize);
                n += 1;
            }
            n
        }
    }

    fn if_index(interface: &str) -> BenchResult<i32> {
        let name = std::ffi::CString::new(interface)
            .map_err(|_| BenchError::InvalidConfiguration(format!("bad interface '{interface}'")))?;
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if index == 0 {
            return Err(BenchError::InvalidConfiguration(format!(
                "no such interface '{interface}'"
            )));
        }
        Ok(index as i32)
    }

    fn if_running(fd: i32, interface: &str) -> BenchResult<bool> {
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        for (dst, src) in ifr.ifr_name.iter_mut().zip(interface.as_bytes()) {
            *dst = *src as libc::c_char;
        }
        let res = unsafe { libc::ioctl(fd, libc::SIOCGIFFLAGS, &mut ifr) };
        if res < 0 {
            return Err(BenchError::Io(io::Error::last_os_error()));
        }
        let flags = unsafe { ifr.ifr_ifru.ifru_flags };
        Ok(flags & libc::IFF_RUNNING as libc::c_short != 0)
    }
}

/// Boxed queue pair for one direction of a test bed: frames pushed into
/// `tx` on the sending side come out of `rx` on the receiving side.
pub struct PortPair {
    pub tx: Box<dyn TxQueue>,
    pub rx: Box<dyn RxQueue>,
}

impl PortPair {
    /// In-memory wire, the stand-in for sender NIC + ideal DUT + receiver
    /// NIC: everything sent arrives untouched.
    #[must_use]
    pub fn wire(capacity: usize) -> PortPair {
        let (tx, rx) = mem::link(capacity);
        PortPair {
            tx: Box::new(tx),
            rx: Box::new(rx),
        }
    }
}
