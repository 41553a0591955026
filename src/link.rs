//! Link-layer channel: a raw packet socket on a monitor-mode interface
//! plus the header codec around it.
//!
//! [`FrameEncoder`] is the pure transmit side (header scratch buffers and
//! the sequence counter); [`LinkSocket`] owns the socket and drives the
//! encoder and [`crate::wire::parse_frame`]. Keeping the codec separate from
//! the socket lets the round-trip properties run against in-memory buffers.

use std::ffi::CString;
use std::io::{self, IoSlice, Read};
use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;

use log::warn;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::{LinkError, ReadError};
use crate::wire::{self, app, dot11, radiotap, FrameView, IwabHeader};

/// Transmit-side header state.
///
/// The radiotap and dot11 buffers are filled once; each send patches only
/// the app header and hands the kernel a 4-part scatter-gather list.
pub struct FrameEncoder {
    radiotap: [u8; radiotap::TX_LEN],
    mac: [u8; dot11::LEN],
    app: [u8; app::LEN],
    seq: u32,
}

impl FrameEncoder {
    pub fn new(group: &[u8; 6], mcs_index: u8) -> Self {
        let mut radiotap_buf = [0u8; radiotap::TX_LEN];
        radiotap::build_tx(mcs_index, &mut radiotap_buf);
        let mut mac = [0u8; dot11::LEN];
        dot11::build(group, &mut mac);
        Self {
            radiotap: radiotap_buf,
            mac,
            app: [0u8; app::LEN],
            seq: 0,
        }
    }

    /// Sequence number of the last primary stamped; 0 before the first.
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Stamp the app header for the next send. The sequence counter is
    /// pre-incremented on primaries only; a retry reuses its primary's
    /// sequence and timestamp.
    pub fn stamp(&mut self, payload_len: usize, timestamp: u64, retry: bool) {
        if !retry {
            self.seq = self.seq.wrapping_add(1);
        }
        let header = IwabHeader {
            version: app::VERSION,
            length: payload_len as u16,
            seq: self.seq,
            timestamp,
            retry: retry as u8,
        };
        header.write(&mut self.app);
    }

    /// The scatter-gather list for one frame as currently stamped.
    pub fn slices<'a>(&'a self, payload: &'a [u8]) -> [IoSlice<'a>; 4] {
        [
            IoSlice::new(&self.radiotap),
            IoSlice::new(&self.mac),
            IoSlice::new(&self.app),
            IoSlice::new(payload),
        ]
    }
}

/// A raw link-layer datagram channel bound to one wireless interface.
///
/// The socket closes when the value drops; a failed [`LinkSocket::open`]
/// leaves nothing behind to clean up.
pub struct LinkSocket {
    socket: Socket,
    encoder: FrameEncoder,
    filter: [u8; 6],
    frame_size: usize,
}

impl LinkSocket {
    /// Open a non-blocking AF_PACKET socket bound to `iface`.
    ///
    /// `group` is the 6-byte group address stamped into all three dot11
    /// address fields on send and required of all three on receive;
    /// `frame_size` is the stream's sample-frame alignment.
    pub fn open(
        iface: &str,
        group: [u8; 6],
        mcs_index: u8,
        frame_size: usize,
    ) -> Result<Self, LinkError> {
        if iface.is_empty() {
            return Err(LinkError::InvalidArgument("empty interface name"));
        }
        if frame_size == 0 {
            return Err(LinkError::InvalidArgument("zero sample frame size"));
        }

        let open_err = |source: io::Error| LinkError::InterfaceOpen {
            iface: iface.to_owned(),
            source,
        };

        let c_iface = CString::new(iface)
            .map_err(|_| LinkError::InvalidArgument("interface name contains NUL"))?;
        let if_index = unsafe { libc::if_nametoindex(c_iface.as_ptr()) };
        if if_index == 0 {
            return Err(open_err(io::Error::last_os_error()));
        }

        let proto = (libc::ETH_P_ALL as u16).to_be() as i32;
        let socket =
            Socket::new(Domain::PACKET, Type::RAW, Some(Protocol::from(proto))).map_err(open_err)?;

        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as libc::sa_family_t;
        sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        sll.sll_ifindex = if_index as i32;
        let bind_addr = unsafe {
            let mut storage: libc::sockaddr_storage = mem::zeroed();
            ptr::copy_nonoverlapping(
                &sll as *const libc::sockaddr_ll as *const u8,
                &mut storage as *mut libc::sockaddr_storage as *mut u8,
                mem::size_of::<libc::sockaddr_ll>(),
            );
            SockAddr::new(storage, mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t)
        };
        socket.bind(&bind_addr).map_err(open_err)?;

        if let Err(e) = socket.set_recv_buffer_size(wire::MAX_FRAME) {
            // not fatal, the default is larger on every mainline kernel
            warn!("failed to set receive buffer size on {iface}: {e}");
        }
        socket.set_nonblocking(true).map_err(open_err)?;

        Ok(Self {
            socket,
            encoder: FrameEncoder::new(&group, mcs_index),
            filter: group,
            frame_size,
        })
    }

    /// Sequence number of the last primary sent.
    pub fn seq(&self) -> u32 {
        self.encoder.seq()
    }

    /// Stamp and send one frame as a single vectored write.
    ///
    /// Returns the bytes handed to the kernel. Kernel errors come back
    /// verbatim; the caller decides which are transient.
    pub fn send(&mut self, payload: &[u8], timestamp: u64, retry: bool) -> Result<usize, LinkError> {
        if payload.is_empty() {
            return Err(LinkError::InvalidArgument("empty payload"));
        }
        if payload.len() > wire::MAX_PAYLOAD {
            return Err(LinkError::InvalidArgument("payload exceeds MAX_PAYLOAD"));
        }

        self.encoder.stamp(payload.len(), timestamp, retry);
        let n = self.socket.send_vectored(&self.encoder.slices(payload))?;
        Ok(n)
    }

    /// Receive one link-layer frame into `buf` and parse it.
    ///
    /// The returned view borrows `buf` and is valid until the next read
    /// into the same buffer. [`ReadError::Again`] means the socket is
    /// drained; [`ReadError::Malformed`] means a datagram arrived but was
    /// not an iwab frame and draining should continue.
    pub fn read<'b>(&mut self, buf: &'b mut [u8]) -> Result<FrameView<'b>, ReadError> {
        let n = match self.socket.read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(ReadError::Again),
            Err(e) => return Err(ReadError::Io(e)),
        };
        wire::parse_frame(&buf[..n], &self.filter, self.frame_size).map_err(ReadError::Malformed)
    }
}

impl AsRawFd for LinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
