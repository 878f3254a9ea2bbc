//! Raw socket management, privilege checks and source-address selection

use crate::error::ScanError;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// Verify the process may open raw sockets.
///
/// On non-Windows hosts this means an effective uid of 0; on Windows the
/// check is skipped and an elevated session is assumed.
pub fn ensure_privileged() -> crate::Result<()> {
    #[cfg(not(windows))]
    {
        // SAFETY: geteuid cannot fail.
        if unsafe { libc::geteuid() } != 0 {
            return Err(ScanError::PrivilegeRequired);
        }
    }
    Ok(())
}

/// First non-loopback IPv4 address among the local interfaces.
///
/// Used both as the IP source of every probe and as the source half of
/// the checksum pseudo-header.
pub fn source_address() -> crate::Result<Ipv4Addr> {
    for iface in pnet::datalink::interfaces() {
        if iface.is_loopback() {
            continue;
        }
        for network in &iface.ips {
            if let IpAddr::V4(addr) = network.ip() {
                if !addr.is_loopback() {
                    return Ok(addr);
                }
            }
        }
    }
    Err(ScanError::NoSourceAddress)
}

/// Raw IPv4/TCP socket carrying caller-supplied IP headers.
///
/// The handle tolerates one concurrent sender and one concurrent
/// receiver; the kernel serializes datagram boundaries. Dropping the
/// wrapper closes the descriptor, so release is scoped to the owning
/// engine on every exit path.
pub struct RawSocket {
    socket: Socket,
}

impl RawSocket {
    /// Open the socket bound to 0.0.0.0 with IP_HDRINCL set.
    pub fn open() -> crate::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::from(libc::SOCK_RAW), Some(Protocol::TCP))
            .map_err(|e| {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    ScanError::PrivilegeRequired
                } else {
                    ScanError::SocketOpenFailed(e)
                }
            })?;
        socket
            .bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
            .map_err(ScanError::SocketOpenFailed)?;

        let raw = Self { socket };
        raw.set_header_included()?;
        Ok(raw)
    }

    fn set_header_included(&self) -> crate::Result<()> {
        let one: libc::c_int = 1;
        // SAFETY: the fd is owned by self.socket and `one` outlives the call.
        let rc = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::IPPROTO_IP,
                libc::IP_HDRINCL,
                &one as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(ScanError::SocketOpenFailed(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Write one datagram. The kernel routes on the address; the ports
    /// live inside the packet.
    pub fn send_to(&self, packet: &[u8], dst: Ipv4Addr) -> crate::Result<usize> {
        let addr = SockAddr::from(SocketAddrV4::new(dst, 0));
        self.socket
            .send_to(packet, &addr)
            .map_err(|e| ScanError::SendFailed(dst, e))
    }

    /// Blocking receive of one datagram, bounded by the configured read
    /// timeout.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut uninit: Vec<MaybeUninit<u8>> = vec![MaybeUninit::uninit(); buf.len()];
        let (size, _addr) = self.socket.recv_from(&mut uninit)?;
        let size = size.min(buf.len());
        for i in 0..size {
            // SAFETY: recv_from initialized the first `size` bytes.
            buf[i] = unsafe { uninit[i].assume_init() };
        }
        Ok(size)
    }

    /// Bound every subsequent `recv` call.
    pub fn set_read_timeout(&self, timeout: Duration) -> crate::Result<()> {
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(ScanError::SocketOpenFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_check_matches_euid() {
        let euid = unsafe { libc::geteuid() };
        let result = ensure_privileged();
        if euid == 0 {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(ScanError::PrivilegeRequired)));
        }
    }
}
