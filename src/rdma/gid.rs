use std::fmt;
use std::net::Ipv6Addr;

pub use crate::bindings::ibv_gid;

/// An 128-bit identifier used to identify a port on a network adapter, a port
/// on a router, or a multicast group.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Gid(ibv_gid);

unsafe impl Send for Gid {}
unsafe impl Sync for Gid {}

impl fmt::Debug for Gid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gid = Ipv6Addr::from(*self);
        f.debug_tuple("Gid").field(&gid.to_string()).finish()
    }
}

impl PartialEq for Gid {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        unsafe { self.0.raw == other.0.raw }
    }
}

impl Eq for Gid {}

impl Default for Gid {
    #[inline]
    fn default() -> Self {
        Self::from([0u8; 16])
    }
}

impl From<ibv_gid> for Gid {
    #[inline]
    fn from(gid: ibv_gid) -> Self {
        Self(gid)
    }
}

impl From<Gid> for ibv_gid {
    #[inline]
    fn from(gid: Gid) -> Self {
        gid.0
    }
}

impl From<Ipv6Addr> for Gid {
    #[inline]
    fn from(addr: Ipv6Addr) -> Self {
        Self(ibv_gid { raw: addr.octets() })
    }
}

impl From<Gid> for Ipv6Addr {
    #[inline]
    fn from(gid: Gid) -> Self {
        Ipv6Addr::from(unsafe { gid.0.raw })
    }
}

impl From<[u8; 16]> for Gid {
    #[inline]
    fn from(raw: [u8; 16]) -> Self {
        Self(ibv_gid { raw })
    }
}

impl From<Gid> for [u8; 16] {
    #[inline]
    fn from(gid: Gid) -> Self {
        unsafe { gid.0.raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr() {
        use std::mem::*;
        assert_eq!(size_of::<Gid>(), size_of::<ibv_gid>());
        assert_eq!(align_of::<Gid>(), align_of::<ibv_gid>());
    }

    #[test]
    fn test_raw_roundtrip() {
        let raw: [u8; 16] = [
            0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0x02, 0x11, 0x22, 0xff, 0xfe, 0x33, 0x44, 0x55,
        ];
        let gid = Gid::from(raw);
        assert_eq!(<[u8; 16]>::from(gid), raw);
        assert_eq!(Gid::from(Ipv6Addr::from(gid)), gid);
    }
}
