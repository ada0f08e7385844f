use std::net::IpAddr;

/// 5-tuple fields carried on a partial witness (spec.md §3).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FiveTuple {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    /// Capture interface name the packet/event arrived on.
    pub interface: String,
}

impl FiveTuple {
    /// Swap source and destination. Used when the newly arriving item
    /// is the request but the cached partial was the response: the
    /// merged record must always reflect client -> server orientation
    /// (spec.md §4.4, `Process`).
    pub fn inverted(&self) -> FiveTuple {
        FiveTuple {
            src_ip: self.dst_ip,
            src_port: self.dst_port,
            dst_ip: self.src_ip,
            dst_port: self.src_port,
            interface: self.interface.clone(),
        }
    }
}
