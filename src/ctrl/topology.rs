use std::io::prelude::*;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use anyhow::Result;
use local_ip_address::list_afinet_netifas;
use serde::Deserialize;

fn is_my_ip(ip: &Ipv4Addr) -> bool {
    let my_ips = list_afinet_netifas().unwrap();
    my_ips
        .iter()
        .any(|(_iface, if_ip)| *if_ip == IpAddr::V4(*ip))
}

#[derive(Debug, Deserialize)]
struct TopologyFile {
    rdmesh: TopologyTable,
}

#[derive(Debug, Deserialize)]
struct TopologyTable {
    peers: Vec<Ipv4Addr>,
}

/// The participant list of a TCP-bootstrapped cluster.
#[derive(Debug, Clone)]
pub struct Topology {
    peers: Vec<Ipv4Addr>,
    id: usize,
}

impl Topology {
    /// Build a topology with an explicitly assigned rank.
    pub fn new_with_id(peers: Vec<Ipv4Addr>, id: usize) -> Self {
        Topology { peers, id }
    }

    /// Build a topology, detecting this process's rank by matching the peer
    /// list against local interface addresses.
    ///
    /// # Panics
    ///
    /// Panics when none of the peers is a local address.
    pub fn new(peers: Vec<Ipv4Addr>) -> Self {
        let id = peers.iter().position(is_my_ip).unwrap();
        Self::new_with_id(peers, id)
    }

    /// Load a TOML cluster configuration.
    ///
    /// The TOML file should have a `rdmesh` table with a `peers` array
    /// containing the IPv4 addresses of every participant. For example:
    ///
    /// ```toml
    /// [rdmesh]
    /// peers = ["10.0.2.1", "10.0.2.2", "10.0.2.3"]
    /// ```
    ///
    /// Irrelevant fields are ignored, so the snippet can live inside a
    /// larger mixed configuration file.
    pub fn load_toml(toml: &str) -> Result<Self> {
        let parsed: TopologyFile = toml::from_str(toml)?;
        Ok(Self::new(parsed.rdmesh.peers))
    }

    /// Load cluster configuration from a TOML file.
    pub fn load_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut toml_str = String::new();
        file.read_to_string(&mut toml_str)?;

        Self::load_toml(&toml_str)
    }

    /// Get the IP addresses of all nodes in the cluster.
    #[inline]
    pub fn peers(&self) -> &[Ipv4Addr] {
        &self.peers
    }

    /// Get the rank of this node in the cluster.
    #[inline]
    pub fn rank(&self) -> usize {
        self.id
    }

    /// Get the number of participants in the cluster.
    #[inline]
    pub fn size(&self) -> usize {
        self.peers.len()
    }

    /// Get the IP address of the node with the specified rank.
    #[inline]
    pub fn get(&self, id: usize) -> Option<Ipv4Addr> {
        self.peers.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [rdmesh]
            peers = ["10.0.2.1", "10.0.2.2", "10.0.2.3"]

            [other]
            junk = 1
        "#;
        let parsed: TopologyFile = toml::from_str(toml).unwrap();
        assert_eq!(
            parsed.rdmesh.peers,
            vec![
                "10.0.2.1".parse::<Ipv4Addr>().unwrap(),
                "10.0.2.2".parse().unwrap(),
                "10.0.2.3".parse().unwrap()
            ]
        );
    }

    #[test]
    fn test_explicit_rank() {
        let topo = Topology::new_with_id(vec!["127.0.0.1".parse().unwrap(); 4], 2);
        assert_eq!(topo.rank(), 2);
        assert_eq!(topo.size(), 4);
        assert_eq!(topo.get(0), Some("127.0.0.1".parse().unwrap()));
        assert_eq!(topo.get(4), None);
    }
}
