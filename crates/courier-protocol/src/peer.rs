use serde::{Deserialize, Serialize};

pub const HEALTH_PATH: &str = "/health";
pub const HERMES_ADDRESS_PATH: &str = "/hermes_address";
pub const UPDATE_ALL_PATH: &str = "/update_all";

/// Name under which Courier peers register with service discovery.
pub const ARMADA_SERVICE: &str = "armada";

/// Advertised by a Courier peer: the ssh endpoint and directory where it
/// keeps its hermes tree.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HermesAddress {
    pub ssh: String,
    pub path: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryReply {
    pub result: Vec<ServiceInstance>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServiceInstance {
    pub address: String,
}
