//! NAT port mapping
//!
//! - NAT-PMP (RFC 6886) and UPnP IGD back ends
//! - default gateway discovery
//! - CGNAT detection on the mapped address
//! - `MappingController`, which makes the one attempt a run is allowed

pub mod cgnat;
pub mod controller;
pub mod gateway;
pub mod natpmp;
pub mod types;
pub mod upnp;

pub use types::{MappingError, MappingProtocol, NatMappingResult, PortMappingResult};

pub use cgnat::detect_cgnat;
pub use controller::{GatewayMapper, MappingController, PortMapper};
pub use gateway::{find_default_gateway, local_ip_for_default_route};
pub use natpmp::{delete_natpmp_mapping, try_natpmp_mapping};
pub use upnp::{delete_upnp_mapping, try_upnp_mapping};
