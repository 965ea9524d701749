//! Neighbor synchronization and transports
//!
//! Network neighbors are polled over HTTP; radio neighbors are read from
//! the advertisement of a device found by discovery. Bridge nodes also
//! advertise their own virtual state through a supervised helper process.

pub mod advertiser;
pub mod http;
pub mod neighbor;
pub mod radio;

pub use self::advertiser::{Advertiser, AdvertiserConfig, ProcessAdvertiser};
pub use self::http::{serve_status, status_router, HttpStatusFetcher, StatusFetcher};
pub use self::neighbor::NeighborSynchronizer;
pub use self::radio::{discover, DeviceMap, DeviceScanner, DiscoveryConfig, RadioDevice};
