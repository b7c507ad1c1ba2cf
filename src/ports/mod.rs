//! Port traits at the seams between the domain and the outside world.

pub mod config_port;
pub mod fetch_port;
pub mod report_port;
pub mod store_port;
