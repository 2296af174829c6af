pub mod allocation;
pub mod packet_service;

pub use packet_service::*;
