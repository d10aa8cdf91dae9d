pub mod allocation;
pub mod contract;
pub mod session;
