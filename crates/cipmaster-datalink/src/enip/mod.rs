pub mod encapsulation;
pub mod transport;
