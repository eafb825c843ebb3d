pub mod deliveries;
pub mod orders;
pub mod payments;
