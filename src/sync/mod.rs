pub mod controller;
pub mod ordering;
pub mod status;

pub use controller::{Durability, Reconciler};
