pub mod display;
pub mod driver;
pub mod executor;
pub mod tracker;

pub use driver::*;
pub use executor::*;
pub use tracker::*;
