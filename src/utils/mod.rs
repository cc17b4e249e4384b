pub mod correlation;
pub mod data;
pub mod ev_calculator;
pub mod leg_probability;
pub mod odds;
pub mod parlay_builder;
pub mod secondary_stats;

pub use correlation::*;
pub use ev_calculator::*;
pub use leg_probability::*;
pub use parlay_builder::*;
pub use secondary_stats::*;
