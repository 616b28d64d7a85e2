pub mod analysis;
pub mod calendar;
pub mod context;
pub mod revenue;
pub mod simulation;
