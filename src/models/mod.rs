pub mod segment;
pub mod stop;
pub mod trip;
pub mod vote;
