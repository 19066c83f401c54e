pub mod itinerary;
pub mod planning;
pub mod trips;
pub mod voting;
pub mod weather;
