pub mod api_router;
pub mod config;
pub mod marketplace;
pub mod messages;
pub mod packages;
pub mod payments;
pub mod settings;
pub mod shared;
pub mod tickets;
