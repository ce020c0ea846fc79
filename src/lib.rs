//! Splits item (version) quantities over the configuration groups of a co-mail facility and
//! picks the allocation that yields the most zip code packages.

pub mod api;
pub mod config;
pub mod facility;
pub mod loader;
pub mod model;
pub mod planner;
pub mod scorer;
pub mod search;
pub mod selector;
pub mod split;
pub mod types;
pub mod validator;
