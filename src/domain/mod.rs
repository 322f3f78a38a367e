//! Storefront domain: aggregates, value objects, events and pure services.
pub mod aggregates;
pub mod events;
pub mod services;
pub mod value_objects;
