//! Adapters for the application ports.

pub mod cipher;
pub mod memory;
pub mod nats;
pub mod postgres;
pub mod settings;
pub mod stripe;

pub use cipher::{AesCbcCipher, SecretCipher};
pub use memory::MemoryStore;
pub use nats::NatsEventPublisher;
pub use postgres::PgStore;
pub use settings::{PgSettingsProvider, StaticSettings};
pub use stripe::StripeGateway;
