//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a near cache is
//! initialized.
//!
//! # Tasks
//! - Expiration sweep: removes records past their time-to-live or max-idle
//! - Key store: persists the key set for the next preload

mod expiration;
mod key_store;

pub use expiration::spawn_expiration_task;
pub use key_store::spawn_key_store_task;
