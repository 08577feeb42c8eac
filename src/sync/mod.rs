//! Remote settings sync
//!
//! The device periodically downloads its settings from the remote service.
//! The downloaded layer replaces the remote tier wholesale, while its phrase
//! catalog is also merged into the local fallback catalog so phrases survive
//! the service going away. Cached audio that no longer matches is dropped and
//! regenerated lazily by the next request.

pub mod client;
pub mod controller;
pub mod merge;

pub use client::{DEFAULT_MOTHER_URL, DEFAULT_SYNC_TIMEOUT, MotherClient, RemoteSettingsSource};
pub use controller::RemoteSyncController;
pub use merge::{SettingsChanges, merge_catalog};
