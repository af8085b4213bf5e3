pub mod client;
pub mod store;

pub use client::{Resolution, SupabaseClient};
pub use store::RemoteStore;
