pub mod auth;
pub mod keys;
pub mod local_store;
pub mod pipeline;
pub mod probe;
pub mod process;
pub mod publisher;
pub mod remux;
pub mod signer;
pub mod staging;
pub mod video_store;
