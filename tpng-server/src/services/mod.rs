//! External collaborators: audio storage, notification gateway, peers

pub mod blob_store;
pub mod forwarder;
pub mod gateway;

pub use blob_store::{BlobStore, FsBlobStore};
pub use forwarder::{ForwardRequest, HttpForwarder, IncidentForward, RemoteForwarder};
pub use gateway::{AppriseGateway, NotificationGateway};
