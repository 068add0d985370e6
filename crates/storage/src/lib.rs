//! Cloud Storage JSON API client for rusty-gcsfs.
//!
//! This crate turns the generic HTTP seam into typed object-store
//! operations: stat, listing, rewrite, delete, ranged media download,
//! and the resumable upload state machine. The filesystem facade in
//! `rusty-gcsfs-filesystem` composes these with its caches.
//!
//! Credentials and zone detection are external collaborators, consumed
//! through the [`AuthProvider`] and [`ZoneProvider`] capability traits.

mod auth;
mod client;
mod upload;
mod wire;
mod zone;

pub use auth::{AuthProvider, StaticAuthProvider};
pub use client::{
    encode_object_name, FileSignature, GcsClient, ListPage, ObjectMetadata, TimeoutConfig,
};
pub use upload::ResumableUpload;
pub use zone::{region_from_zone, StaticZoneProvider, ZoneProvider};
