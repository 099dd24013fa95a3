//! Service modules for walk-tracker
//!
//! - Checkpoint persistence with change notification
//! - Location filtering
//! - Photo search and download transports, photo storage
//! - Walk session lifecycle

pub mod checkpoint_store;
pub mod location_filter;
pub mod photo_download;
pub mod photo_search;
pub mod walk_session;

pub use checkpoint_store::{CheckpointStore, StoreChange};
pub use location_filter::{LocationFeed, LocationFilter, Screening};
pub use photo_download::{
    photo_file_name, DirectoryPhotoStorage, HttpPhotoFetcher, PhotoFetcher, PhotoStorage, StoredPhoto,
};
pub use photo_search::{FlickrSearchClient, PhotoSearchClient};
pub use walk_session::WalkSession;
