// Library exports for the gallery client
// The CLI binary and the integration tests drive these modules

pub mod blob;
pub mod cache;
pub mod client;
pub mod comments;
pub mod compose;
pub mod config;
pub mod db;
pub mod error;
pub mod gallery;
pub mod gateway;
pub mod guards;
pub mod identity;
pub mod invalidation;
pub mod linkify;
pub mod models;
pub mod notify;
pub mod profile;
pub mod render;

pub use client::GalleryClient;
