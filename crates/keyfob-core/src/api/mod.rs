//! HTTP side of the gallery service.
//!
//! `oauth` implements the token exchange the `AuthSession` drives, and
//! `client` is the `GalleryClient` that uses the resulting bearer token
//! for the public JSON API.

pub mod client;
pub mod error;
pub mod oauth;

pub use client::GalleryClient;
pub use error::ApiError;
pub use oauth::OAuthExchange;
