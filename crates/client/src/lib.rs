//! Typed client facade for the remote platform API.
//!
//! The rest of the system talks to the platform through the
//! [`PlatformClient`] trait: describe calls, folder listings, short-lived
//! download URLs, ranged reads, and uploads. The HTTP implementation owns
//! all retry and backoff; callers see either success or a terminal
//! [`ClientError`].

pub mod config;
pub mod error;
pub mod http;
pub mod traits;
pub mod types;

pub use config::ApiConfig;
pub use error::ClientError;
pub use http::HttpPlatformClient;
pub use traits::PlatformClient;
pub use types::{
    AccessLevel, DownloadUrl, FolderListing, FolderObject, ObjectDescribe, ObjectState,
    ProjectDescribe,
};
