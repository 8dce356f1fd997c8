//! Upload module
//!
//! Acquires a Microsoft Graph bearer token and pushes exported CSV files
//! from the local data directory into the project's OneDrive folder.

mod drive;
mod token;
mod types;

pub use drive::DriveUploader;
pub use token::TokenClient;
pub use types::{AccessToken, UploadError, UploadReport};
