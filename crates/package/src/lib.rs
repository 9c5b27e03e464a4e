//! Package Cache (§4.2) and Manifest Reader (§4.3).

pub mod cache;
pub mod error;
pub mod extract;
pub mod manifest;

pub use cache::{cache_key, PackageCache};
pub use extract::extract_apkg;
pub use manifest::{read_manifest, MANIFEST_FILE_NAME};
