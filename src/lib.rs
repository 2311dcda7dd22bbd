//! Row-oriented enumeration of Oracle Cloud Infrastructure resources.
//!
//! One logical table listing fans out over the connection's regions, the
//! tenancy's compartment tree and each region's availability domains.

pub mod config;
pub mod engine;
pub mod error;
pub mod oci;
pub mod resource;

/// Version injected at compile time via OCIROWS_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("OCIROWS_VERSION") {
    Some(v) => v,
    None => "dev",
};
