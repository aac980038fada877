//! Asset identity resolution.
//!
//! Lock records carry a stable asset identifier so the host can keep tracking
//! an asset across renames. Deriving that identifier from a path requires the
//! host's asset database, which lives outside this crate, so the engine takes
//! it as a trait object.

/// Resolves a repository-relative path to a stable asset identifier.
///
/// Called on the engine's home thread after every listing refresh and on each
/// optimistic lock insertion; implementations should be cheap lookups.
pub trait AssetIndex: Send + Sync {
    /// The stable identifier for the asset at `path`, or an empty string when
    /// the asset is unknown.
    fn path_to_stable_id(&self, path: &str) -> String;
}

/// Index for hosts without an asset database: every path resolves to an
/// empty identifier.
#[derive(Debug, Default)]
pub struct NullAssetIndex;

impl AssetIndex for NullAssetIndex {
    fn path_to_stable_id(&self, _path: &str) -> String {
        String::new()
    }
}
