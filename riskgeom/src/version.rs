//! Version handshake for dynamically loaded deployments.

/// Major version of this library.
pub const VERSION_MAJOR: u32 = 0;
/// Minor version of this library.
pub const VERSION_MINOR: u32 = 1;
/// Patch version of this library.
pub const VERSION_PATCH: u32 = 0;

/// Returns the version packed as `MAJOR << 16 | MINOR << 8 | PATCH`.
#[must_use]
pub const fn version() -> u32 {
    (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH
}

/// Returns the version as a human-readable string.
#[must_use]
pub fn version_string() -> String {
    format!("riskgeom {VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}")
}

/// Checks whether this library satisfies a caller compiled against the
/// packed version `required`: the major versions must be equal and this
/// library's minor version must be at least the required minor version.
#[must_use]
pub const fn is_compatible(required: u32) -> bool {
    let required_major = (required >> 16) & 0xff;
    let required_minor = (required >> 8) & 0xff;

    VERSION_MAJOR == required_major && VERSION_MINOR >= required_minor
}
