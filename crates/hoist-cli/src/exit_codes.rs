//! Process exit codes. These are part of the public contract.

use hoist_install::InstallError;
use hoist_registry::RegistryError;

pub const SUCCESS: i32 = 0;
/// Bad input or a lookup miss (unknown bundle, version, key or installation).
pub const INPUT_ERROR: i32 = 1;
/// Repository unreachable or answering with an error.
pub const TRANSPORT_ERROR: i32 = 2;
/// Digest or signature check failed.
pub const INTEGRITY_ERROR: i32 = 3;
/// The driver or invocation image failed.
pub const EXECUTION_ERROR: i32 = 4;
/// Local files could not be read or written.
pub const STORAGE_ERROR: i32 = 5;

/// Exit code for the first typed error in the chain.
pub fn from_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<InstallError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<RegistryError>() {
            return e.exit_code();
        }
    }
    INPUT_ERROR
}
