//! Leiningen build-descriptor access for the Lumen sync engine.
//!
//! The descriptor *parser* lives on the build-tool side: a helper task prints
//! the project map and the resolved dependency list as JSON, and this crate
//! turns those payloads into typed values ([`ProjectDescriptor`],
//! [`DependencyRecord`]). Downstream code never sees untyped key/value maps.
//!
//! [`DescriptorSource`] is the seam the sync engine consumes. Two
//! implementations ship here: [`HelperDescriptorSource`], which shells into
//! the build tool through an injectable [`CommandRunner`], and
//! [`StaticDescriptorSource`], which answers from registered in-memory
//! descriptors and backs most engine tests.

mod command;
mod helper;
mod model;
mod port;

pub use command::{CommandOutput, CommandRunner, DefaultCommandRunner};
pub use helper::{HelperConfig, HelperDescriptorSource};
pub use model::{
    is_descriptor_file, DependencyRecord, DependencyScope, ProjectDescriptor, DESCRIPTOR_FILE_NAME,
};
pub use port::{DescriptorSource, StaticDescriptorSource};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while obtaining or decoding a project descriptor.
///
/// Every variant means the same thing to the sync engine: the descriptor
/// could not be loaded, and the affected project's sync fails without
/// touching sibling projects.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to run descriptor helper `{command}`")]
    Helper {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "descriptor helper `{command}` exited with code {code:?}\nstdout:\n{stdout}\nstderr:\n{stderr}"
    )]
    HelperFailed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("malformed descriptor payload for `{path}`")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no descriptor registered for `{path}`")]
    Unknown { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, DescriptorError>;
