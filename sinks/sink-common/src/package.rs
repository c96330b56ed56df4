//! Load and validate Substreams packages.

use std::{fmt, fs, path::Path};

use error_stack::{Result, ResultExt};
use price_sink_protocol::substreams::v1::{ModulesView, Package};
use prost::Message;
use tracing::info;

/// The parts of a `.spkg` file needed to stream one module.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstreamsPackage {
    /// Encoded modules graph, forwarded verbatim in stream requests.
    pub modules: Vec<u8>,
    pub network: String,
    pub output_module: String,
    pub initial_block: u64,
}

#[derive(Debug)]
pub struct PackageError;
impl error_stack::Context for PackageError {}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid substreams package")
    }
}

impl SubstreamsPackage {
    /// Reads the package at `path` and checks that `module_name` is a map module that
    /// outputs `expected_type`.
    pub fn load(
        path: impl AsRef<Path>,
        module_name: &str,
        expected_type: &str,
    ) -> Result<Self, PackageError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .change_context(PackageError)
            .attach_printable_lazy(|| format!("failed to read package {:?}", path))?;

        let package = Self::decode(&bytes, module_name, expected_type)
            .attach_printable_lazy(|| format!("package path: {:?}", path))?;

        info!(
            module = %package.output_module,
            network = %package.network,
            initial_block = package.initial_block,
            "loaded substreams package"
        );

        Ok(package)
    }

    pub fn decode(
        bytes: &[u8],
        module_name: &str,
        expected_type: &str,
    ) -> Result<Self, PackageError> {
        let package = Package::decode(bytes)
            .change_context(PackageError)
            .attach_printable("failed to decode package")?;

        let modules = ModulesView::decode(package.modules.as_slice())
            .change_context(PackageError)
            .attach_printable("failed to decode package modules")?;

        let Some(module) = modules.find(module_name) else {
            return Err(PackageError)
                .attach_printable_lazy(|| format!("module not found: {module_name}"));
        };

        let Some(output_type) = module.map_output_type() else {
            return Err(PackageError)
                .attach_printable_lazy(|| format!("module {module_name} is not a map module"));
        };

        let output_type = output_type.strip_prefix("proto:").unwrap_or(output_type);
        if output_type != expected_type {
            return Err(PackageError).attach_printable_lazy(|| {
                format!(
                    "module {module_name} outputs {output_type}, expected {expected_type}"
                )
            });
        }

        Ok(SubstreamsPackage {
            modules: package.modules,
            network: package.network,
            output_module: module_name.to_string(),
            initial_block: module.initial_block,
        })
    }
}
