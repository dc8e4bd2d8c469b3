//! Module zip construction.

use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::module::error::ModuleResult;
use crate::storage::TreeHandle;

const EXECUTABLE_MODE: i32 = 0o100755;

/// Build the module zip for a commit tree.
///
/// Every file of the tree becomes an entry named `<module>@<version>/<path>`,
/// in tree order. Directories get no entries of their own.
pub fn build_module_zip(tree: &TreeHandle<'_>, module_path: &str, version: &str) -> ModuleResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let files = tree.files()?;

    for file in &files {
        let permissions = if file.mode == EXECUTABLE_MODE { 0o755 } else { 0o644 };
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(permissions);

        writer.start_file(format!("{}@{}/{}", module_path, version, file.path), options)?;
        writer.write_all(&tree.read(file)?)?;
    }

    let bytes = writer.finish()?.into_inner();
    debug!(module = module_path, version, files = files.len(), bytes = bytes.len(), "built module zip");
    Ok(bytes)
}
