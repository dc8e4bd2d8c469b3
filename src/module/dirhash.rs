//! `h1:` hashes of module zips, as recorded in `go.sum`.

use std::io::{Cursor, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::module::error::{ModuleError, ModuleResult};

/// Hash a module zip the way `golang.org/x/mod/sumdb/dirhash.HashZip` does.
///
/// Each entry contributes a line `<sha256 hex>  <name>\n`; lines are sorted by
/// name and the summary is itself hashed and base64 encoded.
pub fn hash_zip(bytes: &[u8]) -> ModuleResult<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        if name.contains('\n') {
            return Err(ModuleError::Internal(format!("zip entry name contains newline: {:?}", name)));
        }
        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)?;
        entries.push((name, hex::encode(Sha256::digest(&contents))));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(hash1(&entries))
}

fn hash1(entries: &[(String, String)]) -> String {
    let mut summary = Sha256::new();
    for (name, digest) in entries {
        summary.update(format!("{}  {}\n", digest, name).as_bytes());
    }
    format!("h1:{}", STANDARD.encode(summary.finalize()))
}
