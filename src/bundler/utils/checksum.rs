//! Artifact checksum calculation.
//!
//! SHA-256 of disk images, recorded on the packaging job.

use crate::{
    bail,
    bundler::error::{ErrorExt, Result},
};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const CHUNK: usize = 8192;

/// Calculates the hex SHA-256 of a regular file.
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading metadata", path)?;
    if !metadata.is_file() {
        bail!("Cannot checksum {}: not a file", path.display())
    }

    let mut hasher = Sha256::new();
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut buffer = vec![0u8; CHUNK];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
