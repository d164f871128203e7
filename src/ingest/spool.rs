use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

/// Bytes kept from the start of the stream for container probing.
const PROBE_BYTES: usize = 64;
const COPY_CHUNK: usize = 64 * 1024;

/// An uploaded video copied to a private temporary file.
///
/// Decoders that need a seekable path read from here. The file is deleted when
/// this value is dropped, on success and on every error path alike.
pub struct SpooledVideo {
    file: NamedTempFile,
    head: Vec<u8>,
    len: u64,
    sha256: [u8; 32],
}

impl SpooledVideo {
    /// Copy `reader` to a new temporary file, hashing it on the way.
    pub fn spool<R: Read>(mut reader: R) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("deepsecure-")
            .suffix(".video")
            .tempfile()
            .context("failed to create video spool file")?;

        let mut hasher = Sha256::new();
        let mut head = Vec::with_capacity(PROBE_BYTES);
        let mut len = 0u64;
        let mut chunk = vec![0u8; COPY_CHUNK];

        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("failed to read video stream"),
            };
            let data = &chunk[..read];
            if head.len() < PROBE_BYTES {
                let take = (PROBE_BYTES - head.len()).min(read);
                head.extend_from_slice(&data[..take]);
            }
            hasher.update(data);
            file.write_all(data).context("failed to write video spool file")?;
            len += read as u64;
        }
        file.flush().context("failed to flush video spool file")?;

        Ok(Self {
            file,
            head,
            len,
            sha256: hasher.finalize().into(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// First bytes of the stream, for container sniffing.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}
