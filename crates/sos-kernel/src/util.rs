//! Hashing, script-kind probing, and compression handling.

use std::io::Read;

use sha2::{Digest, Sha256};

use crate::{KernelError, KernelResult};

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn is_typescript(filename: &str) -> bool {
    filename.ends_with(".ts")
        || filename.ends_with(".d.ts")
        || filename.ends_with(".ts.gz")
        || filename.ends_with(".d.ts.gz")
        || filename.ends_with(".ts.bz2")
        || filename.ends_with(".d.ts.bz2")
}

pub fn is_javascript(filename: &str) -> bool {
    filename.ends_with(".js") || filename.ends_with(".js.gz") || filename.ends_with(".js.bz2")
}

/// Transparently decompresses `.gz`/`.bz2` payloads by filename suffix;
/// everything else passes through.
pub fn decompress(filename: &str, data: Vec<u8>) -> KernelResult<Vec<u8>> {
    if filename.ends_with(".gz") {
        let mut decoder = flate2::read::GzDecoder::new(data.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|err| KernelError::Read {
                path: filename.to_string(),
                source: sos_vfs::VfsError::Io {
                    path: filename.to_string(),
                    source: err,
                },
            })?;
        return Ok(out);
    }
    if filename.ends_with(".bz2") {
        let mut decoder = bzip2::read::BzDecoder::new(data.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|err| KernelError::Read {
                path: filename.to_string(),
                source: sos_vfs::VfsError::Io {
                    path: filename.to_string(),
                    source: err,
                },
            })?;
        return Ok(out);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn script_kind_probes() {
        assert!(is_typescript("/a/index.ts"));
        assert!(is_typescript("/a/index.d.ts.gz"));
        assert!(!is_typescript("/a/index.js"));
        assert!(is_javascript("/a/index.js.bz2"));
        assert!(!is_javascript("/a/index.ts"));
    }

    #[test]
    fn gzip_round_trip() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"export {};").expect("write");
        let compressed = encoder.finish().expect("finish");
        let out = decompress("/a/index.ts.gz", compressed).expect("decompress");
        assert_eq!(out, b"export {};");
    }

    #[test]
    fn plain_payloads_pass_through() {
        let out = decompress("/a/index.ts", b"code".to_vec()).expect("decompress");
        assert_eq!(out, b"code");
    }

    #[test]
    fn hashing_is_stable() {
        assert_eq!(sha256_hex(b"abc"), sha256_hex(b"abc"));
        assert_ne!(sha256_hex(b"abc"), sha256_hex(b"abd"));
    }
}
