//! Pluggable content fingerprints

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::File;
use std::io;

/// Turns an open file into a comparable content signature.
///
/// Implemented for any `Fn(&mut File) -> io::Result<T>` closure, so callers
/// can inject a fingerprint without defining a type.
pub trait Fingerprinter: Send + Sync {
    /// The fingerprint value; persisted verbatim in snapshots
    type Output: Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned;

    /// Compute the fingerprint of `file`, read from its current position
    fn fingerprint(&self, file: &mut File) -> io::Result<Self::Output>;
}

impl<F, T> Fingerprinter for F
where
    F: Fn(&mut File) -> io::Result<T> + Send + Sync,
    T: Clone + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned,
{
    type Output = T;

    fn fingerprint(&self, file: &mut File) -> io::Result<T> {
        self(file)
    }
}

/// Streaming MD5 of the whole file, as lowercase hex
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Fingerprinter;

impl Fingerprinter for Md5Fingerprinter {
    type Output = String;

    fn fingerprint(&self, file: &mut File) -> io::Result<String> {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        io::copy(file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    #[test]
    fn test_md5_fingerprint() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"hello world").unwrap();

        let mut file = File::open(tmp.path()).unwrap();
        let hash = Md5Fingerprinter.fingerprint(&mut file).unwrap();
        assert_eq!(hash, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_md5_empty_file() {
        let tmp = NamedTempFile::new().unwrap();
        let mut file = File::open(tmp.path()).unwrap();
        let hash = Md5Fingerprinter.fingerprint(&mut file).unwrap();
        assert_eq!(hash, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_closure_fingerprinter() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"abc").unwrap();

        let by_len = |file: &mut File| -> io::Result<usize> {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf.len())
        };
        let mut file = File::open(tmp.path()).unwrap();
        assert_eq!(by_len.fingerprint(&mut file).unwrap(), 3);
    }
}
