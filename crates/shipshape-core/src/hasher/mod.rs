use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Quick hashes cover at most the leading 1 MiB of a file.
pub const QUICK_HASH_LENGTH: u64 = 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// SHA-256 over at most the first `QUICK_HASH_LENGTH` bytes of the stream.
/// For inputs of 1 MiB or less this equals the full hash.
pub fn quick_hash<R: Read>(reader: R) -> io::Result<String> {
    hash_reader(reader, Some(QUICK_HASH_LENGTH))
}

/// SHA-256 over the entire stream, read in bounded chunks.
pub fn full_hash<R: Read>(reader: R) -> io::Result<String> {
    hash_reader(reader, None)
}

pub fn quick_hash_file(path: &Path) -> io::Result<String> {
    quick_hash(File::open(path)?)
}

pub fn full_hash_file(path: &Path) -> io::Result<String> {
    full_hash(File::open(path)?)
}

fn hash_reader<R: Read>(mut reader: R, limit: Option<u64>) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; READ_CHUNK];
    let mut remaining = limit.unwrap_or(u64::MAX);

    while remaining > 0 {
        let want = remaining.min(READ_CHUNK as u64) as usize;
        let read = reader.read(&mut buffer[..want])?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        remaining -= read as u64;
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn empty_input_has_well_defined_hash() {
        assert_eq!(quick_hash(Cursor::new(&[][..])).unwrap(), EMPTY_SHA256);
        assert_eq!(full_hash(Cursor::new(&[][..])).unwrap(), EMPTY_SHA256);
    }

    #[test]
    fn hashes_are_deterministic() {
        let data = b"the same bytes every time";
        let a = full_hash(Cursor::new(&data[..])).unwrap();
        let b = full_hash(Cursor::new(&data[..])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn quick_hash_ignores_bytes_past_the_limit() {
        let mut data = vec![0x42u8; QUICK_HASH_LENGTH as usize];
        let head = quick_hash(Cursor::new(data.clone())).unwrap();

        data.extend_from_slice(b"trailing bytes that quick_hash must not see");
        let head_again = quick_hash(Cursor::new(data.clone())).unwrap();
        assert_eq!(head, head_again);

        let full = full_hash(Cursor::new(data)).unwrap();
        assert_ne!(head, full);
    }

    #[test]
    fn exactly_one_mib_gives_identical_quick_and_full_digests() {
        let data = vec![0xA5u8; QUICK_HASH_LENGTH as usize];
        let quick = quick_hash(Cursor::new(data.clone())).unwrap();
        let full = full_hash(Cursor::new(data)).unwrap();
        assert_eq!(quick, full);
    }

    #[test]
    fn small_files_quick_equals_full() {
        let data = b"small file";
        let quick = quick_hash(Cursor::new(&data[..])).unwrap();
        let full = full_hash(Cursor::new(&data[..])).unwrap();
        assert_eq!(quick, full);
    }
}
