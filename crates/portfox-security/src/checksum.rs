use std::io::{self, Write};

use sha2::{Digest, Sha512};

const SHA512_HEX_LEN: usize = 128;

pub fn sha512_hex(payload: &[u8]) -> String {
    hex::encode(Sha512::digest(payload))
}

/// Case-insensitive hex comparison, ignoring surrounding whitespace.
pub fn digests_match(expected_hex: &str, actual_hex: &str) -> bool {
    expected_hex.trim().eq_ignore_ascii_case(actual_hex.trim())
}

pub fn is_sha512_hex(value: &str) -> bool {
    value.len() == SHA512_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Writer adapter that feeds every byte written through SHA-512.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha512,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha512::new(),
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flushes the inner writer and returns it with the lowercase hex digest.
    pub fn finish(mut self) -> io::Result<(W, String)> {
        self.inner.flush()?;
        Ok((self.inner, hex::encode(self.hasher.finalize())))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA512: &str = concat!(
        "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce",
        "47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
    );
    const ABC_SHA512: &str = concat!(
        "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a",
        "2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
    );

    #[test]
    fn sha512_hex_matches_known_vectors() {
        assert_eq!(sha512_hex(b""), EMPTY_SHA512);
        assert_eq!(sha512_hex(b"abc"), ABC_SHA512);
        assert!(is_sha512_hex(ABC_SHA512));
        assert!(!is_sha512_hex("abc"));
    }

    #[test]
    fn digests_match_ignores_case_and_whitespace() {
        let upper = ABC_SHA512.to_ascii_uppercase();
        assert!(digests_match(&format!(" {upper}\n"), ABC_SHA512));
        assert!(!digests_match(EMPTY_SHA512, ABC_SHA512));
    }

    #[test]
    fn hashing_writer_digest_equals_one_shot_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"a").expect("must write");
        writer.write_all(b"bc").expect("must write");
        assert_eq!(writer.bytes_written(), 3);

        let (inner, digest) = writer.finish().expect("must finish");
        assert_eq!(inner, b"abc");
        assert_eq!(digest, ABC_SHA512);
    }
}
