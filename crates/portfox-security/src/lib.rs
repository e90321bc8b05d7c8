mod checksum;
mod sums;

pub use checksum::{digests_match, is_sha512_hex, sha512_hex, HashingWriter};
pub use sums::parse_sha512sums;
