//! Content digests used for change detection.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Hex-encoded SHA-256 of everything `reader` yields.
pub async fn digest_reader<R>(reader: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded SHA-256 of an in-memory buffer.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn digest_of_empty_input() {
        assert_eq!(digest_bytes(b""), EMPTY_SHA256);
    }

    #[tokio::test]
    async fn streaming_digest_matches_buffer_digest() {
        let payload = vec![7_u8; READ_CHUNK_BYTES * 2 + 13];
        let mut reader = payload.as_slice();

        let streamed = digest_reader(&mut reader).await.expect("digest");
        assert_eq!(streamed, digest_bytes(&payload));
    }
}
