//! Async artifact ingestion.

use std::io;
use std::time::Duration;

use contrasign_crypto::hash::READ_CHUNK_SIZE;
use contrasign_crypto::{CryptoError, Fingerprint, FingerprintHasher};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Streams `reader` through the hasher under an overall deadline.
///
/// The fingerprint is only returned once the reader reaches EOF. A stalled
/// or slow source fails with `CryptoError::Io` of kind `TimedOut`.
pub async fn fingerprint_stream<R>(
    reader: R,
    timeout: Duration,
) -> Result<(Fingerprint, u64), CryptoError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, hash_to_end(reader)).await {
        Ok(result) => result,
        Err(_) => Err(CryptoError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("artifact stream did not finish within {:?}", timeout),
        ))),
    }
}

async fn hash_to_end<R: AsyncRead + Unpin>(mut reader: R) -> Result<(Fingerprint, u64), CryptoError> {
    let mut hasher = FingerprintHasher::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
