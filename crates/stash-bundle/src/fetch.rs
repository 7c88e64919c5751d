use stash_backend::{read_to_bytes, Backend};
use tracing::debug;

use crate::error::{BundleError, BundleResult};
use crate::header::{BundleHeader, MAGIC, MIN_HEADER_LEN};

/// Read and parse the prelude of the blob at `path`.
///
/// Fetches `initial_size` bytes first and grows the range to the declared
/// header length when the header is larger. Returns `Ok(None)` for blobs
/// that are not bundles.
pub async fn read_header(
    backend: &dyn Backend,
    path: &str,
    initial_size: u64,
) -> BundleResult<Option<BundleHeader>> {
    let mut want = initial_size.max(MIN_HEADER_LEN);
    loop {
        let reader = backend
            .read_range(path, 0, want)
            .await?
            .ok_or_else(|| BundleError::BlobMissing(path.to_string()))?;
        let data = read_to_bytes(reader).await?;
        let at_end = (data.len() as u64) < want;

        match BundleHeader::decode(&data) {
            Ok(header) => return Ok(Some(header)),
            Err(BundleError::NotABundle) => return Ok(None),
            // The whole blob is shorter than the magic.
            Err(BundleError::Truncated { .. }) if at_end && data.len() < MAGIC.len() => {
                return Ok(None)
            }
            Err(BundleError::Truncated { needed, .. }) if !at_end && needed > want => {
                debug!(path, needed, fetched = data.len(), "growing header fetch");
                want = needed;
            }
            Err(e) => return Err(e),
        }
    }
}
