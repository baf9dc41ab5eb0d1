use std::io::SeekFrom;
use std::path::Path;

use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{PicdexerError, Result};

const IMAGE_MIME_TYPE_PREFIX: &str = "image/";
const JPEG_MIME_TYPE: &str = "image/jpeg";
const SNIFF_LEN: usize = 8192;

/// Decides whether `path` is a picture and, when it is, mints its stable
/// content-addressed identifier: `<hex md5 of the file bytes>_<basename>`,
/// where the basename of a non-jpeg picture gets a `.jpg` suffix first.
///
/// Returns `Ok(None)` for files whose detected media type is not `image/*`.
pub async fn classify(path: &Path) -> Result<Option<String>> {
    let mut file = File::open(path).await?;

    let mut prefix = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = file.read(&mut prefix[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    let Some(kind) = infer::get(&prefix[..filled]) else {
        return Ok(None);
    };
    let mime = kind.mime_type();
    if !mime.starts_with(IMAGE_MIME_TYPE_PREFIX) {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(0)).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let mut basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PicdexerError::Internal(format!("no basename for {}", path.display()))
        })?;
    if mime != JPEG_MIME_TYPE {
        basename.push_str(".jpg");
    }

    Ok(Some(format!("{}_{}", hex::encode(hasher.finalize()), basename)))
}
