//! Line-oriented capture for spawned processes

use super::{UrlPattern, UrlSlot};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Read `stream` line by line until EOF.
///
/// Lines are matched against `pattern` until the first hit fills `slot`. After
/// that the stream is still drained, so the writer never blocks on a full pipe.
pub fn spawn_line_reader<R>(stream: R, pattern: UrlPattern, slot: UrlSlot) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(read_lines(stream, pattern, slot))
}

async fn read_lines<R>(stream: R, pattern: UrlPattern, slot: UrlSlot)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::with_capacity(256);
    let mut drained = 0u64;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if slot.is_captured() {
                    drained += 1;
                    continue;
                }
                let text = String::from_utf8_lossy(&line);
                trace!("tunnel: {}", text.trim_end());
                if let Some(url) = pattern.find(&text) {
                    if slot.offer(url.clone()) {
                        info!("Captured tunnel URL: {}", url);
                    }
                }
            }
            Err(e) => {
                debug!("Tunnel output read failed: {}", e);
                break;
            }
        }
    }

    debug!("Tunnel output closed ({} lines drained after capture)", drained);
}
