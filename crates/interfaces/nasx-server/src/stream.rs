use axum::body::Body;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use nasx_pipeline::ReadyExport;
use std::io;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::flow::{RequestFlow, Stage};

// Field order matters on drop: `reader` closes before the guards delete.
struct Delivery {
    reader: ReaderStream<File>,
    export: ReadyExport,
    flow: RequestFlow,
}

impl Delivery {
    fn finish(self) {
        let Delivery {
            reader,
            mut export,
            mut flow,
        } = self;
        // Close the handle first; Windows refuses to delete open files.
        drop(reader);
        flow.advance(Stage::Sent);
        export.archive.release();
        export.staging.release();
        flow.advance(Stage::Cleaned);
    }
}

/// Streams the archive in chunks, releasing it once the stream ends.
///
/// The export guards live inside the stream, so a client that disconnects
/// or stalls past `chunk_timeout` still gets its artifacts cleaned up when
/// the body is dropped.
pub fn archive_stream(
    file: File,
    export: ReadyExport,
    flow: RequestFlow,
    chunk_timeout: Duration,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let delivery = Delivery {
        reader: ReaderStream::with_capacity(file, nasx_config::STREAM_CHUNK_BYTES),
        export,
        flow,
    };

    stream::unfold(Some(delivery), move |state| async move {
        let mut delivery = state?;
        match tokio::time::timeout(chunk_timeout, delivery.reader.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(delivery))),
            Ok(Some(Err(e))) => {
                warn!("Failed reading archive {}: {}", delivery.export.archive.path(), e);
                delivery.flow.fail(&e);
                Some((Err(e), None))
            }
            Ok(None) => {
                info!(
                    "Sent {} ({} bytes)",
                    delivery.export.archive.path(),
                    delivery.export.archive.size()
                );
                delivery.finish();
                None
            }
            Err(_) => {
                warn!("Archive stream stalled for {:?}, aborting", chunk_timeout);
                delivery.flow.fail("stream timeout");
                Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "archive stream timed out")),
                    None,
                ))
            }
        }
    })
}

pub fn archive_body(
    file: File,
    export: ReadyExport,
    flow: RequestFlow,
    chunk_timeout: Duration,
) -> Body {
    Body::from_stream(archive_stream(file, export, flow, chunk_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use nasx_core::{NasRequest, ShareMap};
    use nasx_pipeline::{ArchiveBuilder, ExportOutcome, ExportPipeline};

    async fn ready_export(src: &std::path::Path, scratch: &std::path::Path) -> ReadyExport {
        std::fs::write(src.join("a.xlsx"), vec![7u8; 200_000]).unwrap();
        let root = Utf8PathBuf::from_path_buf(src.to_path_buf()).unwrap();
        let pipeline = ExportPipeline::new(ShareMap::default()).with_archive_builder(
            ArchiveBuilder::new()
                .with_temp_root(Utf8PathBuf::from_path_buf(scratch.to_path_buf()).unwrap()),
        );
        let request = NasRequest {
            nas_path: root.to_string(),
            credentials: None,
        };
        match pipeline.export(&request).await.unwrap() {
            ExportOutcome::Ready(ready) => ready,
            ExportOutcome::Empty(_) => panic!("expected files"),
        }
    }

    #[tokio::test]
    async fn full_read_releases_archive() {
        let src = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ready = ready_export(src.path(), scratch.path()).await;
        let size = ready.archive.size();
        let file = File::open(ready.archive.path()).await.unwrap();

        let chunks: Vec<_> = archive_stream(
            file,
            ready,
            RequestFlow::start("/download-xlsx"),
            Duration::from_secs(5),
        )
        .collect()
        .await;

        let total: usize = chunks.iter().map(|c| c.as_ref().unwrap().len()).sum();
        assert_eq!(total as u64, size);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn abandoned_stream_still_cleans_up() {
        let src = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ready = ready_export(src.path(), scratch.path()).await;
        let file = File::open(ready.archive.path()).await.unwrap();

        let mut body = Box::pin(archive_stream(
            file,
            ready,
            RequestFlow::start("/download-xlsx"),
            Duration::from_secs(5),
        ));
        assert!(body.next().await.unwrap().is_ok());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 1);

        drop(body);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
