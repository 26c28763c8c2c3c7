//! MJPEG framing over a blocking frame producer.

use actix_web::web::{self, Bytes};
use async_stream::stream;
use futures_util::Stream;
use tracing::{error, info};

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Wrap one JPEG as a multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 48);
    payload.extend_from_slice(b"--frame\r\n");
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// Turn a blocking JPEG producer into a multipart body stream.
///
/// `start` and every `next` run on the blocking pool, one at a time, and the
/// next frame is only requested once the previous part has been consumed.
/// The producer is dropped exactly once: when the frames run out, when the
/// consumer drops the stream, or while unwinding if `next` panics.
pub fn mjpeg_stream<F, I>(start: F) -> impl Stream<Item = Result<Bytes, actix_web::Error>>
where
    F: FnOnce() -> anyhow::Result<I> + Send + 'static,
    I: Iterator<Item = Vec<u8>> + Send + 'static,
{
    stream! {
        let mut frames = match web::block(start).await {
            Ok(Ok(frames)) => frames,
            Ok(Err(err)) => {
                error!("failed to start frame pipeline: {err:#}");
                return;
            }
            Err(err) => {
                error!(%err, "failed to start frame pipeline");
                return;
            }
        };
        info!("mjpeg stream started");

        let mut parts: u64 = 0;
        loop {
            let (returned, jpeg) = match web::block(move || {
                let jpeg = frames.next();
                (frames, jpeg)
            })
            .await
            {
                Ok(result) => result,
                Err(err) => {
                    // the producer was dropped on the blocking thread
                    error!(%err, "frame producer panicked");
                    return;
                }
            };
            frames = returned;

            match jpeg {
                Some(jpeg) => {
                    parts += 1;
                    yield Ok::<Bytes, actix_web::Error>(multipart_part(&jpeg));
                }
                None => break,
            }
        }
        drop(frames);
        info!(parts, "mjpeg stream ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountedFrames {
        remaining: Option<usize>,
        drops: Arc<AtomicUsize>,
    }

    impl Iterator for CountedFrames {
        type Item = Vec<u8>;

        fn next(&mut self) -> Option<Vec<u8>> {
            if self.remaining == Some(0) {
                return None;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            Some(vec![0xFF, 0xD8, 0xFF, 0xD9])
        }
    }

    impl Drop for CountedFrames {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn part_is_framed_with_boundary_and_header() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n"
        );
    }

    #[actix_web::test]
    async fn stream_ends_with_producer() {
        let drops = Arc::new(AtomicUsize::new(0));
        let counter = drops.clone();
        let parts: Vec<_> = mjpeg_stream(move || {
            Ok(CountedFrames {
                remaining: Some(3),
                drops: counter,
            })
        })
        .collect()
        .await;

        assert_eq!(parts.len(), 3);
        for part in parts {
            assert_eq!(
                &part.unwrap()[..],
                b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8\xFF\xD9\r\n"
            );
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn failed_start_yields_nothing() {
        let parts: Vec<_> =
            mjpeg_stream(|| -> anyhow::Result<CountedFrames> { anyhow::bail!("no camera") })
                .collect()
                .await;
        assert!(parts.is_empty());
    }

    #[actix_web::test]
    async fn dropping_stream_drops_producer_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let counter = drops.clone();
        let mut stream = Box::pin(mjpeg_stream(move || {
            Ok(CountedFrames {
                remaining: None,
                drops: counter,
            })
        }));

        for _ in 0..4 {
            assert!(stream.next().await.unwrap().is_ok());
        }
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
