//! Background frame reader
//!
//! Producer-only task: pulls frames off the connection and queues them for
//! the control task. The first read failure (or the peer closing) is pushed
//! onto the error queue and the reader stops for good.

use crate::error::Error;
use crate::traits::{Frame, FrameStream};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::debug;

pub(super) async fn read_frames(
    mut frames: FrameStream,
    queue: mpsc::Sender<Frame>,
    errors: oneshot::Sender<Error>,
) {
    let err = loop {
        match frames.next().await {
            Some(Ok(frame)) => {
                if queue.send(frame).await.is_err() {
                    // Loop is gone, nobody to report to
                    return;
                }
            }
            Some(Err(e)) => break e,
            None => break Error::transport("Connection closed by peer"),
        }
    };

    debug!("Frame reader stopping: {}", err);
    let _ = errors.send(err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn stream_of(items: Vec<crate::Result<Frame>>) -> FrameStream {
        Box::pin(tokio_stream::iter(items))
    }

    #[tokio::test]
    async fn test_end_of_stream_is_reported_after_frames() {
        let (queue_tx, mut queue_rx) = mpsc::channel(4);
        let (err_tx, err_rx) = oneshot::channel();

        read_frames(
            stream_of(vec![Ok(b"a".to_vec()), Ok(b"b".to_vec())]),
            queue_tx,
            err_tx,
        )
        .await;

        assert_eq!(queue_rx.recv().await, Some(b"a".to_vec()));
        assert_eq!(queue_rx.recv().await, Some(b"b".to_vec()));
        let err = assert_ok!(err_rx.await);
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_first_error_stops_reading() {
        let (queue_tx, mut queue_rx) = mpsc::channel(4);
        let (err_tx, err_rx) = oneshot::channel();

        read_frames(
            stream_of(vec![
                Ok(b"a".to_vec()),
                Err(Error::transport("reset")),
                Ok(b"b".to_vec()),
            ]),
            queue_tx,
            err_tx,
        )
        .await;

        assert_eq!(queue_rx.recv().await, Some(b"a".to_vec()));
        assert_eq!(queue_rx.recv().await, None);
        let err = assert_ok!(err_rx.await);
        assert_eq!(err.to_string(), "Transport error: reset");
    }

    #[tokio::test]
    async fn test_closed_queue_stops_silently() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let (err_tx, err_rx) = oneshot::channel();
        drop(queue_rx);

        read_frames(stream_of(vec![Ok(b"a".to_vec())]), queue_tx, err_tx).await;

        assert_err!(err_rx.await);
    }
}
