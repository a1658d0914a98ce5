//! Camera-backed QR capture.
//!
//! A [`ScanSession`] consumes decoded frames from any text stream and hands
//! back the first usable code. Capture stops as soon as a code is taken or the
//! session is cancelled, which drops the frame source and releases the camera.

use crate::domain::ids::QrToken;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ScanSession<S> {
    frames: Option<S>,
    cancel: CancellationToken,
}

impl<S> ScanSession<S>
where
    S: Stream<Item = String> + Unpin,
{
    pub fn new(frames: S) -> Self {
        Self {
            frames: Some(frames),
            cancel: CancellationToken::new(),
        }
    }

    /// Handle for stopping the scan from elsewhere, e.g. when the screen closes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.frames.is_some()
    }

    /// Waits for the first frame that decodes to a non-blank code.
    ///
    /// Returns `None` if the session was cancelled, the source ended, or a
    /// code was already taken. Either way capture is stopped afterwards.
    pub async fn next_code(&mut self) -> Option<QrToken> {
        let frames = self.frames.as_mut()?;
        let code = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break None,
                frame = frames.next() => match frame {
                    Some(text) => {
                        if let Some(code) = QrToken::parse(&text) {
                            break Some(code);
                        }
                    }
                    None => break None,
                },
            }
        };

        debug!(code = ?code, "scan finished");
        self.frames = None;
        code
    }

    /// Stops capture without waiting for a code.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.frames = None;
    }
}
