use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::{self, Sender};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{Displayed, Retrieved};
use crate::photo::{PhotoLoadResult, TargetSize};
use crate::tasks::loader::ImageLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideshowOptions {
    /// How long each photo stays on screen.
    pub dwell: Duration,
    /// Start over after the last photo.
    pub repeat: bool,
    /// Decode the next photo while the current one is showing.
    pub prefetch: bool,
}

/// Position within the photo sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rotation {
    len: usize,
    current: usize,
    repeat: bool,
}

impl Rotation {
    fn new(len: usize, repeat: bool) -> Self {
        Self {
            len,
            current: 0,
            repeat,
        }
    }

    fn current(&self) -> usize {
        self.current
    }

    fn peek_next(&self) -> Option<usize> {
        if self.current + 1 < self.len {
            Some(self.current + 1)
        } else if self.repeat && self.len > 1 {
            Some(0)
        } else {
            None
        }
    }

    fn advance(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        if self.current + 1 < self.len {
            self.current += 1;
        } else if self.repeat {
            self.current = 0;
        } else {
            return None;
        }
        Some(self.current)
    }
}

/// Walk `photos` in order, one retrieval at a time, and hand every photo that
/// loads to the viewer.
///
/// Rules:
/// - Each retrieval carries a ticket; deliveries for an older ticket are dropped.
/// - A photo that fails to load is skipped immediately.
/// - Stops after a full pass of failures, at the end when not repeating, when
///   the viewer goes away, or on cancellation.
pub async fn run(
    photos: PhotoLoadResult,
    loader: ImageLoader,
    target: TargetSize,
    options: SlideshowOptions,
    to_viewer: Sender<Displayed>,
    cancel: CancellationToken,
) -> Result<()> {
    let total = photos.count();
    if total == 0 {
        info!("no photos to show");
        return Ok(());
    }
    info!(count = total, source = %photos.source(), "slideshow starting");

    let (reply_tx, mut reply_rx) = mpsc::channel::<Retrieved>(4);
    let mut rotation = Rotation::new(total, options.repeat);
    let mut ticket: u64 = 0;
    let mut failures_in_row = 0usize;
    let identifiers = photos.identifiers();

    loader.dispatch(ticket, identifiers[0].clone(), target, reply_tx.clone());

    loop {
        select! {
            _ = cancel.cancelled() => break,

            Some(delivery) = reply_rx.recv() => {
                if delivery.ticket != ticket {
                    debug!(ticket = delivery.ticket, current = ticket, "discarding stale delivery");
                    continue;
                }
                let index = rotation.current();
                match delivery.result {
                    Ok(image) => {
                        failures_in_row = 0;
                        let shown = Displayed {
                            index,
                            identifier: delivery.identifier,
                            image,
                        };
                        if to_viewer.send(shown).await.is_err() {
                            warn!("viewer channel closed");
                            break;
                        }
                        if options.prefetch
                            && let Some(next) = rotation.peek_next()
                        {
                            loader.prefetch(identifiers[next].clone(), target);
                        }
                        select! {
                            _ = cancel.cancelled() => break,
                            _ = sleep(options.dwell) => {}
                        }
                    }
                    Err(err) => {
                        failures_in_row += 1;
                        warn!(index, id = %delivery.identifier, "skipping photo: {err}");
                        if failures_in_row >= total {
                            warn!("no photo in the sequence could be loaded; stopping");
                            break;
                        }
                    }
                }

                let Some(next) = rotation.advance() else {
                    info!("reached the end of the sequence");
                    break;
                };
                ticket += 1;
                loader.dispatch(ticket, identifiers[next].clone(), target, reply_tx.clone());
            }
        }
    }
    Ok(())
}
