//! One directory session per command invocation.
//!
//! A fixed `--lat/--lon` is fed through a [`ChannelPositionSource`] so the
//! directory ranks exactly as it would with a live device.

use std::time::Duration;

use gazloc_cache::CacheStore;
use gazloc_core::{AppConfig, Position};
use gazloc_engine::{
    ChannelPositionSource, DirectoryBuilder, DirectoryHandle, Fix, FixSender, PermissionStatus,
    SnapshotOrigin,
};
use gazloc_remote::RemoteDirectoryClient;
use tokio::sync::mpsc;

const FIX_WAIT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Something the directory reported since the last look.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Update {
    VendorsChanged,
    Moved,
    Failed(String),
}

pub(crate) struct Session {
    pub(crate) handle: DirectoryHandle,
    pub(crate) updates: mpsc::UnboundedReceiver<Update>,
    // dropping the sender would end the position feed
    _fixes: Option<FixSender>,
}

/// Starts the directory and waits until its first view is worth printing.
///
/// That is: the fixed position (if any) has been applied and the listing
/// has been fetched, or the fetch has failed and the cache is all there is.
///
/// # Errors
///
/// Returns an error if the remote client cannot be built from `config`.
pub(crate) async fn open<S: CacheStore>(
    config: &AppConfig,
    store: S,
    at: Option<Position>,
) -> anyhow::Result<Session> {
    let remote = RemoteDirectoryClient::from_app_config(config)?;
    let (tx, updates) = mpsc::unbounded_channel();

    let (changed, moved, failed) = (tx.clone(), tx.clone(), tx);
    let builder = DirectoryBuilder::from_app_config(config)
        .on_vendor_set_changed(move |_| {
            let _ = changed.send(Update::VendorsChanged);
        })
        .on_position_changed(move |_| {
            let _ = moved.send(Update::Moved);
        })
        .on_error(move |error| {
            tracing::warn!(error = %error, "directory error");
            let _ = failed.send(Update::Failed(error.to_string()));
        });

    let (handle, fixes) = match at {
        Some(position) => {
            let (source, fixes) = ChannelPositionSource::new(PermissionStatus::Granted);
            let handle = builder.start(store, remote, Some(source)).await;
            if !fixes.send(Fix::now(position)) {
                tracing::warn!("location tracker not running; position ignored");
            }
            (handle, Some(fixes))
        }
        None => (
            builder
                .start(store, remote, None::<ChannelPositionSource>)
                .await,
            None,
        ),
    };

    let mut session = Session {
        handle,
        updates,
        _fixes: fixes,
    };
    let settle_for = Duration::from_secs(
        config
            .request_timeout_secs
            .saturating_mul(u64::from(config.fetch_max_retries) + 1),
    );
    session.settle(at.is_some(), settle_for).await;
    Ok(session)
}

impl Session {
    async fn settle(&mut self, expect_fix: bool, timeout: Duration) {
        let mut failed = false;
        if expect_fix {
            let moved = tokio::time::timeout(FIX_WAIT, async {
                while let Some(update) = self.updates.recv().await {
                    match update {
                        Update::Moved => return,
                        Update::Failed(_) => failed = true,
                        Update::VendorsChanged => {}
                    }
                }
            })
            .await;
            if moved.is_err() {
                tracing::warn!("position not applied in time; listing in natural order");
            }
        }
        if failed {
            return;
        }

        let synced = tokio::time::timeout(timeout, async {
            loop {
                match self.handle.status().await {
                    Ok(status) if status.origin == SnapshotOrigin::Remote => return,
                    Ok(_) => {}
                    Err(_) => return,
                }
                tokio::select! {
                    update = self.updates.recv() => {
                        if matches!(update, None | Some(Update::Failed(_))) {
                            return;
                        }
                    }
                    () = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        })
        .await;
        if synced.is_err() {
            tracing::warn!("remote listing not received in time; showing cached vendors");
        }
    }

    pub(crate) async fn close(self) {
        self.handle.shutdown().await;
    }
}
