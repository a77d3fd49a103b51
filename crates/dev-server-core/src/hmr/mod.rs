//! HMR Notifier (spec §4.F).

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::WatcherError;
use crate::vfs::{VirtualPath, Vfs, WatchHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    Update,
    FullReload,
}

#[derive(Debug, Clone)]
pub struct HmrEvent {
    pub kind: UpdateKind,
    pub path: String,
}

/// A postMessage-style sink a host can register to receive HMR events in
/// addition to the in-process broadcast channel (e.g. forwarding into a
/// sandboxed iframe). Best-effort: a send error here never affects
/// dispatch.
pub trait PostMessageSink: Send + Sync {
    fn send(&self, channel: &str, event: &HmrEvent);
}

const CHANNEL_CAPACITY: usize = 256;
const CHANNEL_TAG: &str = "dev-server-hmr";

pub struct HmrNotifier {
    sender: broadcast::Sender<HmrEvent>,
    post_message: Option<Arc<dyn PostMessageSink>>,
    _handles: Vec<Box<dyn WatchHandle>>,
}

impl HmrNotifier {
    /// Watches the pages, app, and public directories recursively. A
    /// directory that fails to attach a watcher logs a warning and is
    /// simply excluded from HMR -- dispatch is unaffected (spec §7
    /// `WatcherError`).
    pub fn start(vfs: &dyn Vfs, config: &Config, post_message: Option<Arc<dyn PostMessageSink>>) -> HmrNotifier {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let mut handles = Vec::new();

        for root in [&config.pages_dir, &config.app_dir, &config.public_dir] {
            match Self::watch_root(vfs, root, sender.clone(), post_message.clone()) {
                Ok(handle) => handles.push(handle),
                Err(err) => tracing::warn!(path = %root, error = %err, "failed to attach HMR watcher"),
            }
        }

        HmrNotifier {
            sender,
            post_message,
            _handles: handles,
        }
    }

    fn watch_root(
        vfs: &dyn Vfs,
        root: &VirtualPath,
        sender: broadcast::Sender<HmrEvent>,
        post_message: Option<Arc<dyn PostMessageSink>>,
    ) -> Result<Box<dyn WatchHandle>, WatcherError> {
        let root_owned = root.clone();
        vfs.watch(
            root,
            Box::new(move |changed_path| {
                let event = classify(&changed_path);
                let _ = sender.send(event.clone());
                if let Some(sink) = &post_message {
                    sink.send(CHANNEL_TAG, &event);
                }
            }),
        )
        .map_err(|err| WatcherError::AttachFailed {
            path: root_owned.to_string(),
            message: err.to_string(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HmrEvent> {
        self.sender.subscribe()
    }
}

fn classify(path: &VirtualPath) -> HmrEvent {
    let kind = match path.extension() {
        Some("css") => UpdateKind::Update,
        Some("js") | Some("jsx") | Some("ts") | Some("tsx") => UpdateKind::Update,
        _ => UpdateKind::FullReload,
    };
    HmrEvent {
        kind,
        path: path.to_string(),
    }
}
