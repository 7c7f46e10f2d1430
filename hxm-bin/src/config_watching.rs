// SPDX-License-Identifier: GPL-3.0-only

//! Config file watching: a notify watcher feeds a calloop channel, whose
//! callback flags a reload for the next tick (the same path SIGHUP takes).

use calloop::channel;
use calloop::LoopHandle;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};
use x11rb::rust_connection::RustConnection;

use hxm_config::Config;

use crate::wm::Wm;

pub fn watch_config(
    handle: &LoopHandle<'static, Wm<RustConnection>>,
) -> Option<RecommendedWatcher> {
    let (tx, rx) = channel::sync_channel::<()>(4);

    if let Err(err) = handle.insert_source(rx, |event, _, wm| {
        if matches!(event, channel::Event::Msg(())) {
            debug!("config file changed on disk");
            wm.reload_pending = true;
        }
    }) {
        warn!("config watch channel failed: {err}");
        return None;
    }

    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(err) => warn!("config watcher error: {err}"),
        }
    }) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!("config watcher unavailable: {err}");
            return None;
        }
    };

    let mut watching = false;
    for path in Config::config_candidates() {
        let Some(dir) = path.parent() else { continue };
        if dir.is_dir() && watcher.watch(dir, RecursiveMode::NonRecursive).is_ok() {
            debug!(dir = %dir.display(), "watching for config changes");
            watching = true;
            break;
        }
    }
    watching.then_some(watcher)
}
