// SPDX-License-Identifier: GPL-3.0-only

//! Detached process spawning for autostart and bound commands.

use std::process::{Command, Stdio};

use tracing::{debug, warn};

use hxm_config::Config;

/// Spawn a config-bound command line, shlex-split, fully detached.
pub fn spawn_command(line: &str) {
    let Some(parts) = shlex::split(line) else {
        warn!(command = line, "unparseable command line");
        return;
    };
    let Some((program, args)) = parts.split_first() else {
        return;
    };
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => debug!(command = line, pid = child.id(), "spawned"),
        Err(err) => warn!(command = line, "spawn failed: {err}"),
    }
}

/// Run the autostart executable if one exists in the config fallback
/// chain.
pub fn run_autostart() {
    let Some(path) = Config::autostart_path() else {
        debug!("no autostart file");
        return;
    };
    match Command::new(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => debug!(path = %path.display(), pid = child.id(), "autostart spawned"),
        Err(err) => warn!(path = %path.display(), "autostart failed: {err}"),
    }
}
