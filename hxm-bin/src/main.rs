// SPDX-License-Identifier: GPL-3.0-only

//! hxm: a reparenting X11 window manager built around a tick-based event
//! engine. One calloop dispatch plus one engine tick per wakeup; the X
//! transport is flushed exactly once per tick.

use std::os::unix::io::AsRawFd;
use std::os::unix::process::CommandExt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use calloop::signals::{Signal, Signals};
use calloop::EventLoop;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use x11rb::rust_connection::RustConnection;

use hxm_config::Config;

mod cli;
mod config_watching;
mod diag;
mod model;
mod monitor;
mod process;
mod util;
mod wm;
mod x11;

use wm::Wm;
use x11::{XConn, XError};

fn main() {
    init_tracing();

    let command = match cli::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };
    match command {
        cli::Command::Help => {
            println!("{}", cli::USAGE);
        }
        cli::Command::Run => {
            if let Err(err) = run() {
                error!("fatal: {err:#}");
                std::process::exit(1);
            }
        }
        trampoline => {
            if let Err(err) = cli::signal_running_instance(trampoline) {
                error!("{err:#}");
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt::layer().with_ansi(true);
    let registry = tracing_subscriber::registry().with(filter).with(fmt);
    match tracing_journald::layer() {
        Ok(journald) => registry.with(journald).init(),
        Err(_) => registry.init(),
    }
}

fn run() -> Result<()> {
    let config = Config::load();
    let (conn, screen_num) = x11rb::connect(None).context("cannot open display")?;

    let x = XConn::new(conn, screen_num).context("X initialization failed")?;
    match x.become_wm() {
        Err(XError::WmRunning) => {
            anyhow::bail!("another window manager is already running");
        }
        other => other.context("cannot take control of the root window")?,
    }

    let mut event_loop: EventLoop<'static, Wm<RustConnection>> =
        EventLoop::try_new().context("event loop setup failed")?;
    let handle = event_loop.handle();

    let mut wm = Wm::new(x, config);
    wm.init().context("window manager init failed")?;
    info!("hxm managing display");

    let fd = wm.x.conn.stream().as_raw_fd();
    handle
        .insert_source(x11::source::XFdSource::new(fd), |_, _, wm| {
            wm.fd_ready = true;
        })
        .map_err(|err| anyhow::anyhow!("X fd source: {err}"))?;

    let signals = Signals::new(&[
        Signal::SIGINT,
        Signal::SIGTERM,
        Signal::SIGHUP,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
    ])
    .context("signalfd setup failed")?;
    handle
        .insert_source(signals, |event, _, wm| match event.signal() {
            Signal::SIGINT | Signal::SIGTERM => wm.shutdown = true,
            Signal::SIGHUP => wm.reload_pending = true,
            Signal::SIGUSR1 => wm.dump_stats_pending = true,
            Signal::SIGUSR2 => wm.restart_pending = true,
            _ => {}
        })
        .map_err(|err| anyhow::anyhow!("signal source: {err}"))?;

    let _watcher = config_watching::watch_config(&handle);

    process::run_autostart();

    // startup work queued by init gets its first commit
    wm.tick(true).ok();

    while !wm.shutdown && !wm.restart_pending {
        // the gated interactive flush doubles as our only timer
        let timeout = wm
            .wakeup_at
            .take()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .map(|d| d.max(Duration::from_millis(1)));
        event_loop
            .dispatch(timeout, &mut wm)
            .context("event loop dispatch failed")?;

        if wm.reload_pending {
            wm.reload_pending = false;
            wm.reconfigure();
        }
        let fd_ready = std::mem::take(&mut wm.fd_ready);
        if let Err(err) = wm.tick(fd_ready) {
            warn!("tick failed: {err}");
        }
    }

    if wm.restart_pending {
        info!("restarting");
        wm.prepare_restart().ok();
        let exe = std::env::current_exe().context("current_exe")?;
        let err = std::process::Command::new(exe).exec();
        anyhow::bail!("exec failed: {err}");
    }

    info!("shutting down");
    wm.teardown();
    Ok(())
}
