// SPDX-License-Identifier: GPL-3.0-only

//! Command line handling and the signal trampolines that talk to a
//! running instance through its `_NET_SUPPORTING_WM_CHECK` pid.

use anyhow::{anyhow, Context, Result};
use rustix::process::{kill_process, Pid, Signal};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt as _};

pub const USAGE: &str = "USAGE: hxm [--help | --exit | --restart | --reconfigure | --dump-stats]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Help,
    Exit,
    Restart,
    Reconfigure,
    DumpStats,
}

/// Parse argv. Unknown arguments are an error; the caller prints usage to
/// stderr and exits 1.
pub fn parse(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    match args.next().as_deref() {
        None => Ok(Command::Run),
        Some("--help") | Some("-h") => Ok(Command::Help),
        Some("--exit") => Ok(Command::Exit),
        Some("--restart") => Ok(Command::Restart),
        Some("--reconfigure") => Ok(Command::Reconfigure),
        Some("--dump-stats") => Ok(Command::DumpStats),
        Some(other) => Err(format!("unknown argument: {other}")),
    }
}

/// Deliver the signal for a trampoline command to the running window
/// manager, located through the EWMH supporting-check window.
pub fn signal_running_instance(command: Command) -> Result<()> {
    let signal = match command {
        Command::Exit => Signal::Term,
        Command::Restart => Signal::Usr2,
        Command::Reconfigure => Signal::Hup,
        Command::DumpStats => Signal::Usr1,
        Command::Run | Command::Help => unreachable!(),
    };
    let pid = running_instance_pid().context("no running hxm instance found")?;
    let pid = Pid::from_raw(pid as i32).ok_or_else(|| anyhow!("bad pid {pid}"))?;
    kill_process(pid, signal).context("signal delivery failed")?;
    Ok(())
}

fn running_instance_pid() -> Result<u32> {
    let (conn, screen_num) = x11rb::connect(None).context("cannot open display")?;
    let screen = &conn.setup().roots[screen_num];
    let check_atom = conn
        .intern_atom(true, b"_NET_SUPPORTING_WM_CHECK")?
        .reply()?
        .atom;
    let pid_atom = conn.intern_atom(true, b"_NET_WM_PID")?.reply()?.atom;
    if check_atom == x11rb::NONE || pid_atom == x11rb::NONE {
        return Err(anyhow!("window manager properties not present"));
    }
    let check = conn
        .get_property(false, screen.root, check_atom, AtomEnum::WINDOW, 0, 1)?
        .reply()?
        .value32()
        .and_then(|mut v| v.next())
        .ok_or_else(|| anyhow!("no _NET_SUPPORTING_WM_CHECK on root"))?;
    let pid = conn
        .get_property(false, check, pid_atom, AtomEnum::CARDINAL, 0, 1)?
        .reply()?
        .value32()
        .and_then(|mut v| v.next())
        .ok_or_else(|| anyhow!("wm-check window has no _NET_WM_PID"))?;
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(arg: &str) -> Result<Command, String> {
        parse(std::iter::once(arg.to_string()))
    }

    #[test]
    fn known_flags_parse() {
        assert_eq!(parse(std::iter::empty()), Ok(Command::Run));
        assert_eq!(parse_one("--help"), Ok(Command::Help));
        assert_eq!(parse_one("--exit"), Ok(Command::Exit));
        assert_eq!(parse_one("--restart"), Ok(Command::Restart));
        assert_eq!(parse_one("--reconfigure"), Ok(Command::Reconfigure));
        assert_eq!(parse_one("--dump-stats"), Ok(Command::DumpStats));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(parse_one("--frobnicate").is_err());
    }
}
