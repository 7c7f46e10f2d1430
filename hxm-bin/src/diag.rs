// SPDX-License-Identifier: GPL-3.0-only

//! Engine counters, dumped on SIGUSR1 or `--dump-stats`.

use tracing::info;

#[derive(Debug, Default)]
pub struct Counters {
    pub ticks: u64,
    pub events_ingested: u64,
    pub events_coalesced: u64,
    pub events_dropped: u64,
    pub x_errors: u64,
    pub cookies_issued: u64,
    pub cookies_harvested: u64,
    pub cookies_errored: u64,
    pub cookies_timed_out: u64,
    pub stale_replies: u64,
    pub configures_emitted: u64,
    pub configures_suppressed: u64,
    pub restacks: u64,
    pub focus_commits: u64,
    pub manages: u64,
    pub manage_aborts: u64,
    pub unmanages: u64,
}

impl Counters {
    pub fn dump(&self) {
        info!(
            ticks = self.ticks,
            events_ingested = self.events_ingested,
            events_coalesced = self.events_coalesced,
            events_dropped = self.events_dropped,
            x_errors = self.x_errors,
            "event engine"
        );
        info!(
            issued = self.cookies_issued,
            harvested = self.cookies_harvested,
            errored = self.cookies_errored,
            timed_out = self.cookies_timed_out,
            stale = self.stale_replies,
            "cookie jar"
        );
        info!(
            configures = self.configures_emitted,
            suppressed = self.configures_suppressed,
            restacks = self.restacks,
            focus_commits = self.focus_commits,
            manages = self.manages,
            manage_aborts = self.manage_aborts,
            unmanages = self.unmanages,
            "commit"
        );
    }
}
