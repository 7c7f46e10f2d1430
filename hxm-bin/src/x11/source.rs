// SPDX-License-Identifier: GPL-3.0-only

//! calloop event source for the X connection fd. The source only reports
//! readability; the tick loop owns all reads so that event ingest, cookie
//! draining, and the commit phase happen in one place, in order.

use std::os::unix::io::RawFd;

use calloop::generic::{FdWrapper, Generic};
use calloop::{EventSource, Interest, Mode, Poll, PostAction, Readiness, Token, TokenFactory};

pub struct XFdSource {
    inner: Generic<FdWrapper<RawFd>>,
}

impl XFdSource {
    /// Safety: the caller keeps the connection (and its fd) alive for the
    /// lifetime of the event loop.
    pub fn new(fd: RawFd) -> Self {
        let wrapper = unsafe { FdWrapper::new(fd) };
        Self { inner: Generic::new(wrapper, Interest::READ, Mode::Level) }
    }
}

impl EventSource for XFdSource {
    type Event = ();
    type Metadata = ();
    type Ret = ();
    type Error = std::io::Error;

    fn process_events<F>(
        &mut self,
        readiness: Readiness,
        token: Token,
        mut callback: F,
    ) -> Result<PostAction, Self::Error>
    where
        F: FnMut(Self::Event, &mut Self::Metadata) -> Self::Ret,
    {
        self.inner.process_events(readiness, token, |_, _| {
            callback((), &mut ());
            Ok(PostAction::Continue)
        })
    }

    fn register(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.inner.register(poll, factory)
    }

    fn reregister(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.inner.reregister(poll, factory)
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.inner.unregister(poll)
    }
}
