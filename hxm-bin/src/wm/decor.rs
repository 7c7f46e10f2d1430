// SPDX-License-Identifier: GPL-3.0-only

//! Frame decoration collaborator. The core hands it a frame, a damage
//! region, and the focus state; it paints flat titlebar/border fills and
//! nothing else. Pixel work beyond that is out of scope for the engine.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ChangeGCAux, ConnectionExt as _, Gcontext, Rectangle};

use hxm_config::{Config, Theme};

use crate::model::ClientHot;
use crate::util::Rect;
use crate::x11::{XConn, XError};

/// Frame insets for a client, derived from config and the client's
/// decoration flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInsets {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl FrameInsets {
    pub fn for_client(config: &Config, hot: &ClientHot) -> Self {
        if !hot.decorated() {
            return Self::default();
        }
        let b = config.border_width as u32;
        Self { left: b, right: b, top: b + config.titlebar_height as u32, bottom: b }
    }

    /// Frame rect for a client-area rect.
    pub fn frame_rect(&self, client: &Rect) -> Rect {
        Rect::new(
            client.x - self.left as i32,
            client.y - self.top as i32,
            client.w + self.left + self.right,
            client.h + self.top + self.bottom,
        )
    }

    /// Client position within the frame.
    pub fn client_offset(&self) -> (i32, i32) {
        (self.left as i32, self.top as i32)
    }
}

#[derive(Debug, Default)]
pub struct Decor {
    gc: Gcontext,
}

impl Decor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init<C: Connection>(&mut self, x: &XConn<C>) -> Result<(), XError> {
        let gc = x.conn.generate_id()?;
        x.conn.create_gc(gc, x.root, &Default::default())?;
        self.gc = gc;
        Ok(())
    }

    /// Repaint the damaged part of a frame. Idempotent; used both for
    /// Expose and for dirty-flag driven redraws (full frame).
    pub fn frame_redraw<C: Connection>(
        &self,
        x: &XConn<C>,
        theme: &Theme,
        hot: &ClientHot,
        insets: FrameInsets,
        focused: bool,
        region: Option<Rect>,
    ) -> Result<(), XError> {
        if hot.frame == 0 || !hot.decorated() {
            return Ok(());
        }
        let frame = insets.frame_rect(&hot.desired);
        let full = Rect::new(0, 0, frame.w, frame.h);
        let area = match region {
            Some(r) => match r.intersect(&full) {
                Some(clipped) => clipped,
                None => return Ok(()),
            },
            None => full,
        };
        let border = if focused { theme.active_border } else { theme.inactive_border };
        let titlebar = if focused { theme.titlebar_active } else { theme.titlebar_inactive };

        x.conn.change_gc(self.gc, &ChangeGCAux::new().foreground(border))?;
        x.conn.poly_fill_rectangle(
            hot.frame,
            self.gc,
            &[Rectangle {
                x: area.x as i16,
                y: area.y as i16,
                width: area.w as u16,
                height: area.h as u16,
            }],
        )?;
        if insets.top > insets.left {
            let bar_h = insets.top - insets.left;
            x.conn.change_gc(self.gc, &ChangeGCAux::new().foreground(titlebar))?;
            x.conn.poly_fill_rectangle(
                hot.frame,
                self.gc,
                &[Rectangle {
                    x: insets.left as i16,
                    y: insets.left as i16,
                    width: (frame.w - insets.left - insets.right) as u16,
                    height: bar_h as u16,
                }],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WinState;

    #[test]
    fn insets_follow_decoration_state() {
        let config = Config::default();
        let mut hot = ClientHot::new(1);
        let insets = FrameInsets::for_client(&config, &hot);
        assert_eq!(insets.top, (config.border_width + config.titlebar_height) as u32);
        hot.state |= WinState::FULLSCREEN;
        assert_eq!(FrameInsets::for_client(&config, &hot), FrameInsets::default());
    }

    #[test]
    fn frame_rect_round_trips_offset() {
        let insets = FrameInsets { left: 2, right: 2, top: 20, bottom: 2 };
        let client = Rect::new(100, 100, 640, 480);
        let frame = insets.frame_rect(&client);
        assert_eq!(frame, Rect::new(98, 80, 644, 502));
        assert_eq!(insets.client_offset(), (2, 20));
    }
}
