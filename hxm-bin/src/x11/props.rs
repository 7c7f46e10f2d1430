// SPDX-License-Identifier: GPL-3.0-only

//! Typed parsers for client property payloads. Every parser takes the raw
//! property bytes and returns a structured value or `None`; a malformed
//! property never overwrites existing state, the caller just keeps the
//! previous value.

use x11rb::protocol::xproto::{Atom, Window};

use super::atoms::Atoms;
use crate::model::{Extents, Icon, SizeHints, StrutPartial, WinState, WindowType};
use crate::util::Rect;

/// Titles are truncated to this many bytes (on a char boundary).
pub const MAX_TITLE_BYTES: usize = 4096;

const ICON_MAX_DIM: u32 = 512;
const ICON_MAX_PIXELS: u64 = (ICON_MAX_DIM as u64) * (ICON_MAX_DIM as u64);
const ICON_MAX_TOTAL_PIXELS: u64 = 1 << 21;
const ICON_TARGET_SIZES: [u32; 5] = [16, 24, 32, 48, 64];

/// `_NET_WM_STATE` client message actions.
pub const STATE_REMOVE: u32 = 0;
pub const STATE_ADD: u32 = 1;
pub const STATE_TOGGLE: u32 = 2;

fn cards(value: &[u8]) -> impl Iterator<Item = u32> + '_ {
    value.chunks_exact(4).map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
}

/// Strict UTF-8 text: rejects invalid sequences outright, truncates long
/// values, and treats empty text as absent so name fallbacks can fire.
pub fn parse_utf8_text(value: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(value).ok()?;
    if text.is_empty() {
        return None;
    }
    if text.len() <= MAX_TITLE_BYTES {
        return Some(text.to_owned());
    }
    let mut cut = MAX_TITLE_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    Some(text[..cut].to_owned())
}

/// WM_CLASS: two NUL-delimited strings, instance then class.
pub fn parse_wm_class(value: &[u8]) -> Option<(String, String)> {
    let mut parts = value.split(|b| *b == 0);
    let instance = std::str::from_utf8(parts.next()?).ok()?;
    let class = std::str::from_utf8(parts.next()?).ok()?;
    Some((instance.to_owned(), class.to_owned()))
}

/// Latin-1 text for legacy ICCCM strings (WM_NAME, WM_CLIENT_MACHINE, ...).
pub fn parse_latin1_text(value: &[u8]) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let text: String = value.iter().take(MAX_TITLE_BYTES).map(|b| *b as char).collect();
    Some(text)
}

/// First recognized `_NET_WM_WINDOW_TYPE` atom wins.
pub fn parse_window_type(atoms: &Atoms, value: &[u8]) -> Option<WindowType> {
    cards(value).find_map(|atom| window_type_from_atom(atoms, atom))
}

pub fn window_type_from_atom(atoms: &Atoms, atom: Atom) -> Option<WindowType> {
    Some(match atom {
        a if a == atoms._NET_WM_WINDOW_TYPE_NORMAL => WindowType::Normal,
        a if a == atoms._NET_WM_WINDOW_TYPE_DIALOG => WindowType::Dialog,
        a if a == atoms._NET_WM_WINDOW_TYPE_DOCK => WindowType::Dock,
        a if a == atoms._NET_WM_WINDOW_TYPE_DESKTOP => WindowType::Desktop,
        a if a == atoms._NET_WM_WINDOW_TYPE_SPLASH => WindowType::Splash,
        a if a == atoms._NET_WM_WINDOW_TYPE_TOOLBAR => WindowType::Toolbar,
        a if a == atoms._NET_WM_WINDOW_TYPE_UTILITY => WindowType::Utility,
        a if a == atoms._NET_WM_WINDOW_TYPE_MENU => WindowType::Menu,
        a if a == atoms._NET_WM_WINDOW_TYPE_DROPDOWN_MENU => WindowType::DropdownMenu,
        a if a == atoms._NET_WM_WINDOW_TYPE_POPUP_MENU => WindowType::PopupMenu,
        a if a == atoms._NET_WM_WINDOW_TYPE_TOOLTIP => WindowType::Tooltip,
        a if a == atoms._NET_WM_WINDOW_TYPE_COMBO => WindowType::Combo,
        a if a == atoms._NET_WM_WINDOW_TYPE_DND => WindowType::Dnd,
        a if a == atoms._NET_WM_WINDOW_TYPE_NOTIFICATION => WindowType::Notification,
        _ => return None,
    })
}

pub fn state_bit_from_atom(atoms: &Atoms, atom: Atom) -> Option<WinState> {
    Some(match atom {
        a if a == atoms._NET_WM_STATE_MAXIMIZED_HORZ => WinState::MAXIMIZED_H,
        a if a == atoms._NET_WM_STATE_MAXIMIZED_VERT => WinState::MAXIMIZED_V,
        a if a == atoms._NET_WM_STATE_ABOVE => WinState::ABOVE,
        a if a == atoms._NET_WM_STATE_BELOW => WinState::BELOW,
        a if a == atoms._NET_WM_STATE_STICKY => WinState::STICKY,
        a if a == atoms._NET_WM_STATE_SKIP_TASKBAR => WinState::SKIP_TASKBAR,
        a if a == atoms._NET_WM_STATE_SKIP_PAGER => WinState::SKIP_PAGER,
        a if a == atoms._NET_WM_STATE_FULLSCREEN => WinState::FULLSCREEN,
        a if a == atoms._NET_WM_STATE_HIDDEN => WinState::HIDDEN,
        a if a == atoms._NET_WM_STATE_MODAL => WinState::MODAL,
        a if a == atoms._NET_WM_STATE_SHADED => WinState::SHADED,
        a if a == atoms._NET_WM_STATE_DEMANDS_ATTENTION => WinState::DEMANDS_ATTENTION,
        a if a == atoms._NET_WM_STATE_FOCUSED => WinState::FOCUSED,
        _ => return None,
    })
}

/// Parse a `_NET_WM_STATE` property value into the accepted state bits.
pub fn parse_state_atoms(atoms: &Atoms, value: &[u8]) -> WinState {
    cards(value)
        .filter_map(|atom| state_bit_from_atom(atoms, atom))
        .fold(WinState::empty(), |acc, bit| acc | bit)
}

/// Serialize state bits back into the atom list the property carries.
/// Emitting and re-parsing a parsed set yields the same set.
pub fn state_to_atoms(atoms: &Atoms, state: WinState) -> Vec<Atom> {
    let table = [
        (WinState::MAXIMIZED_H, atoms._NET_WM_STATE_MAXIMIZED_HORZ),
        (WinState::MAXIMIZED_V, atoms._NET_WM_STATE_MAXIMIZED_VERT),
        (WinState::ABOVE, atoms._NET_WM_STATE_ABOVE),
        (WinState::BELOW, atoms._NET_WM_STATE_BELOW),
        (WinState::STICKY, atoms._NET_WM_STATE_STICKY),
        (WinState::SKIP_TASKBAR, atoms._NET_WM_STATE_SKIP_TASKBAR),
        (WinState::SKIP_PAGER, atoms._NET_WM_STATE_SKIP_PAGER),
        (WinState::FULLSCREEN, atoms._NET_WM_STATE_FULLSCREEN),
        (WinState::HIDDEN, atoms._NET_WM_STATE_HIDDEN),
        (WinState::MODAL, atoms._NET_WM_STATE_MODAL),
        (WinState::SHADED, atoms._NET_WM_STATE_SHADED),
        (WinState::DEMANDS_ATTENTION, atoms._NET_WM_STATE_DEMANDS_ATTENTION),
        (WinState::FOCUSED, atoms._NET_WM_STATE_FOCUSED),
    ];
    table.into_iter().filter(|(bit, _)| state.contains(*bit)).map(|(_, atom)| atom).collect()
}

/// The apply-state-set transform: reconcile the current set with one
/// requested change (remove/add/toggle over the bits named by the message).
pub fn apply_state_action(current: WinState, action: u32, bits: WinState) -> Option<WinState> {
    match action {
        STATE_REMOVE => Some(current - bits),
        STATE_ADD => Some(current | bits),
        STATE_TOGGLE => Some(current ^ bits),
        _ => None,
    }
}

/// `_NET_WM_STRUT_PARTIAL`: exactly 12 cardinals.
pub fn parse_strut_partial(value: &[u8]) -> Option<StrutPartial> {
    let v: Vec<u32> = cards(value).collect();
    if v.len() != 12 {
        return None;
    }
    let mut strut = StrutPartial {
        left: v[0],
        right: v[1],
        top: v[2],
        bottom: v[3],
        left_start_y: v[4],
        left_end_y: v[5],
        right_start_y: v[6],
        right_end_y: v[7],
        top_start_x: v[8],
        top_end_x: v[9],
        bottom_start_x: v[10],
        bottom_end_x: v[11],
    };
    strut.sanitize();
    Some(strut)
}

/// Legacy `_NET_WM_STRUT`: 4 cardinals, widened to full-span ranges.
pub fn parse_strut_legacy(value: &[u8], screen: (u16, u16)) -> Option<StrutPartial> {
    let v: Vec<u32> = cards(value).collect();
    if v.len() != 4 {
        return None;
    }
    Some(StrutPartial {
        left: v[0],
        right: v[1],
        top: v[2],
        bottom: v[3],
        left_start_y: 0,
        left_end_y: screen.1 as u32,
        right_start_y: 0,
        right_end_y: screen.1 as u32,
        top_start_x: 0,
        top_end_x: screen.0 as u32,
        bottom_start_x: 0,
        bottom_end_x: screen.0 as u32,
    })
}

pub fn parse_cardinal(value: &[u8]) -> Option<u32> {
    cards(value).next()
}

pub fn parse_window(value: &[u8]) -> Option<Window> {
    cards(value).next()
}

pub fn parse_window_list(value: &[u8]) -> Vec<Window> {
    cards(value).collect()
}

/// `_MOTIF_WM_HINTS`: 5 cardinals; when the decorations flag (bit 1) is
/// set, a zero decorations field disables the frame.
pub fn parse_motif_decor(value: &[u8]) -> Option<bool> {
    let v: Vec<u32> = cards(value).take(5).collect();
    if v.len() < 3 {
        return None;
    }
    const MWM_HINTS_DECORATIONS: u32 = 1 << 1;
    if v[0] & MWM_HINTS_DECORATIONS == 0 {
        return None;
    }
    Some(v[2] != 0)
}

/// `_GTK_FRAME_EXTENTS`: left, right, top, bottom.
pub fn parse_gtk_frame_extents(value: &[u8]) -> Option<Extents> {
    let v: Vec<u32> = cards(value).collect();
    if v.len() != 4 {
        return None;
    }
    Some(Extents { left: v[0], right: v[1], top: v[2], bottom: v[3] })
}

/// `_NET_WM_ICON_GEOMETRY`: x, y, width, height.
pub fn parse_icon_geometry(value: &[u8]) -> Option<Rect> {
    let v: Vec<u32> = cards(value).collect();
    if v.len() != 4 || v[2] == 0 || v[3] == 0 {
        return None;
    }
    Some(Rect::new(v[0] as i32, v[1] as i32, v[2], v[3]))
}

pub fn parse_fullscreen_monitors(value: &[u8]) -> Option<[u32; 4]> {
    let v: Vec<u32> = cards(value).collect();
    if v.len() < 4 {
        return None;
    }
    Some([v[0], v[1], v[2], v[3]])
}

/// `_NET_WM_ICON`: pick the entry closest to the preferred sizes and store
/// it with premultiplied alpha. Oversized entries and trailing garbage are
/// skipped; the scan stops at the total-pixel cap.
pub fn parse_icon(value: &[u8]) -> Option<Icon> {
    let v: Vec<u32> = cards(value).collect();
    let mut entries = Vec::new();
    let mut i = 0usize;
    let mut total: u64 = 0;
    while i + 2 <= v.len() {
        let (w, h) = (v[i], v[i + 1]);
        let pixels = w as u64 * h as u64;
        if w == 0 || h == 0 || i + 2 + pixels as usize > v.len() {
            break;
        }
        total += pixels;
        if total > ICON_MAX_TOTAL_PIXELS {
            break;
        }
        if w <= ICON_MAX_DIM && h <= ICON_MAX_DIM && pixels <= ICON_MAX_PIXELS {
            entries.push((w, h, i + 2));
        }
        i += 2 + pixels as usize;
    }
    let (w, h, offset) = entries.into_iter().min_by_key(|(w, h, _)| {
        ICON_TARGET_SIZES
            .iter()
            .map(|t| (w.abs_diff(*t) + h.abs_diff(*t)) as u64)
            .min()
            .unwrap_or(u64::MAX)
    })?;
    let pixels = (w * h) as usize;
    let data = v[offset..offset + pixels].iter().map(|argb| premultiply(*argb)).collect();
    Some(Icon { width: w, height: h, pixels: data })
}

fn premultiply(argb: u32) -> u32 {
    let a = argb >> 24;
    let mul = |c: u32| (c * a + 127) / 255;
    (a << 24) | (mul((argb >> 16) & 0xff) << 16) | (mul((argb >> 8) & 0xff) << 8) | mul(argb & 0xff)
}

/// Clamp a desired client size to WM_NORMAL_HINTS: min/max bounds, resize
/// increments relative to the base (or min) size, and the aspect band.
pub fn constrain_to_hints(hints: &SizeHints, w: u32, h: u32) -> (u32, u32) {
    if !hints.valid {
        return (w.max(1), h.max(1));
    }
    let (min_w, min_h) = hints.min.unwrap_or((1, 1));
    let (max_w, max_h) = hints.max.unwrap_or((u32::MAX, u32::MAX));
    let mut w = w.clamp(min_w.max(1), max_w.max(1));
    let mut h = h.clamp(min_h.max(1), max_h.max(1));

    if let Some((min_aspect, max_aspect)) = hints.aspect {
        let ratio = w as f64 / h as f64;
        if min_aspect > 0.0 && ratio < min_aspect {
            h = ((w as f64 / min_aspect).round() as u32).clamp(min_h.max(1), max_h.max(1));
        } else if max_aspect > 0.0 && ratio > max_aspect {
            w = ((h as f64 * max_aspect).round() as u32).clamp(min_w.max(1), max_w.max(1));
        }
    }

    if let Some((inc_w, inc_h)) = hints.inc {
        let (base_w, base_h) = hints.base.or(hints.min).unwrap_or((0, 0));
        if inc_w > 0 && w > base_w {
            w = base_w + (w - base_w) / inc_w * inc_w;
        }
        if inc_h > 0 && h > base_h {
            h = base_h + (h - base_h) / inc_h * inc_h;
        }
        w = w.max(min_w.max(1));
        h = h.max(min_h.max(1));
    }
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_atoms() -> Atoms {
        // field order matches the declaration in atoms.rs; values only need
        // to be distinct for parser tests
        let mut next = 100u32;
        let mut gen = || {
            next += 1;
            next
        };
        Atoms {
            UTF8_STRING: gen(),
            WM_PROTOCOLS: gen(),
            WM_DELETE_WINDOW: gen(),
            WM_TAKE_FOCUS: gen(),
            WM_STATE: gen(),
            WM_CHANGE_STATE: gen(),
            WM_CLIENT_MACHINE: gen(),
            WM_COLORMAP_WINDOWS: gen(),
            WM_S0: gen(),
            _NET_SUPPORTED: gen(),
            _NET_SUPPORTING_WM_CHECK: gen(),
            _NET_CLIENT_LIST: gen(),
            _NET_CLIENT_LIST_STACKING: gen(),
            _NET_ACTIVE_WINDOW: gen(),
            _NET_CURRENT_DESKTOP: gen(),
            _NET_NUMBER_OF_DESKTOPS: gen(),
            _NET_DESKTOP_NAMES: gen(),
            _NET_DESKTOP_GEOMETRY: gen(),
            _NET_DESKTOP_VIEWPORT: gen(),
            _NET_VIRTUAL_ROOTS: gen(),
            _NET_WORKAREA: gen(),
            _NET_SHOWING_DESKTOP: gen(),
            _NET_WM_NAME: gen(),
            _NET_WM_ICON_NAME: gen(),
            _NET_WM_PID: gen(),
            _NET_WM_DESKTOP: gen(),
            _NET_WM_ICON: gen(),
            _NET_WM_ICON_GEOMETRY: gen(),
            _NET_WM_USER_TIME: gen(),
            _NET_WM_USER_TIME_WINDOW: gen(),
            _NET_WM_WINDOW_OPACITY: gen(),
            _NET_WM_STRUT: gen(),
            _NET_WM_STRUT_PARTIAL: gen(),
            _NET_FRAME_EXTENTS: gen(),
            _NET_REQUEST_FRAME_EXTENTS: gen(),
            _NET_WM_ALLOWED_ACTIONS: gen(),
            _NET_WM_FULLSCREEN_MONITORS: gen(),
            _NET_CLOSE_WINDOW: gen(),
            _NET_WM_MOVERESIZE: gen(),
            _NET_MOVERESIZE_WINDOW: gen(),
            _NET_RESTACK_WINDOW: gen(),
            _NET_WM_PING: gen(),
            _NET_WM_SYNC_REQUEST: gen(),
            _NET_WM_SYNC_REQUEST_COUNTER: gen(),
            _NET_WM_WINDOW_TYPE: gen(),
            _NET_WM_WINDOW_TYPE_DESKTOP: gen(),
            _NET_WM_WINDOW_TYPE_DOCK: gen(),
            _NET_WM_WINDOW_TYPE_TOOLBAR: gen(),
            _NET_WM_WINDOW_TYPE_MENU: gen(),
            _NET_WM_WINDOW_TYPE_UTILITY: gen(),
            _NET_WM_WINDOW_TYPE_SPLASH: gen(),
            _NET_WM_WINDOW_TYPE_DIALOG: gen(),
            _NET_WM_WINDOW_TYPE_DROPDOWN_MENU: gen(),
            _NET_WM_WINDOW_TYPE_POPUP_MENU: gen(),
            _NET_WM_WINDOW_TYPE_TOOLTIP: gen(),
            _NET_WM_WINDOW_TYPE_COMBO: gen(),
            _NET_WM_WINDOW_TYPE_DND: gen(),
            _NET_WM_WINDOW_TYPE_NOTIFICATION: gen(),
            _NET_WM_WINDOW_TYPE_NORMAL: gen(),
            _NET_WM_STATE: gen(),
            _NET_WM_STATE_MODAL: gen(),
            _NET_WM_STATE_STICKY: gen(),
            _NET_WM_STATE_MAXIMIZED_VERT: gen(),
            _NET_WM_STATE_MAXIMIZED_HORZ: gen(),
            _NET_WM_STATE_SHADED: gen(),
            _NET_WM_STATE_SKIP_TASKBAR: gen(),
            _NET_WM_STATE_SKIP_PAGER: gen(),
            _NET_WM_STATE_HIDDEN: gen(),
            _NET_WM_STATE_FULLSCREEN: gen(),
            _NET_WM_STATE_ABOVE: gen(),
            _NET_WM_STATE_BELOW: gen(),
            _NET_WM_STATE_DEMANDS_ATTENTION: gen(),
            _NET_WM_STATE_FOCUSED: gen(),
            _NET_WM_ACTION_MOVE: gen(),
            _NET_WM_ACTION_RESIZE: gen(),
            _NET_WM_ACTION_MINIMIZE: gen(),
            _NET_WM_ACTION_SHADE: gen(),
            _NET_WM_ACTION_STICK: gen(),
            _NET_WM_ACTION_MAXIMIZE_HORZ: gen(),
            _NET_WM_ACTION_MAXIMIZE_VERT: gen(),
            _NET_WM_ACTION_FULLSCREEN: gen(),
            _NET_WM_ACTION_CHANGE_DESKTOP: gen(),
            _NET_WM_ACTION_CLOSE: gen(),
            _NET_WM_ACTION_ABOVE: gen(),
            _NET_WM_ACTION_BELOW: gen(),
            _MOTIF_WM_HINTS: gen(),
            _GTK_FRAME_EXTENTS: gen(),
            _HXM_RESTART_DATA: gen(),
        }
    }

    fn bytes(cards: &[u32]) -> Vec<u8> {
        cards.iter().flat_map(|c| c.to_ne_bytes()).collect()
    }

    #[test]
    fn wm_class_splits_instance_and_class() {
        assert_eq!(
            parse_wm_class(b"xterm\0XTerm\0"),
            Some(("xterm".into(), "XTerm".into()))
        );
        assert_eq!(parse_wm_class(b"justone"), None);
    }

    #[test]
    fn utf8_text_rejects_invalid_and_empty() {
        assert_eq!(parse_utf8_text(b"hello"), Some("hello".into()));
        assert_eq!(parse_utf8_text(b""), None);
        // bare continuation byte is invalid
        assert_eq!(parse_utf8_text(&[0x80]), None);
        // overlong encoding of '/'
        assert_eq!(parse_utf8_text(&[0xc0, 0xaf]), None);
        // CESU-8 style surrogate half
        assert_eq!(parse_utf8_text(&[0xed, 0xa0, 0x80]), None);
    }

    #[test]
    fn utf8_text_truncates_on_char_boundary() {
        let mut long = "a".repeat(MAX_TITLE_BYTES - 1);
        long.push('\u{00e9}'); // two bytes, straddles the cap
        let parsed = parse_utf8_text(long.as_bytes()).unwrap();
        assert_eq!(parsed.len(), MAX_TITLE_BYTES - 1);
        assert!(parsed.chars().all(|c| c == 'a'));
    }

    #[test]
    fn state_atoms_round_trip() {
        let atoms = test_atoms();
        let set = WinState::FULLSCREEN | WinState::STICKY | WinState::MAXIMIZED_H;
        let encoded = bytes(&state_to_atoms(&atoms, set));
        assert_eq!(parse_state_atoms(&atoms, &encoded), set);
    }

    #[test]
    fn state_action_semantics() {
        let cur = WinState::STICKY | WinState::ABOVE;
        assert_eq!(
            apply_state_action(cur, STATE_REMOVE, WinState::ABOVE),
            Some(WinState::STICKY)
        );
        assert_eq!(
            apply_state_action(cur, STATE_ADD, WinState::FULLSCREEN),
            Some(cur | WinState::FULLSCREEN)
        );
        assert_eq!(
            apply_state_action(cur, STATE_TOGGLE, WinState::STICKY),
            Some(WinState::ABOVE)
        );
        assert_eq!(apply_state_action(cur, 3, WinState::STICKY), None);
    }

    #[test]
    fn strut_partial_wants_exactly_twelve() {
        let strut =
            parse_strut_partial(&bytes(&[0, 0, 30, 0, 0, 0, 0, 0, 0, 1920, 0, 0])).unwrap();
        assert_eq!(strut.top, 30);
        assert_eq!((strut.top_start_x, strut.top_end_x), (0, 1920));
        assert!(parse_strut_partial(&bytes(&[1, 2, 3])).is_none());
    }

    #[test]
    fn strut_legacy_spans_whole_screen() {
        let strut = parse_strut_legacy(&bytes(&[0, 0, 30, 0]), (1920, 1080)).unwrap();
        assert_eq!(strut.top, 30);
        assert_eq!((strut.top_start_x, strut.top_end_x), (0, 1920));
        assert_eq!((strut.left_start_y, strut.left_end_y), (0, 1080));
    }

    #[test]
    fn motif_decor_respects_flag_field() {
        // flags without the decorations bit: no override
        assert_eq!(parse_motif_decor(&bytes(&[1, 0, 0, 0, 0])), None);
        // decorations bit set, decorations = 0: undecorated
        assert_eq!(parse_motif_decor(&bytes(&[2, 0, 0, 0, 0])), Some(false));
        assert_eq!(parse_motif_decor(&bytes(&[2, 0, 1, 0, 0])), Some(true));
    }

    #[test]
    fn icon_picks_closest_to_targets() {
        // two icons: 16x16 and 48x48; targets include both, but a 40x40
        // request pattern is closest to 48
        let mut data = vec![16u32, 16];
        data.extend(std::iter::repeat(0xff00_00ffu32).take(256));
        data.extend([48u32, 48]);
        data.extend(std::iter::repeat(0x8000_00ffu32).take(48 * 48));
        let icon = parse_icon(&bytes(&data)).unwrap();
        // 16 is itself a target (distance 0), tie broken by first minimal
        assert_eq!((icon.width, icon.height), (16, 16));
        // fully opaque pixel is unchanged by premultiplication
        assert_eq!(icon.pixels[0], 0xff00_00ff);
    }

    #[test]
    fn icon_premultiplies_alpha() {
        let mut data = vec![1u32, 1];
        data.push(0x80ff_ffff); // half transparent white
        let icon = parse_icon(&bytes(&data)).unwrap();
        let px = icon.pixels[0];
        assert_eq!(px >> 24, 0x80);
        // channels scaled to ~0x80
        assert_eq!((px >> 16) & 0xff, 0x80);
    }

    #[test]
    fn icon_truncated_payload_is_skipped() {
        // claims 16x16 but only 4 pixels follow
        let mut data = vec![16u32, 16];
        data.extend([1, 2, 3, 4]);
        assert!(parse_icon(&bytes(&data)).is_none());
    }

    #[test]
    fn constrain_clamps_and_snaps() {
        let hints = SizeHints {
            valid: true,
            min: Some((100, 50)),
            max: Some((800, 600)),
            base: Some((20, 10)),
            inc: Some((10, 10)),
            ..Default::default()
        };
        assert_eq!(constrain_to_hints(&hints, 1000, 700), (800, 600));
        assert_eq!(constrain_to_hints(&hints, 50, 20), (100, 50));
        // 137 snaps down to base 20 + 11*10 = 130
        assert_eq!(constrain_to_hints(&hints, 137, 75), (130, 70));
    }

    #[test]
    fn constrain_enforces_aspect() {
        let hints = SizeHints {
            valid: true,
            aspect: Some((1.0, 2.0)),
            ..Default::default()
        };
        // too wide: 300x100 ratio 3.0 > max 2.0 -> w reduced to 200
        assert_eq!(constrain_to_hints(&hints, 300, 100), (200, 100));
        // too tall: 100x300 ratio 0.33 < min 1.0 -> h reduced to 100
        assert_eq!(constrain_to_hints(&hints, 100, 300), (100, 100));
    }

    #[test]
    fn window_type_first_known_wins() {
        let atoms = test_atoms();
        let data = bytes(&[9999, atoms._NET_WM_WINDOW_TYPE_DIALOG, atoms._NET_WM_WINDOW_TYPE_NORMAL]);
        assert_eq!(parse_window_type(&atoms, &data), Some(WindowType::Dialog));
        assert_eq!(parse_window_type(&atoms, &bytes(&[9999])), None);
    }
}
