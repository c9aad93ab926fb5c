// src/core/key_event.rs
//! Media key payload decoding
//!
//! System-defined events carry the hardware key in a single packed integer
//! (`data1`): the upper 16 bits hold the key code, the lower 16 bits the key
//! flags. Everything here is pure and allocation free so it can run inside
//! the event tap callback.

use serde::{Deserialize, Serialize};

/// `NX_SYSDEFINED`: the event category media keys arrive in
pub const NX_SYSDEFINED: u32 = 14;
/// `NX_SUBTYPE_AUX_CONTROL_BUTTONS`: the hardware key family within `NX_SYSDEFINED`
pub const NX_SUBTYPE_AUX_CONTROL_BUTTONS: i16 = 8;

// Key codes from IOKit/hidsystem/ev_keymap.h (NX_KEYTYPE_*)
pub const NX_KEYTYPE_PLAY: u16 = 16;
pub const NX_KEYTYPE_NEXT: u16 = 17;
pub const NX_KEYTYPE_PREVIOUS: u16 = 18;
pub const NX_KEYTYPE_FAST: u16 = 19;
pub const NX_KEYTYPE_REWIND: u16 = 20;

const KEY_DOWN_STATE: u16 = 0x0a;

/// One of the five playback keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKey {
    PlayPause,
    Previous,
    Next,
    Rewind,
    FastForward,
}

impl MediaKey {
    pub fn from_keycode(keycode: u16) -> Option<Self> {
        match keycode {
            NX_KEYTYPE_PLAY => Some(MediaKey::PlayPause),
            NX_KEYTYPE_PREVIOUS => Some(MediaKey::Previous),
            NX_KEYTYPE_NEXT => Some(MediaKey::Next),
            NX_KEYTYPE_REWIND => Some(MediaKey::Rewind),
            NX_KEYTYPE_FAST => Some(MediaKey::FastForward),
            _ => None,
        }
    }

    pub fn keycode(self) -> u16 {
        match self {
            MediaKey::PlayPause => NX_KEYTYPE_PLAY,
            MediaKey::Previous => NX_KEYTYPE_PREVIOUS,
            MediaKey::Next => NX_KEYTYPE_NEXT,
            MediaKey::Rewind => NX_KEYTYPE_REWIND,
            MediaKey::FastForward => NX_KEYTYPE_FAST,
        }
    }
}

/// Which key transitions reach the host delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPressMode {
    #[default]
    KeyDown,
    KeyUp,
    KeyDownAndUp,
}

impl KeyPressMode {
    pub fn accepts(self, event: &KeyEvent) -> bool {
        match self {
            KeyPressMode::KeyDown => event.pressed,
            KeyPressMode::KeyUp => !event.pressed,
            KeyPressMode::KeyDownAndUp => true,
        }
    }
}

/// A decoded hardware key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub keycode: u16,
    pub raw_flags: u16,
    pub pressed: bool,
    pub is_repeat: bool,
}

impl KeyEvent {
    /// Decode the packed `data1` payload of a system-defined event.
    pub fn decode(data1: i64) -> Self {
        let keycode = extract_keycode(data1);
        let raw_flags = (data1 & 0xffff) as u16;
        let pressed = ((raw_flags >> 8) & 0xff) == KEY_DOWN_STATE;
        let is_repeat = (raw_flags & 0x1) == 0x1;

        KeyEvent {
            keycode,
            raw_flags,
            pressed,
            is_repeat,
        }
    }

    pub fn media_key(&self) -> Option<MediaKey> {
        MediaKey::from_keycode(self.keycode)
    }
}

pub fn extract_keycode(data1: i64) -> u16 {
    ((data1 >> 16) & 0xffff) as u16
}

/// True for the hardware key family that carries media keys.
pub fn is_media_key_event(event_type: u32, subtype: i16, data1: i64) -> bool {
    event_type == NX_SYSDEFINED
        && subtype == NX_SUBTYPE_AUX_CONTROL_BUTTONS
        && MediaKey::from_keycode(extract_keycode(data1)).is_some()
}

#[cfg(test)]
pub(crate) fn pack_data1(keycode: u16, pressed: bool, is_repeat: bool) -> i64 {
    let state: i64 = if pressed { 0x0a } else { 0x0b };
    ((keycode as i64) << 16) | (state << 8) | (is_repeat as i64)
}
