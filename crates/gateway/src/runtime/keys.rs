//! Virtual-key resolution for the input and media actuators.

use wd_domain::error::{Error, Result};

pub const VK_MEDIA_NEXT_TRACK: u16 = 0xB0;
pub const VK_MEDIA_PLAY_PAUSE: u16 = 0xB3;

const SPECIAL_KEYS: [(&str, u16); 9] = [
    ("space", 0x20),
    ("enter", 0x0D),
    ("tab", 0x09),
    ("esc", 0x1B),
    ("escape", 0x1B),
    ("up", 0x26),
    ("down", 0x28),
    ("left", 0x25),
    ("right", 0x27),
];

/// Resolve a spoken key name to a virtual-key code: special keys, a-z, 0-9,
/// and f1-f12.
pub fn key_to_vk(key_name: &str) -> Result<u16> {
    let key = key_name.trim().to_lowercase();
    if key.is_empty() {
        return Err(Error::validation("keypress key parameter is required"));
    }
    if let Some((_, vk)) = SPECIAL_KEYS.iter().find(|(name, _)| *name == key) {
        return Ok(*vk);
    }
    if key.len() == 1 {
        let ch = key.as_bytes()[0];
        if ch.is_ascii_lowercase() {
            return Ok(ch.to_ascii_uppercase() as u16);
        }
        if ch.is_ascii_digit() {
            return Ok(ch as u16);
        }
    }
    if let Some(number) = key.strip_prefix('f').and_then(|n| n.parse::<u16>().ok()) {
        if (1..=12).contains(&number) {
            return Ok(0x6F + number);
        }
    }
    Err(Error::validation(format!("unsupported keypress key: {key_name}")))
}

/// Seam for injecting virtual keys into the host. The real injector lives in
/// the platform adapter; this host-neutral build cannot synthesize input.
pub trait KeyInjector: Send + Sync {
    fn send_virtual_key(&self, vk_code: u16) -> Result<()>;
}

/// Injector for hosts without an input backend; every send fails, which the
/// executor records as an execution error.
#[derive(Debug, Default)]
pub struct UnsupportedKeyInjector;

impl KeyInjector for UnsupportedKeyInjector {
    fn send_virtual_key(&self, _vk_code: u16) -> Result<()> {
        Err(Error::Other(
            "virtual key injection is not available on this host".into(),
        ))
    }
}
