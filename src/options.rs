use bitflags::bitflags;
use rhai::Dynamic;

use crate::events::NavRejection;

bitflags! {
    /// Option bits passed through to the bot-movement subsystem.
    ///
    /// Only [`NavOptionFlags::LOOP`] is named here; every other bit is carried
    /// unchanged and interpreted by the subsystem alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NavOptionFlags: u32 {
        /// Restart from the first waypoint after reaching the last one.
        const LOOP = 1;
    }
}

impl NavOptionFlags {
    pub fn from_raw(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

/// Flag bitmask at index 0 of `options`, or zero when absent or unusable.
pub fn decode_option_flags(options: &[Dynamic]) -> NavOptionFlags {
    try_decode_option_flags(options).ok().flatten().unwrap_or_default()
}

/// Like [`decode_option_flags`] but reports a present-yet-unusable entry.
///
/// `Ok(None)` means no options were given.
pub fn try_decode_option_flags(options: &[Dynamic]) -> Result<Option<NavOptionFlags>, NavRejection> {
    let Some(first) = options.first() else {
        return Ok(None);
    };
    let raw = first
        .as_int()
        .map_err(|type_name| NavRejection::MalformedInput(format!("option flags must be an integer, got {type_name}")))?;
    let bits = u32::try_from(raw)
        .map_err(|_| NavRejection::MalformedInput(format!("option flags {raw} out of range")))?;
    Ok(Some(NavOptionFlags::from_raw(bits)))
}

/// For integrations that cannot default the bitmask.
pub fn require_option_flags(options: &[Dynamic]) -> Result<NavOptionFlags, NavRejection> {
    try_decode_option_flags(options)?.ok_or(NavRejection::InvalidArgument("option flags"))
}
