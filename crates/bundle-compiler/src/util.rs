//! Small helpers shared across modules

use std::borrow::Cow;

use cow_utils::CowUtils;

/// The game's 32-bit string hash (djb2 with xor), used for cache magics and
/// generated identifiers
pub fn hash_string(value: &str) -> u32 {
    value
        .bytes()
        .fold(5381_u32, |hash, byte| hash.wrapping_mul(33) ^ u32::from(byte))
}

/// Builds the full bundle name for a name declared inside an asset
///
/// Declared names are mixed case and lack the platform prefix:
/// `Levels/MP/Harbor` becomes `win32/levels/mp/harbor`.
pub fn qualified_bundle_name(platform: &str, declared: &str) -> String {
    let lowered: Cow<'_, str> = declared.cow_to_ascii_lowercase();
    if platform.is_empty() {
        lowered.into_owned()
    } else {
        format!("{platform}/{lowered}")
    }
}
