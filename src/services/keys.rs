//! Storage key derivation for published videos.
//!
//! Keys have the form `<category>/<id><ext>` where `id` is 256 bits from
//! the operating system's CSPRNG, encoded as unpadded base64url. No counter
//! or clock is involved, so concurrent uploads never coordinate and keys
//! reveal nothing about upload order.

use crate::models::media::AspectCategory;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};

/// Number of random bytes behind each object id.
const OBJECT_ID_BYTES: usize = 32;

/// Fresh URL-safe random identifier (43 characters).
pub fn random_object_id() -> String {
    let mut raw = [0u8; OBJECT_ID_BYTES];
    OsRng.fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

/// Build the destination key for a classified upload.
///
/// `ext` is appended verbatim, including its leading dot.
pub fn route_key(category: AspectCategory, ext: &str) -> String {
    format!("{}/{}{}", category.as_str(), random_object_id(), ext)
}

/// Extension of the final path component, starting at its last `.`.
///
/// Returns an empty string when there is none. `clip.final.MP4` yields
/// `.MP4`; `video` yields `""`.
pub fn file_extension(filename: &str) -> &str {
    let name_start = filename.rfind(['/', '\\']).map_or(0, |pos| pos + 1);
    let name = &filename[name_start..];
    name.rfind('.').map_or("", |pos| &name[pos..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_has_category_prefix_and_verbatim_extension() {
        for (category, ext) in [
            (AspectCategory::Landscape, ".mp4"),
            (AspectCategory::Portrait, ".MOV"),
            (AspectCategory::Other, ""),
            (AspectCategory::Other, ".tar.gz"),
        ] {
            let key = route_key(category, ext);
            let prefix = format!("{}/", category.as_str());
            assert!(key.starts_with(&prefix), "{key}");
            assert!(key.ends_with(ext), "{key}");
            let id = &key[prefix.len()..key.len() - ext.len()];
            assert_eq!(id.len(), 43);
            assert!(
                id.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            );
        }
    }

    #[test]
    fn keys_do_not_repeat() {
        let keys: HashSet<String> = (0..10_000)
            .map(|_| route_key(AspectCategory::Landscape, ".mp4"))
            .collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn id_decodes_to_256_bits() {
        let decoded = URL_SAFE_NO_PAD.decode(random_object_id()).unwrap();
        assert_eq!(decoded.len(), OBJECT_ID_BYTES);
    }

    #[test]
    fn extension_follows_the_last_dot_of_the_file_name() {
        assert_eq!(file_extension("holiday.mp4"), ".mp4");
        assert_eq!(file_extension("clip.final.MP4"), ".MP4");
        assert_eq!(file_extension("video"), "");
        assert_eq!(file_extension(""), "");
        assert_eq!(file_extension("trailing."), ".");
        assert_eq!(file_extension("dir.v2/clip"), "");
        assert_eq!(file_extension("C:\\Users\\me\\clip.webm"), ".webm");
    }
}
