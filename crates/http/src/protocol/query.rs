//! URL-form decoding of query strings and form bodies.

use url::form_urlencoded;

use crate::protocol::fields::FieldMap;

/// Decodes `name=value` pairs from `raw` into `into`, returning the number
/// of pairs seen.
///
/// `+` and percent escapes decode the form way; a bare name without `=`
/// yields an empty value. Repeated names go through the map's scalar-to-list
/// promotion.
pub fn decode_pairs(raw: &[u8], into: &mut FieldMap) -> usize {
    let mut seen = 0;
    for (name, value) in form_urlencoded::parse(raw) {
        into.insert(name.into_owned(), value.into_owned());
        seen += 1;
    }
    seen
}
