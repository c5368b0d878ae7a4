/// Largest request or response frame on the wire. A single JSON object must
/// fit; keys and values are bounded below this at the API surface.
pub const MAX_FRAME_BYTES: usize = 4096;

/// Upper bound on keys and values accepted from the operator menu.
pub const MAX_KEY_BYTES: usize = 3 * 1024;
pub const MAX_VALUE_BYTES: usize = 3 * 1024;
