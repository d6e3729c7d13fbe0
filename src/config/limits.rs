//! Formatting and parsing limits.

pub const MAX_ARG_DISPLAY_CHARS: usize = 160;
pub const MAX_ARG_PREVIEW_ITEMS: usize = 2;
pub const CONTENT_PREVIEW_MAX_CHARS: usize = 120;

/// Entries shown in list previews before `... and N more`.
pub const LIST_PREVIEW_LIMIT: usize = 12;

pub const MAX_TABLE_PARSE_DEPTH: usize = 5;
pub const MAX_NESTED_JSON_DECODE_DEPTH: usize = 3;

pub const MAX_CAPSULE_PACKED_CHARS: usize = 250_000;
pub const MAX_CAPSULE_UNPACKED_BYTES: usize = 2_000_000;

/// Tool descriptions in discovery listings are cut at this many chars.
pub const LISTING_DESCRIPTION_CHARS: usize = 200;
pub const INSTRUCTION_DESCRIPTION_CHARS: usize = 120;
