use crate::model::Ms;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2_000;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_CODE_LEN: usize = 32;
pub const MAX_EMAIL_LEN: usize = 254;

/// Longest accepted request line on the wire, in bytes.
pub const MAX_LINE_LEN: usize = 16 * 1024;
