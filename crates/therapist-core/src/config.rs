//! Tuning constants shared across the crate.

use std::time::Duration;

pub mod scan {
    /// Bytes read per scan step (256KB). One progress step per chunk.
    pub const CHUNK_SIZE: usize = 256 * 1024;

    /// Candidate headers are tested at this alignment.
    pub const HEADER_ALIGNMENT: usize = 4;

    /// Elements sampled from each candidate vector.
    pub const SAMPLE_COUNT: usize = 4;
}

pub mod decode {
    /// Creature ids outside this range mark a record as corrupt.
    pub const MAX_ENTITY_ID: i64 = 10_000_000;

    /// Skill vectors longer than this are treated as corrupt.
    pub const MAX_SKILLS: u64 = 256;

    /// Strings longer than this are treated as corrupt.
    pub const MAX_STRING_LENGTH: u64 = 4096;

    /// Capacity below which MSVC stores string bytes inline.
    pub const SSO_CAPACITY: u64 = 16;

    /// Skill rating at which a creature counts as legendary.
    pub const LEGENDARY_RATING: i32 = 15;

    /// Highest skill rating the game displays.
    pub const MAX_SKILL_RATING: i32 = 20;

    /// Number of name word slots in a last-name block.
    pub const NAME_WORDS: usize = 7;
}

pub mod retry {
    use super::Duration;

    /// Delay between scan attempts while the game is still loading.
    pub const RETRY_DELAY: Duration = Duration::from_secs(5);

    /// Scan attempts before giving up.
    pub const MAX_LOAD_ATTEMPTS: u32 = 12;
}
