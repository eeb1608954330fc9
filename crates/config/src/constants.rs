//! Centralized constants for the voice bridge
//!
//! Single source of truth for the audio and pacing values used across the
//! codebase. The original deployments carried several divergent buffering
//! intervals; the set below is the smallest mutually consistent one and is
//! what every crate references.

/// Telephony-side audio parameters
pub mod audio {
    /// Provider frame cadence in milliseconds
    pub const FRAME_MS: u64 = 20;

    /// Provider sample rate (8 kHz mu-law)
    pub const TELEPHONY_RATE: u32 = 8000;

    /// Realtime model sample rate (PCM16)
    pub const MODEL_RATE: u32 = 24000;

    /// Bytes per linear sample (int16)
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// One 20 ms mu-law frame at 8 kHz
    pub const FRAME_BYTES_MULAW: usize =
        (TELEPHONY_RATE as usize * FRAME_MS as usize) / 1000;
}

/// Bridging and pacing parameters
pub mod bridge {
    /// Inbound accumulation target before flushing to the agent session (ms)
    pub const CHUNK_MS: u64 = 50;

    /// Maximum age of a non-empty inbound buffer before a forced flush (ms)
    pub const MAX_FLUSH_AGE_MS: u64 = 100;

    /// Outbound jitter buffer depth in frames (~5 s of audio at 20 ms)
    pub const JITTER_CAPACITY: usize = 256;

    /// Frames required before playback starts in device mode (~160 ms)
    pub const PREROLL_FRAMES: usize = 8;

    /// Normalized peak amplitude above which caller audio counts as speech.
    /// 2048/32768 in int16 terms, matching the observed telephony noise floor.
    pub const BARGE_IN_PEAK: f32 = 0.0625;

    /// Keepalive ping period on the media-stream socket (seconds)
    pub const KEEPALIVE_SECS: u64 = 15;
}
