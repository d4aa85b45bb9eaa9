use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

pub const DEFAULT_PRESTART_BUFFER_FRAMES: usize = 500;

/// What to do with audio that arrives before the telephony stream id is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PreStartPolicy {
    /// Hold frames (bounded, oldest dropped first) and flush them in order
    /// once the stream starts.
    #[default]
    Buffer,
    /// Discard them.
    Drop,
}

impl PreStartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreStartPolicy::Buffer => "buffer",
            PreStartPolicy::Drop => "drop",
        }
    }
}

impl fmt::Display for PreStartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreStartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffer" => Ok(PreStartPolicy::Buffer),
            "drop" | "discard" => Ok(PreStartPolicy::Drop),
            other => Err(format!("unknown pre-start policy '{other}'")),
        }
    }
}

/// Audio payloads held until the stream is live.
#[derive(Debug)]
pub struct PreStartBuffer {
    label: &'static str,
    policy: PreStartPolicy,
    capacity: usize,
    frames: VecDeque<String>,
    dropped: u64,
}

impl PreStartBuffer {
    pub fn new(label: &'static str, policy: PreStartPolicy, capacity: usize) -> Self {
        Self {
            label,
            policy,
            capacity: capacity.max(1),
            frames: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Hold `payload` according to the policy.
    pub fn push(&mut self, payload: String) {
        match self.policy {
            PreStartPolicy::Drop => self.record_drop(),
            PreStartPolicy::Buffer => {
                if self.frames.len() == self.capacity {
                    self.frames.pop_front();
                    self.record_drop();
                }
                self.frames.push_back(payload);
            }
        }
    }

    /// Take every held frame, oldest first.
    pub fn drain(&mut self) -> VecDeque<String> {
        std::mem::take(&mut self.frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn record_drop(&mut self) {
        self.dropped += 1;
        // First drop, then every 100th, to keep the log readable.
        if self.dropped == 1 || self.dropped % 100 == 0 {
            warn!(
                direction = self.label,
                policy = %self.policy,
                dropped = self.dropped,
                "Dropping audio received before stream start"
            );
        }
    }
}
