//! Boundary Detector
//!
//! A pair of random, per-command marker tokens used to delimit one command's
//! output inside an otherwise unstructured byte stream.

use uuid::Uuid;

/// Length of a token for pipe-backed sessions
pub const TOKEN_LEN: usize = 32;

/// Length of a token for PTY-backed sessions, where echoed input also
/// appears in the stream
pub const PTY_TOKEN_LEN: usize = 64;

/// Open/close marker pair for a single command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryDetector {
    open_token: String,
    close_token: String,
    use_pty: bool,
}

impl BoundaryDetector {
    /// Generate a fresh detector.
    ///
    /// Tokens are lowercase hex drawn from UUID v4 values. The alphabet never
    /// occurs in terminal control sequence introducers and the length makes an
    /// accidental match against command text negligible.
    pub fn default_random(use_pty: bool) -> Self {
        let len = if use_pty { PTY_TOKEN_LEN } else { TOKEN_LEN };
        Self {
            open_token: random_token(len),
            close_token: random_token(len),
            use_pty,
        }
    }

    /// Build a detector from explicit tokens
    pub fn with_tokens(open_token: impl Into<String>, close_token: impl Into<String>) -> Self {
        Self {
            open_token: open_token.into(),
            close_token: close_token.into(),
            use_pty: false,
        }
    }

    pub fn open_token(&self) -> &str {
        &self.open_token
    }

    pub fn close_token(&self) -> &str {
        &self.close_token
    }

    pub fn use_pty(&self) -> bool {
        self.use_pty
    }

    /// Open token split into two halves.
    ///
    /// Wrappers emit the halves as separate quoted words so that the echoed
    /// command line never contains the contiguous token.
    pub fn open_halves(&self) -> (&str, &str) {
        split_token(&self.open_token)
    }

    /// Close token split into two halves
    pub fn close_halves(&self) -> (&str, &str) {
        split_token(&self.close_token)
    }
}

fn random_token(len: usize) -> String {
    let mut token = String::with_capacity(len);
    while token.len() < len {
        token.push_str(&Uuid::new_v4().simple().to_string());
    }
    token.truncate(len);
    token
}

fn split_token(token: &str) -> (&str, &str) {
    let mut mid = token.len() / 2;
    while !token.is_char_boundary(mid) {
        mid += 1;
    }
    token.split_at(mid)
}
