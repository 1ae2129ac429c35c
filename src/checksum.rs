//! Streaming checksum verification for caller-supplied hints

use sha2::{Digest, Sha256};

/// Digest algorithm inferred from the shape of a hex checksum hint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumKind {
    /// 32 hex characters
    Md5,
    /// 64 hex characters
    Sha256,
}

impl ChecksumKind {
    /// Infer the algorithm from a hex digest, None if the hint is not recognized
    pub fn detect(hint: &str) -> Option<Self> {
        let hint = hint.trim();
        if !hint.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hint.len() {
            32 => Some(ChecksumKind::Md5),
            64 => Some(ChecksumKind::Sha256),
            _ => None,
        }
    }
}

enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

/// Incremental verifier fed with every chunk written to disk
pub struct ChecksumVerifier {
    expected: String,
    hasher: Hasher,
}

impl ChecksumVerifier {
    /// Build a verifier for a hint, None if the hint format is not recognized
    pub fn from_hint(hint: &str) -> Option<Self> {
        let kind = ChecksumKind::detect(hint)?;
        let hasher = match kind {
            ChecksumKind::Md5 => Hasher::Md5(md5::Context::new()),
            ChecksumKind::Sha256 => Hasher::Sha256(Sha256::new()),
        };
        Some(Self {
            expected: hint.trim().to_ascii_lowercase(),
            hasher,
        })
    }

    /// Feed the next chunk of content
    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.hasher {
            Hasher::Md5(ctx) => ctx.consume(chunk),
            Hasher::Sha256(hasher) => hasher.update(chunk),
        }
    }

    /// Expected digest, lowercase hex
    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Finish hashing; Ok with the digest when it matches, Err with the actual digest otherwise
    pub fn finish(self) -> std::result::Result<String, String> {
        let actual = match self.hasher {
            Hasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            Hasher::Sha256(hasher) => format!("{:x}", hasher.finalize()),
        };
        if actual == self.expected {
            Ok(actual)
        } else {
            Err(actual)
        }
    }
}
