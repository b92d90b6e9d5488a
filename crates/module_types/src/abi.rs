// ABI Tokens - Binary compatibility markers
//
// A module is only admitted when both tokens match the host exactly. The
// tokens are opaque: nothing orders or partially matches them.

use serde::{Deserialize, Serialize};

/// ABI version of this runtime
pub const ABI_VERSION: u32 = 1_000;

/// ABI signature prefix of this runtime
///
/// The host token appends the target architecture to it.
pub const ABI_SIGNATURE: &str = concat!(
    "modcycle-abi/",
    env!("CARGO_PKG_VERSION_MAJOR"),
    ".",
    env!("CARGO_PKG_VERSION_MINOR"),
);

/// Compatibility tokens carried by a module and by the host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbiToken {
    pub version: u32,
    pub signature: String,
}

impl AbiToken {
    pub fn new(version: u32, signature: impl Into<String>) -> Self {
        Self {
            version,
            signature: signature.into(),
        }
    }

    /// Tokens of the running host
    ///
    /// The signature encodes the properties a module's memory layout depends on.
    pub fn host() -> Self {
        Self::new(
            ABI_VERSION,
            format!("{}/{}", ABI_SIGNATURE, std::env::consts::ARCH),
        )
    }

    /// Describe why `self` (a module's tokens) is not compatible with `expected`
    ///
    /// Returns `None` when both tokens match.
    pub fn mismatch(&self, expected: &AbiToken) -> Option<AbiMismatch> {
        if self.version != expected.version {
            Some(AbiMismatch::Version {
                expected: expected.version,
                found: self.version,
            })
        } else if self.signature != expected.signature {
            Some(AbiMismatch::Signature)
        } else {
            None
        }
    }
}

impl Default for AbiToken {
    fn default() -> Self {
        Self::host()
    }
}

impl std::fmt::Display for AbiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.version, self.signature)
    }
}

/// Which token did not match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiMismatch {
    Version { expected: u32, found: u32 },
    Signature,
}

impl std::fmt::Display for AbiMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbiMismatch::Version { expected, found } => {
                write!(f, "version {} instead of {}", found, expected)
            }
            AbiMismatch::Signature => write!(f, "is not binary compatible"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_matches_itself() {
        assert_eq!(AbiToken::host().mismatch(&AbiToken::host()), None);
    }

    #[test]
    fn test_version_checked_before_signature() {
        let module = AbiToken::new(ABI_VERSION + 1, "other");
        assert_eq!(
            module.mismatch(&AbiToken::host()),
            Some(AbiMismatch::Version {
                expected: ABI_VERSION,
                found: ABI_VERSION + 1,
            })
        );
    }

    #[test]
    fn test_signature_mismatch() {
        let module = AbiToken::new(ABI_VERSION, "modcycle-abi/0.0/unknown");
        let mismatch = module.mismatch(&AbiToken::host()).unwrap();
        assert_eq!(mismatch, AbiMismatch::Signature);
        assert_eq!(mismatch.to_string(), "is not binary compatible");
    }

    #[test]
    fn test_signature_mentions_arch() {
        let signature = AbiToken::host().signature;
        assert!(signature.starts_with(ABI_SIGNATURE));
        assert!(signature.ends_with(std::env::consts::ARCH));
    }
}
