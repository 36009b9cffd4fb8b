//! Verifying stream adapters.
//!
//! Each adapter is a byte pass-through that checks one property and aborts
//! the stream with a [`VerificationError`] the moment it can no longer
//! hold. Verification is an O(1)-memory fold; nothing is buffered.

use crate::error::{StoreResult, VerificationError};
use crate::traits::ByteStream;
use futures::StreamExt;
use larder_core::Hash;
use sha2::{Digest, Sha256, Sha512};

fn check_length(
    seen: u64,
    expected: u64,
    stage: &'static str,
) -> Result<(), VerificationError> {
    if seen == expected {
        return Ok(());
    }
    Err(VerificationError::LengthMismatch {
        stage,
        expected,
        actual: seen,
    })
}

/// Pass bytes through, failing if the total differs from `expected`.
///
/// Overruns fail as soon as the excess byte arrives; shortfalls fail at
/// end-of-stream. `stage` labels the error ("compressed file" vs "nar").
pub fn length(input: ByteStream, expected: u64, stage: &'static str) -> ByteStream {
    Box::pin(async_stream::try_stream! {
        let mut input = input;
        let mut seen: u64 = 0;
        while let Some(chunk) = input.next().await {
            let chunk = chunk?;
            seen += chunk.len() as u64;
            if seen > expected {
                check_length(seen, expected, stage)?;
            }
            yield chunk;
        }
        check_length(seen, expected, stage)?;
    })
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn for_algorithm(algorithm: &str) -> Result<Self, VerificationError> {
        match algorithm {
            "sha256" => Ok(Self::Sha256(Sha256::new())),
            "sha512" => Ok(Self::Sha512(Sha512::new())),
            other => Err(VerificationError::UnsupportedHashAlgorithm(other.to_string())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

fn check_digest(actual: Vec<u8>, expected: &Hash) -> Result<(), VerificationError> {
    if actual == expected.digest {
        return Ok(());
    }
    Err(VerificationError::HashMismatch {
        expected: expected.to_base32(),
        actual: Hash::from_digest(&expected.algorithm, actual).raw,
    })
}

/// Pass bytes through, folding a running digest and failing at
/// end-of-stream if it differs from `expected`.
pub fn hash(input: ByteStream, expected: &Hash) -> StoreResult<ByteStream> {
    let mut hasher = Hasher::for_algorithm(&expected.algorithm)?;
    let expected = expected.clone();
    Ok(Box::pin(async_stream::try_stream! {
        let mut input = input;
        while let Some(chunk) = input.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            yield chunk;
        }
        check_digest(hasher.finalize(), &expected)?;
    }))
}
