//! Term serialization trait.
//!
//! The [`Term`] trait provides a common interface for encoding and decoding
//! the values that cross process boundaries. Any type that implements
//! `Serialize + DeserializeOwned` can be used as a Term.
//!
//! Messages are moved across the isolation boundary as owned byte buffers:
//! the sender encodes its value into a fresh allocation, the receiver takes
//! ownership of that allocation. No shared references ever cross between
//! processes.
//!
//! Uses `postcard` for compact binary serialization.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Error type for term decoding failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Failed to deserialize the term bytes.
    #[error("failed to decode term: {0}")]
    Deserialize(#[from] postcard::Error),
}

/// A trait for values that can be serialized and sent between processes.
///
/// This trait is automatically implemented for any type that implements
/// `Serialize + DeserializeOwned + Send + 'static`.
///
/// # Examples
///
/// ```
/// use rill_core::Term;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// struct Ping {
///     id: u32,
/// }
///
/// let ping = Ping { id: 42 };
/// let bytes = ping.encode();
/// let decoded = Ping::decode(&bytes).unwrap();
/// assert_eq!(ping, decoded);
/// ```
pub trait Term: Sized + Send + 'static {
    /// Encodes this term into bytes.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails. This should not happen for well-formed
    /// types that properly implement `Serialize`.
    fn encode(&self) -> Vec<u8>;

    /// Decodes a term from bytes.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the bytes cannot be deserialized into this
    /// type.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError>;

    /// Encodes this term, returning `None` on failure instead of panicking.
    fn try_encode(&self) -> Option<Vec<u8>>;
}

impl<T> Term for T
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn encode(&self) -> Vec<u8> {
        postcard::to_allocvec(self).expect("term serialization failed")
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        postcard::from_bytes(bytes).map_err(DecodeError::from)
    }

    fn try_encode(&self) -> Option<Vec<u8>> {
        postcard::to_allocvec(self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pid;

    #[test]
    fn test_roundtrip_primitives() {
        let n: u64 = 42;
        assert_eq!(u64::decode(&n.encode()).unwrap(), 42);

        let s = "hello".to_string();
        assert_eq!(String::decode(&s.encode()).unwrap(), "hello");
    }

    #[test]
    fn test_roundtrip_tuple() {
        let t = ("parent".to_string(), Pid::from_raw(9));
        let decoded: (String, Pid) = Term::decode(&t.encode()).unwrap();
        assert_eq!(t, decoded);
    }

    #[test]
    fn test_try_encode_matches_encode() {
        let t = ("ok".to_string(), 7u64);
        assert_eq!(t.try_encode().unwrap(), t.encode());
        assert_eq!(
            <(String, u64)>::decode(&t.try_encode().unwrap()).unwrap(),
            t
        );
    }

    #[test]
    fn test_decode_error() {
        let bytes = vec![0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(<(String, u64)>::decode(&bytes).is_err());
    }
}
