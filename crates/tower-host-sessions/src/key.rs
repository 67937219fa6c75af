use std::fmt;
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

/// Characters a session key is made of.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of freshly generated keys.
const GENERATED_LEN: usize = 32;

/// Keys shorter than this are never accepted from a client.
const MIN_LEN: usize = 8;

/// An opaque session key, as stored in the session cookie.
///
/// The [`Debug`] implementation only shows a prefix of the key, so it is safe to log.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(Box<str>);

/// Returned when a cookie value cannot be used as a [`SessionKey`].
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ParseSessionKeyError
{
	/// The value is shorter than the minimum key length.
	#[error("session key is too short")]
	TooShort,

	/// The value contains characters outside of `[a-z0-9]`.
	#[error("session key contains invalid character {0:?}")]
	InvalidCharacter(char),
}

impl SessionKey
{
	/// Generates a new random key.
	pub fn generate() -> Self
	{
		let mut rng = rand::rng();
		let key = (0..GENERATED_LEN)
			.map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
			.collect::<String>();

		Self(key.into_boxed_str())
	}

	/// Returns the key as it appears in the cookie.
	pub fn as_str(&self) -> &str
	{
		&self.0
	}
}

impl FromStr for SessionKey
{
	type Err = ParseSessionKeyError;

	fn from_str(value: &str) -> Result<Self, Self::Err>
	{
		if value.len() < MIN_LEN {
			return Err(ParseSessionKeyError::TooShort);
		}

		if let Some(invalid) = value.chars().find(|&ch| !ch.is_ascii() || !ALPHABET.contains(&(ch as u8))) {
			return Err(ParseSessionKeyError::InvalidCharacter(invalid));
		}

		Ok(Self(Box::from(value)))
	}
}

impl fmt::Display for SessionKey
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		f.write_str(&self.0)
	}
}

impl fmt::Debug for SessionKey
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		let prefix = self.0.get(..4).unwrap_or_default();
		write!(f, "SessionKey(\"{prefix}…\")")
	}
}
