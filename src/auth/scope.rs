//! Normalized, space-delimited OAuth value sets (scopes and audiences).

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::_prelude::*;

/// Errors emitted when validating scope or audience entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Entries cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending entry.
		scope: String,
	},
}

/// Deduplicated, sorted set of OAuth values.
///
/// Used for both `scope` and `audience` parameters. Sorting makes equality, hashing, and the
/// space-joined wire form independent of the order callers supplied the values in.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized set from any iterator.
	pub fn new<I, S>(values: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for value in values {
			let owned: String = value.into();

			if owned.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if owned.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
			}

			set.insert(owned);
		}

		Ok(Self(set.into_iter().collect()))
	}

	/// Number of distinct values.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if the set is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains the provided value.
	pub fn contains(&self, value: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(value)).is_ok()
	}

	/// Iterator over the sorted values.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Space-joined wire representation, or `None` when the set is empty.
	pub fn to_param(&self) -> Option<String> {
		if self.is_empty() { None } else { Some(self.normalized()) }
	}

	/// Space-joined representation (empty string for an empty set).
	pub fn normalized(&self) -> String {
		self.0.join(" ")
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.0.len()))?;

		for value in self.0.iter() {
			seq.serialize_element(value)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}
