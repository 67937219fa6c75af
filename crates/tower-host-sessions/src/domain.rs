//! Picking the cookie domain for a request.
//!
//! A single deployment can serve several sites (`app.example.com`, `shop.example.net`, ...),
//! and each of them needs its session cookie scoped to its own parent domain. The
//! [`DomainResolver`] holds an ordered list of [`DomainRule`]s and picks the first one whose
//! pattern matches the request's host.

use std::fmt;

use regex::Regex;
use thiserror::Error;

/// A host pattern that could not be compiled.
#[derive(Debug, Error)]
#[error("invalid host pattern {pattern:?} for domain {domain:?}")]
pub struct InvalidDomainPattern
{
	domain: Box<str>,
	pattern: Box<str>,
	#[source]
	source: regex::Error,
}

impl InvalidDomainPattern
{
	/// The pattern that failed to compile.
	pub fn pattern(&self) -> &str
	{
		&self.pattern
	}
}

/// A `(domain, host pattern)` pair.
///
/// Patterns are anchored at the start of the host but not at the end, so
/// `[a-z]+\.example\.com` matches `app.example.com:8443` as well as `app.example.com`.
#[derive(Clone)]
pub struct DomainRule
{
	domain: Box<str>,
	pattern: Box<str>,
	regex: Regex,
}

impl DomainRule
{
	/// Compiles a new rule.
	pub fn new(
		domain: impl Into<Box<str>>,
		pattern: impl Into<Box<str>>,
	) -> Result<Self, InvalidDomainPattern>
	{
		let domain = domain.into();
		let pattern = pattern.into();

		match Regex::new(&format!("^(?:{pattern})")) {
			Ok(regex) => Ok(Self { domain, pattern, regex }),
			Err(source) => Err(InvalidDomainPattern { domain, pattern, source }),
		}
	}

	/// The cookie domain used when this rule matches.
	pub fn domain(&self) -> &str
	{
		&self.domain
	}

	/// The pattern as it was configured.
	pub fn pattern(&self) -> &str
	{
		&self.pattern
	}

	/// Whether this rule applies to `host`.
	pub fn matches(&self, host: &str) -> bool
	{
		self.regex.is_match(host)
	}
}

impl fmt::Debug for DomainRule
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		f.debug_struct("DomainRule")
			.field("domain", &self.domain)
			.field("pattern", &self.pattern)
			.finish()
	}
}

/// Maps request hosts to cookie domains.
#[derive(Debug, Clone, Default)]
pub struct DomainResolver
{
	rules: Vec<DomainRule>,

	/// `None` means "no `Domain` attribute", i.e. a host-only cookie.
	default_domain: Option<Box<str>>,
}

impl DomainResolver
{
	/// Creates a resolver without any rules.
	pub fn new(default_domain: Option<impl Into<Box<str>>>) -> Self
	{
		Self { rules: Vec::new(), default_domain: default_domain.map(Into::into) }
	}

	/// Compiles a list of `(domain, pattern)` pairs, keeping their order.
	pub fn from_rules<I, D, P>(
		default_domain: Option<impl Into<Box<str>>>,
		rules: I,
	) -> Result<Self, InvalidDomainPattern>
	where
		I: IntoIterator<Item = (D, P)>,
		D: Into<Box<str>>,
		P: Into<Box<str>>,
	{
		rules
			.into_iter()
			.try_fold(Self::new(default_domain), |resolver, (domain, pattern)| {
				DomainRule::new(domain, pattern).map(|rule| resolver.with_rule(rule))
			})
	}

	/// Appends a rule. It is only consulted if none of the existing rules match.
	pub fn with_rule(mut self, rule: DomainRule) -> Self
	{
		self.rules.push(rule);
		self
	}

	/// The configured rules, in evaluation order.
	pub fn rules(&self) -> &[DomainRule]
	{
		&self.rules
	}

	/// The domain used when no rule matches.
	pub fn default_domain(&self) -> Option<&str>
	{
		self.default_domain.as_deref()
	}

	/// Returns the cookie domain for `host`.
	///
	/// The first matching rule wins, even if a later one would be more specific.
	pub fn resolve(&self, host: &str) -> Option<&str>
	{
		self.rules
			.iter()
			.find(|rule| rule.matches(host))
			.map(DomainRule::domain)
			.or_else(|| self.default_domain())
	}
}
