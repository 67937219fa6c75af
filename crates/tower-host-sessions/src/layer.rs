use std::fmt;
use std::sync::Arc;

use tower_layer::Layer;

use crate::{SessionConfig, SessionManager, SessionStore};

/// A [`Layer`] producing [`SessionManager`]s.
pub struct SessionManagerLayer<Store>
where
	Store: SessionStore,
{
	/// Cookie attributes, domain rules, expiry defaults.
	config: Arc<SessionConfig>,

	/// The session store.
	store: Store,
}

impl<Store> SessionManagerLayer<Store>
where
	Store: SessionStore,
{
	/// Constructs a new [`SessionManagerLayer`].
	pub fn new(config: impl Into<Arc<SessionConfig>>, store: Store) -> Self
	{
		Self { config: config.into(), store }
	}

	/// The configuration every produced [`SessionManager`] shares.
	pub fn config(&self) -> &SessionConfig
	{
		&self.config
	}
}

impl<Inner, Store> Layer<Inner> for SessionManagerLayer<Store>
where
	Store: SessionStore + Clone,
{
	type Service = SessionManager<Inner, Store>;

	fn layer(&self, inner: Inner) -> Self::Service
	{
		SessionManager::new(Arc::clone(&self.config), self.store.clone(), inner)
	}
}

impl<Store> fmt::Debug for SessionManagerLayer<Store>
where
	Store: SessionStore + fmt::Debug,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
	{
		f.debug_struct("SessionManagerLayer")
			.field("config", &*self.config)
			.field("store", &self.store)
			.finish()
	}
}

impl<Store> Clone for SessionManagerLayer<Store>
where
	Store: SessionStore + Clone,
{
	fn clone(&self) -> Self
	{
		Self { config: Arc::clone(&self.config), store: self.store.clone() }
	}

	fn clone_from(&mut self, source: &Self)
	{
		self.config.clone_from(&source.config);
		self.store.clone_from(&source.store);
	}
}
