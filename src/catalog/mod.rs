//! Marketplace operations
//!
//! The concrete list queries, mutations and subscriptions of the book
//! marketplace, grouped by entity. Each mutation carries its schema and the
//! way it patches its list; each live feed names the list it keeps current.

pub mod authors;
pub mod books;
pub mod checkouts;
pub mod orders;
pub mod users;

use std::sync::Arc;

use serde_json::Value;

use crate::cache::{ListQuery, QueryCache};
use crate::subscription::{self, MergePolicy, SubscriptionHandle, SubscriptionSpec};
use crate::transport::{SubscriptionTransport, TransportError};

/// A subscription bound to the list it feeds.
#[derive(Clone, Debug)]
pub struct Feed {
    pub subscription: SubscriptionSpec,
    pub list: ListQuery,
    pub policy: MergePolicy,
}

impl Feed {
    /// Subscribe and keep the list fetched with `list_variables` current.
    pub async fn open(
        &self,
        transport: &dyn SubscriptionTransport,
        cache: Arc<dyn QueryCache>,
        list_variables: &Value,
    ) -> Result<SubscriptionHandle, TransportError> {
        subscription::subscribe(
            transport,
            cache,
            self.list.target(list_variables),
            &self.subscription,
            self.policy.clone(),
        )
        .await
    }
}
