//! Orders
//!
//! A customer orders a book from its page and may cancel the order until an
//! admin checks it out. Admins watch every new order arrive; customers watch
//! the status of their own orders change.

use super::Feed;
use crate::cache::ListQuery;
use crate::coordinator::{MutationSpec, PatchKind};
use crate::subscription::{MergePolicy, SubscriptionSpec};

pub const ALL_ORDERS_QUERY: &str = r#"
query GetAllOrders {
  getAllOrders {
    id
    order_date
    status
    user_id
    book_id
    books { id title price status type cover_url }
  }
}"#;

pub const USER_ORDERS_QUERY: &str = r#"
query GetUserOrders {
  getUserOrders {
    id
    order_date
    status
    books { id title price status type cover_url }
  }
}"#;

pub const CREATE_ORDER_MUTATION: &str = r#"
mutation CreateOrder($bookId: Int!) {
  createOrder(bookId: $bookId) {
    order { id order_date status user_id book_id }
    errors { path message }
  }
}"#;

pub const CANCEL_ORDER_MUTATION: &str = r#"
mutation CancelOrder($bookId: Int!) {
  cancelOrder(bookId: $bookId) {
    order { id order_date status user_id book_id }
    errors { path message }
  }
}"#;

pub const LATEST_ORDER_SUBSCRIPTION: &str = r#"
subscription LatestOrder {
  latestOrder {
    order { id order_date status user_id book_id books { id title price status type cover_url } }
  }
}"#;

pub const UPDATED_ORDER_SUBSCRIPTION: &str = r#"
subscription UpdatedOrder {
  updatedOrder {
    order { id order_date status books { id title price status type cover_url } }
  }
}"#;

pub fn all_orders() -> ListQuery {
    ListQuery::new("GetAllOrders", "getAllOrders")
}

pub fn user_orders() -> ListQuery {
    ListQuery::new("GetUserOrders", "getUserOrders")
}

pub fn create_order() -> MutationSpec {
    MutationSpec::new("CreateOrder", "createOrder", CREATE_ORDER_MUTATION)
        .with_entity("order")
        .with_patch(PatchKind::Prepend)
        .with_list(user_orders())
}

pub fn cancel_order() -> MutationSpec {
    MutationSpec::new("CancelOrder", "cancelOrder", CANCEL_ORDER_MUTATION)
        .with_entity("order")
        .with_patch(PatchKind::Replace)
        .with_list(user_orders())
}

/// New orders appended to the admin list.
pub fn latest_orders() -> Feed {
    Feed {
        subscription: SubscriptionSpec::new("LatestOrder", LATEST_ORDER_SUBSCRIPTION, &["latestOrder", "order"]),
        list: all_orders(),
        policy: MergePolicy::AppendIfNew,
    }
}

/// Status changes applied to the customer's own orders.
pub fn updated_orders() -> Feed {
    Feed {
        subscription: SubscriptionSpec::new("UpdatedOrder", UPDATED_ORDER_SUBSCRIPTION, &["updatedOrder", "order"]),
        list: user_orders(),
        policy: MergePolicy::ReplaceById,
    }
}
