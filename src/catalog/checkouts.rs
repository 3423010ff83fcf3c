use serde_json::json;

use super::Feed;
use crate::cache::ListQuery;
use crate::coordinator::{MutationSpec, PatchKind};
use crate::record::Record;
use crate::subscription::{MergePolicy, SubscriptionSpec};
use crate::validation::schemas;

pub const ALL_CHECKOUTS_QUERY: &str = r#"
query GetAllCheckouts {
  getAllCheckouts {
    id
    total_price
    status
    return_date
    note
    orders { id books { id title status cover_url price } users { name email phone } }
  }
}"#;

pub const USER_CHECKOUTS_QUERY: &str = r#"
query GetUserCheckouts {
  getUserCheckouts {
    id
    total_price
    status
    return_date
    orders { id books { id title cover_url price } }
  }
}"#;

pub const CREATE_CHECKOUT_MUTATION: &str = r#"
mutation CreateCheckout($orderId: Int!, $totalPrice: Float!, $returnDate: DateTime, $orderStatus: String!, $bookStatus: String!, $status: String!, $note: String) {
  createCheckout(orderId: $orderId, totalPrice: $totalPrice, returnDate: $returnDate, orderStatus: $orderStatus, bookStatus: $bookStatus, status: $status, note: $note) {
    checkout { id total_price status return_date note }
    errors { path message }
  }
}"#;

pub const UPDATE_CHECKOUT_MUTATION: &str = r#"
mutation UpdateCheckout($checkoutId: Int!, $totalPrice: Float, $returnDate: DateTime, $bookStatus: String, $status: String!, $note: String) {
  updateCheckout(checkoutId: $checkoutId, totalPrice: $totalPrice, returnDate: $returnDate, bookStatus: $bookStatus, status: $status, note: $note) {
    checkout { id total_price status return_date note }
    errors { path message }
  }
}"#;

pub const LATEST_CHECKOUT_SUBSCRIPTION: &str = r#"
subscription LatestCheckout {
  latestCheckout {
    checkout { id total_price status return_date orders { id books { id title cover_url price } } }
  }
}"#;

pub fn all_checkouts() -> ListQuery {
    ListQuery::new("GetAllCheckouts", "getAllCheckouts")
}

pub fn user_checkouts() -> ListQuery {
    ListQuery::new("GetUserCheckouts", "getUserCheckouts")
}

pub fn create_checkout() -> MutationSpec {
    MutationSpec::new("CreateCheckout", "createCheckout", CREATE_CHECKOUT_MUTATION)
        .with_schema(schemas::checkout())
        .with_entity("checkout")
        .with_patch(PatchKind::Prepend)
        .with_list(all_checkouts())
}

pub fn update_checkout() -> MutationSpec {
    MutationSpec::new("UpdateCheckout", "updateCheckout", UPDATE_CHECKOUT_MUTATION)
        .with_schema(schemas::update_checkout())
        .with_entity("checkout")
        .with_patch(PatchKind::Replace)
        .with_list(all_checkouts())
}

/// Status fields of a checkout form, prefilled from the ordered book's
/// type. A rental stays open and leaves the book rented; anything else is a
/// sale that closes the checkout.
pub fn statuses_for(book_type: &str) -> Record {
    let (book_status, status) = match book_type {
        "rent" => ("rented", "open"),
        _ => ("sold", "closed"),
    };
    let mut values = Record::new();
    values.insert("orderStatus".into(), json!("closed"));
    values.insert("bookStatus".into(), json!(book_status));
    values.insert("status".into(), json!(status));
    values
}

/// The customer's checkouts, with a badge counting ones not yet seen.
pub fn latest_checkouts() -> Feed {
    Feed {
        subscription: SubscriptionSpec::new(
            "LatestCheckout",
            LATEST_CHECKOUT_SUBSCRIPTION,
            &["latestCheckout", "checkout"],
        ),
        list: user_checkouts(),
        policy: MergePolicy::AppendIfNew,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_sends_status_variables() {
        for variable in ["$totalPrice: Float!", "$orderStatus: String!", "$bookStatus: String!", "$status: String!"] {
            assert!(CREATE_CHECKOUT_MUTATION.contains(variable), "missing {}", variable);
        }
    }

    #[test]
    fn test_statuses_follow_book_type() {
        let rental = statuses_for("rent");
        assert_eq!(rental["bookStatus"], json!("rented"));
        assert_eq!(rental["status"], json!("open"));
        assert_eq!(rental["orderStatus"], json!("closed"));

        let sale = statuses_for("sell");
        assert_eq!(sale["bookStatus"], json!("sold"));
        assert_eq!(sale["status"], json!("closed"));
    }
}
