//! Field rulesets for the marketplace forms

use super::{Field, Schema};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

/// Optional international phone number; empty is accepted.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^$|^((\+[1-9]{1,4}[ -]*)|(\([0-9]{2,3}\)[ -]*)|([0-9]{2,4})[ -]*)*?[0-9]{3,4}?[ -]*[0-9]{3,4}?$",
    )
    .unwrap()
});

fn email_field(required: &str) -> Field {
    Field::string("email")
        .min(3, "Email must be at least 3 characters")
        .max_len(255)
        .email("Email must be a valid email")
        .required(required)
}

fn phone_field() -> Field {
    Field::string("phone").matches(PHONE_RE.clone(), "Phone number is not valid")
}

pub fn create_account() -> Schema {
    Schema::new()
        .field(Field::string("name").required("Name is required"))
        .field(email_field("Email is required"))
        .field(
            Field::string("password")
                .min(3, "Password must be at least 3 characters")
                .max_len(255)
                .required("Password is required"),
        )
        .field(
            Field::string("confirmPassword")
                .min(3, "Confirm Password must be at least 3 characters")
                .max_len(255)
                .equals_field("password", "Passwords don't match")
                .required("Confirm password is required"),
        )
        .field(phone_field())
}

pub fn profile() -> Schema {
    Schema::new()
        .field(Field::string("name").required("Name is required"))
        .field(email_field("Email is required"))
        .field(phone_field())
}

pub fn password_change() -> Schema {
    Schema::new()
        .field(Field::string("password").required("Password is required"))
        .field(
            Field::string("newPassword")
                .min(3, "Password must be at least 3 characters")
                .max_len(255)
                .required("Password is required"),
        )
        .field(
            Field::string("confirmNewPassword")
                .min(3, "Confirm Password must be at least 3 characters")
                .max_len(255)
                .equals_field("newPassword", "Passwords don't match")
                .required("Confirm password is required"),
        )
}

pub fn forgot_password_request() -> Schema {
    Schema::new().field(email_field("Email is required"))
}

pub fn password_reset() -> Schema {
    Schema::new()
        .field(
            Field::string("password")
                .min(3, "Password must be at least 3 characters")
                .max_len(255)
                .required("Password is required"),
        )
        .field(
            Field::string("confirmPassword")
                .min(3, "Password must be at least 3 characters")
                .max_len(255)
                .equals_field("password", "Passwords don't match")
                .required("Confirm password is required"),
        )
}

pub fn sign_in() -> Schema {
    Schema::new()
        .field(
            Field::string("email")
                .min(3, "Invalid signIn")
                .max(255, "Invalid signIn")
                .email("Invalid signIn")
                .required("Email is required"),
        )
        .field(
            Field::string("password")
                .min(3, "Password must be at least 3 characters")
                .max_len(255)
                .required("Password is required"),
        )
}

fn book_fields(schema: Schema) -> Schema {
    schema
        .field(Field::string("title").required("Title is required"))
        .field(Field::number("authorId").required("Author is required"))
        .field(Field::number("languageId").required("Language is required"))
        .field(Field::number("categoryId").required("Category is required"))
        .field(Field::number("price").positive().required("Price is required"))
        .field(
            Field::string("status")
                .default_value(json!("available"))
                .required("Status is required"),
        )
        .field(
            Field::string("condition")
                .default_value(json!("new"))
                .required("Condition is required"),
        )
        .field(
            Field::number("isbn")
                .positive()
                .integer("ISBN is required")
                .required("ISBN is required"),
        )
        .field(Field::string("publishedDate"))
}

pub fn add_book() -> Schema {
    book_fields(Schema::new()).field(Field::file("coverFile").required("A file is required"))
}

/// Editing keeps the existing cover unless a new one is picked.
pub fn update_book() -> Schema {
    book_fields(Schema::new().field(Field::number("id").required("Book is required")))
        .field(Field::file("coverFile"))
}

/// Checking out closes the order and moves the book to sold or rented.
/// Rentals carry a return date; sales send none.
pub fn checkout() -> Schema {
    Schema::new()
        .field(Field::number("orderId").required("Order is required"))
        .field(Field::number("totalPrice").positive().required("Total price is required"))
        .field(Field::date("returnDate"))
        .field(
            Field::string("orderStatus")
                .default_value(json!("closed"))
                .required("Order status is required"),
        )
        .field(
            Field::string("bookStatus")
                .default_value(json!("sold"))
                .required("Book status is required"),
        )
        .field(
            Field::string("status")
                .default_value(json!("closed"))
                .required("Status is required"),
        )
        .field(Field::string("note"))
}

pub fn update_checkout() -> Schema {
    Schema::new()
        .field(Field::number("checkoutId").required("Checkout is required"))
        .field(Field::date("returnDate").required("Return date is required"))
        .field(
            Field::number("totalPrice")
                .positive()
                .integer("Total price must be a whole amount")
                .required("Total price is required"),
        )
        .field(Field::string("status").required("Status is required"))
        .field(Field::string("note"))
}

pub fn add_author() -> Schema {
    Schema::new().field(
        Field::string("name")
            .max_len(255)
            .required("Author is required"),
    )
}
