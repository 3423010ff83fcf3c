//! Accounts and sign-in
//!
//! Account mutations patch no list. Sign-in and account creation return a
//! token and the user; [`complete_sign_in`] hands both to the [`Session`].

use thiserror::Error;

use crate::coordinator::{MutationResult, MutationSpec};
use crate::credentials::CredentialError;
use crate::session::{Me, Session};
use crate::validation::schemas;

pub const ME_QUERY: &str = r#"
query Me {
  me { id name email phone is_admin }
}"#;

pub const CREATE_ACCOUNT_MUTATION: &str = r#"
mutation CreateAccount($name: String!, $email: String!, $phone: String, $password: String!) {
  createAccount(name: $name, email: $email, phone: $phone, password: $password) {
    token
    user { id name email phone is_admin }
    errors { path message }
  }
}"#;

pub const SIGN_IN_MUTATION: &str = r#"
mutation SignIn($email: String!, $password: String!) {
  signIn(email: $email, password: $password) {
    token
    user { id name email phone is_admin }
    errors { path message }
  }
}"#;

pub const UPDATE_PROFILE_MUTATION: &str = r#"
mutation UpdateProfile($name: String!, $email: String!, $phone: String) {
  updateProfile(name: $name, email: $email, phone: $phone) {
    user { id name email phone is_admin }
    errors { path message }
  }
}"#;

pub const UPDATE_PASSWORD_MUTATION: &str = r#"
mutation UpdatePassword($password: String!, $newPassword: String!) {
  updatePassword(password: $password, newPassword: $newPassword) {
    user { id name email phone is_admin }
    errors { path message }
  }
}"#;

#[derive(Error, Debug)]
pub enum SignInError {
    #[error("Response has no token")]
    MissingToken,

    #[error("Response has no usable user: {0}")]
    InvalidUser(String),

    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

pub fn create_account() -> MutationSpec {
    MutationSpec::new("CreateAccount", "createAccount", CREATE_ACCOUNT_MUTATION)
        .with_schema(schemas::create_account())
        .with_entity("user")
}

pub fn sign_in() -> MutationSpec {
    MutationSpec::new("SignIn", "signIn", SIGN_IN_MUTATION)
        .with_schema(schemas::sign_in())
        .with_entity("user")
}

pub fn update_profile() -> MutationSpec {
    MutationSpec::new("UpdateProfile", "updateProfile", UPDATE_PROFILE_MUTATION)
        .with_schema(schemas::profile())
        .with_entity("user")
}

pub fn update_password() -> MutationSpec {
    MutationSpec::new("UpdatePassword", "updatePassword", UPDATE_PASSWORD_MUTATION)
        .with_schema(schemas::password_change())
        .with_entity("user")
}

/// Persist the token of a successful sign-in or account creation and
/// publish the user.
pub async fn complete_sign_in(session: &Session, result: &MutationResult) -> Result<Me, SignInError> {
    let token = result
        .payload
        .get("token")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .ok_or(SignInError::MissingToken)?;
    let user = result
        .entity
        .clone()
        .ok_or_else(|| SignInError::InvalidUser("missing".into()))?;
    let me: Me = serde_json::from_value(user).map_err(|e| SignInError::InvalidUser(e.to_string()))?;

    session.sign_in(me.clone(), token.to_string()).await?;
    Ok(me)
}
