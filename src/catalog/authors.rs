use crate::cache::ListQuery;
use crate::coordinator::{MutationSpec, PatchKind};
use crate::validation::schemas;

pub const AUTHORS_QUERY: &str = r#"
query GetAuthors {
  getAuthors {
    id
    name
  }
}"#;

pub const ADD_AUTHOR_MUTATION: &str = r#"
mutation AddAuthor($name: String!) {
  addAuthor(name: $name) {
    author { id name }
    errors { path message }
  }
}"#;

pub fn authors() -> ListQuery {
    ListQuery::new("GetAuthors", "getAuthors")
}

pub fn add_author() -> MutationSpec {
    MutationSpec::new("AddAuthor", "addAuthor", ADD_AUTHOR_MUTATION)
        .with_schema(schemas::add_author())
        .with_entity("author")
        .with_patch(PatchKind::Prepend)
        .with_list(authors())
}
