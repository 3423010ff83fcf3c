use crate::cache::ListQuery;
use crate::coordinator::{MutationSpec, PatchKind};
use crate::validation::schemas;

pub const AVAILABLE_BOOKS_QUERY: &str = r#"
query GetAvailableBooks($searchString: String, $typeCode: String, $offset: Int, $limit: Int) {
  getAvailableBooks(searchString: $searchString, typeCode: $typeCode, offset: $offset, limit: $limit) {
    id
    title
    author { id name }
    condition
    price
    status
    type
    published_date
    isbn
    cover_url
    description
  }
}"#;

pub const ADD_BOOK_MUTATION: &str = r#"
mutation AddBook($title: String!, $authorId: Int!, $publishedDate: DateTime, $type: String, $status: String!, $condition: String!, $isbn: Int!, $categoryId: Int!, $languageId: Int!, $price: Float!, $description: String, $coverFile: Upload!) {
  addBook(title: $title, authorId: $authorId, publishedDate: $publishedDate, type: $type, status: $status, condition: $condition, isbn: $isbn, categoryId: $categoryId, languageId: $languageId, price: $price, description: $description, coverFile: $coverFile) {
    book { id title author { id name } condition price status type isbn cover_url }
    errors { path message }
  }
}"#;

pub const UPDATE_BOOK_MUTATION: &str = r#"
mutation UpdateBook($id: Int!, $title: String!, $authorId: Int!, $publishedDate: DateTime, $type: String, $status: String!, $condition: String!, $isbn: Int!, $categoryId: Int!, $languageId: Int!, $price: Float!, $description: String, $coverFile: Upload) {
  updateBook(id: $id, title: $title, authorId: $authorId, publishedDate: $publishedDate, type: $type, status: $status, condition: $condition, isbn: $isbn, categoryId: $categoryId, languageId: $languageId, price: $price, description: $description, coverFile: $coverFile) {
    book { id title author { id name } condition price status type isbn cover_url }
    errors { path message }
  }
}"#;

pub const DELETE_BOOK_MUTATION: &str = r#"
mutation DeleteBook($id: Int!) {
  deleteBook(id: $id) {
    book { id }
    errors { path message }
  }
}"#;

/// The storefront list. Search text and type filter select distinct result
/// sets; paging does not.
pub fn available_books() -> ListQuery {
    ListQuery::new("GetAvailableBooks", "getAvailableBooks").with_key_args(&["searchString", "typeCode"])
}

pub fn add_book() -> MutationSpec {
    MutationSpec::new("AddBook", "addBook", ADD_BOOK_MUTATION)
        .with_schema(schemas::add_book())
        .with_entity("book")
        .with_patch(PatchKind::Prepend)
        .with_list(available_books())
}

pub fn update_book() -> MutationSpec {
    MutationSpec::new("UpdateBook", "updateBook", UPDATE_BOOK_MUTATION)
        .with_schema(schemas::update_book())
        .with_entity("book")
        .with_patch(PatchKind::Replace)
        .with_list(available_books())
}

pub fn delete_book() -> MutationSpec {
    MutationSpec::new("DeleteBook", "deleteBook", DELETE_BOOK_MUTATION)
        .with_entity("book")
        .with_patch(PatchKind::Remove)
        .with_list(available_books())
}
