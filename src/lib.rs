// Bookmart - Client core for the book marketplace

pub mod cache;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod errors;
pub mod record;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod validation;

pub use cache::{InMemoryCache, ListQuery, ListTarget, PatchOutcome, QueryCache, QueryKey};
pub use config::ClientConfig;
pub use coordinator::{FormState, MutationCoordinator, MutationResult, MutationSpec, SubmitOutcome};
pub use errors::{ErrorSet, FieldError};
pub use record::{EntityId, FileUpload, Record};
pub use session::{Session, SessionView};
pub use subscription::{MergePolicy, SubscriptionHandle};
pub use transport::{HttpTransport, SimTransport, TransportError, WsTransport};
