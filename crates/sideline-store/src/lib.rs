pub mod error;
pub mod state;
pub mod store;

pub use error::StoreError;
pub use state::{Action, FeedbackNote, Snapshot};
pub use store::SessionStore;
