pub mod api;
pub mod errors;
pub mod events;
pub mod ids;
pub mod session;

pub use api::TrackerApi;
pub use errors::{ApiError, ChannelError};
pub use events::{CameraAction, InboundEvent, OutboundCommand};
pub use ids::SessionId;
pub use session::{
    ConnectionState, Session, SessionDraft, Settings, Sport, Stats, TrackingState,
};
