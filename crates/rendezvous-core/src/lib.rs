pub mod errors;
pub mod ids;
pub mod protocol;
pub mod registry;
pub mod signaling;

pub use errors::{FrameError, SignalingError};
pub use ids::{ConnectionId, Token};
pub use protocol::{ClientEvent, DisconnectReason, ServerEvent};
pub use registry::{Role, Session, SessionRegistry};
pub use signaling::{EventSink, Signaling};
