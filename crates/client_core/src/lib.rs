//! Client-side flows for the consultation marketplace: the signed-in
//! session, the booking form, the simulated consultation room and the REST
//! client used by the directory and back-office screens.

pub mod api;
pub mod booking;
pub mod room;
pub mod session;
pub mod timing;

pub use api::{load_screen, ClientError, MarketplaceClient, ScreenData};
pub use booking::{BookingDraft, BookingError, BookingFlow, BookingReceipt, BookingState};
pub use room::{
    CannedReplies, ChatMessage, ConsultationRoom, ReplyGenerator, RoomError, RoomEvent, RoomState,
    Speaker,
};
pub use session::{SessionStore, UserSession};
pub use timing::{FlowTimings, Navigation};
