pub mod admin;
pub mod alfred;
pub mod board;
pub mod clock;
pub mod remote;
pub mod session;

pub use admin::{AdminAccess, AdminGate};
pub use alfred::{AlfredAction, AlfredCommand, AlfredReport, DEFAULT_CANCEL_KEYWORD};
pub use board::{BreakBoard, BreakTransition, UNASSIGNED_TEAM};
pub use clock::{Clock, ManualClock, SystemClock};
pub use remote::{HttpRemote, NoRemote, RemoteSync, DEFAULT_REMOTE_TIMEOUT};
pub use session::{BoardSession, Committed};
