mod list_view;
mod session;

pub use list_view::{ListSnapshot, ListView};
pub use session::{BusyKind, ImportReport, ListFocus, ListSession, SessionServices};
