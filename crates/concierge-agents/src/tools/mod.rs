//! External-world collaborators the handlers call.
//!
//! Each backend is a narrow async trait with an in-memory implementation
//! suitable for local runs and tests. A real deployment swaps in IMAP,
//! CalDAV, or travel-API implementations behind the same traits; the
//! handlers never know the difference.

pub mod booking;
pub mod calendar;
pub mod email;

pub use booking::{BookingBackend, BookingConfirmation, BookingOption, StaticBookingCatalog};
pub use calendar::{CalendarBackend, CalendarEvent, InMemoryCalendar};
pub use email::{Email, InMemoryMailbox, MailboxBackend, OutgoingEmail};
