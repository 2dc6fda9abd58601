pub mod seat;
pub mod session;
pub mod ticket;
pub mod user;

pub use seat::{Seat, SeatAvailability, SeatStatus};
pub use session::Session;
pub use ticket::{NewTicket, Ticket, TicketStatus, TicketUpdate, UnknownTicketStatus};
pub use user::{Identity, UserCredentials};
