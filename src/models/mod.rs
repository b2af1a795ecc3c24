pub mod event;
pub mod order;
pub mod ticket;
pub mod user;

pub use event::{Event, EventStatus};
pub use order::{NewHistory, NewOrder, Order, OrderStatus, OrderStatusHistory, OrderWithTickets};
pub use ticket::{NewTicket, Ticket, TicketStatus, TicketType};
pub use user::User;
