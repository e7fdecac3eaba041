mod incoming;
mod outgoing;

pub use incoming::{Admit, IncomingConduit};
pub use outgoing::{MulticastOutgoingConduit, OutgoingConduit};
