pub mod attempt;
pub mod message;
pub mod requests;
pub mod responses;

pub use attempt::*;
pub use message::*;
pub use requests::*;
pub use responses::*;
