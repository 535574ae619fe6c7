#![cfg(feature = "net")]

mod deadline;
mod handler;
mod parser;
mod response;

pub(super) use deadline::RequestDeadline;
pub(super) use handler::{HttpHandlerError, HttpRequestContext};
pub use parser::read_request;
pub use parser::SimpleHttpRequest;
pub(super) use response::{find_header_terminator, write_json_response};
