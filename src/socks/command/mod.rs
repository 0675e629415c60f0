//! SOCKS5 request parsing and reply encoding

mod parser;
mod reply;

pub use parser::parse_request;
pub use reply::{encode_reply, send_failure, send_success, write_reply};
