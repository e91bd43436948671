pub mod bulk;
pub mod document;
pub mod scroll_response;
pub mod server_info;
