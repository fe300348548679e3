pub mod headers;
pub mod json_response;
