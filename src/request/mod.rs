mod body;
mod multipart;
mod query_parser;
mod request;

pub use multipart::UploadedFile;
pub use request::Request;
