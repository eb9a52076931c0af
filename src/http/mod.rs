pub mod connection;
pub mod request;
pub mod response;

pub use connection::{Connection, Phase};
pub use request::{HttpRequest, Method, ParseError, ParsingState};
pub use response::{mime_type_for, Body, HttpResponse, StatusCode};
