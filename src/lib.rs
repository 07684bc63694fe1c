pub mod auth;
pub mod config;
pub mod connection;
pub mod exception;
pub mod handler;
pub mod listener;
pub mod param;
pub mod parser;
pub mod pool;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod writer;

pub use auth::{Access, AuthError, AuthGate, Principal, StaticTokenValidator, TokenValidator};
pub use config::Config;
pub use exception::Exception;
pub use handler::{Context, Handler, HandlerError};
pub use param::{HttpRequestMethod, HttpVersion};
pub use parser::RequestParser;
pub use pool::ThreadPool;
pub use request::Request;
pub use response::Response;
pub use router::Router;
pub use server::HttpServer;
pub use writer::ResponseWriter;
