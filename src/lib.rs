pub mod config;
pub mod exception;
pub mod handler;
pub mod param;
pub mod pool;
pub mod redirect;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod util;

pub use config::Config;
pub use exception::{ConnectionError, Exception};
pub use handler::{Connection, ConnectionHandler, ConnectionObserver, LoggingObserver};
pub use param::{HttpRequestMethod, HttpVersion};
pub use redirect::{Redirect, SimpleRedirect};
pub use request::Request;
pub use response::{HttpOutput, RestOutput};
pub use router::{DispatchResult, RestHandler, RestResource, Route, Router};
pub use server::{Endpoint, Server, ServerOptions};
pub use session::{HttpSession, WebServer};
pub use util::HtmlBuilder;
