//! Stubber Mock Server
//!
//! A configurable mock HTTP API server. It serves static or script-computed
//! JSON responses from a declarative list of endpoint definitions, so API
//! clients can be built against a stand-in service before the real backend
//! exists.
//!
//! # Features
//!
//! - **Path Templates**: Route by `/users/{id}` style templates with path parameters
//! - **Static Responses**: Return a fixed status, headers, and JSON body
//! - **Scripted Responses**: Compute responses with sandboxed [Rhai](https://rhai.rs) scripts
//! - **OpenAPI**: Serve a generated OpenAPI 3.0 document at `/openapi.json`
//! - **Health Check**: `/health` always answers `ok`
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "endpoints": [
//!     {"path": "/hello", "method": "GET", "response": {"message": "Hello, World!"}},
//!     {
//!       "path": "/users/{id}",
//!       "method": "GET",
//!       "script": "#{ body: #{ id: req.params.id, name: greeting + \" \" + req.params.id } }",
//!       "context": {"greeting": "User"}
//!     }
//!   ]
//! }
//! ```

pub mod config;
pub mod matcher;
pub mod openapi;
pub mod request;
pub mod response;
pub mod routes;
pub mod script;
pub mod server;

pub use config::StubberConfig;
pub use server::MockServer;
