//! QManager control-plane client.
//!
//! The service speaks XML-RPC over HTTP at `http://<server>:<port>/RPC2`.
//! [`xmlrpc`] converts between XML-RPC documents and [`serde_json::Value`];
//! [`QmClient`] posts calls and decodes replies into the typed views of
//! `qmanager-protocol`.

pub mod client;
pub mod error;
pub mod xmlrpc;

pub use client::QmClient;
pub use error::ClientError;
