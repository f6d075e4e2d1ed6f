//! # aegis-grants
//!
//! Single-consume request/grant material that doesn't need a dedicated
//! single-writer actor (unlike refresh families or sessions): authorization
//! codes ([`code::CodeStore`]), pushed-authorization-request records
//! ([`par::ParStore`]), and JWT-secured authorization request (JAR)
//! decode/verify ([`jar`]).

pub mod code;
pub mod jar;
pub mod par;

pub use code::{AuthorizationCode, CodeStore, ConsumedCode, Pkce, PkceMethod};
pub use par::ParStore;
