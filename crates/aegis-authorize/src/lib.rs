//! # aegis-authorize
//!
//! `AuthorizeEngine` (`spec.md` §4.K): the authorization endpoint's
//! request-validation pipeline ([`validate`]), response-mode selection
//! and redirect/form_post construction ([`redirect`]), the
//! init/authenticating/consent/approved/finalized/denied/error state
//! machine ([`state`]), and [`engine::AuthorizeEngine`] tying them
//! together with [`aegis_grants::CodeStore`] and
//! [`aegis_tokens::TokenService`] to mint success material.

pub mod client;
pub mod engine;
pub mod redirect;
pub mod request;
pub mod state;
pub mod validate;

pub use client::{ClientJwksLookup, ClientLookup, ClientProfile};
pub use engine::{AuthorizeEngine, AuthorizeError, CodeGrantTokens, FinalizeInput};
pub use redirect::RedirectTarget;
pub use request::{AuthorizationRequest, PkceParams, ResponseMode, ResponseType};
pub use state::{transition, AuthorizationState};
pub use validate::{validate_client_and_redirect, validate_post_redirect, PreRedirectValidated, ValidatedRequest};
