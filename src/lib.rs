//! Onboarding flows: schema-driven multi-step forms.
//!
//! A declarative schema is modified with caller overrides ([`schema`]),
//! resolved into field descriptors ([`fields`]), validated ([`validation`])
//! and sequenced into steps that submit to the employment API ([`flow`]).
//! Money fields convert between currencies through [`currency`]; the cost
//! calculator lives in [`estimation`].

pub mod config;
pub mod currency;
pub mod error;
pub mod estimation;
pub mod fields;
pub mod flow;
pub mod money;
pub mod schema;
pub mod transport;
pub mod validation;
