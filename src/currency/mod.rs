//! Currency conversion for linked money fields.
//!
//! A conversion pair links a main money field (source currency) with a
//! secondary field showing the same amount in a target currency. The pair
//! starts collapsed; once expanded, edits on either side are converted to
//! the other after a debounce. Rates live in a [`RateCache`] shared by every
//! pair of one flow instance.

pub mod cache;
pub mod controller;
pub mod converter;
pub mod pair;

pub use cache::RateCache;
pub use controller::ConversionController;
pub use converter::CurrencyConverter;
pub use pair::{
    ConversionPair, ConversionSnapshot, ConversionState, ConversionTicket, Direction, EditedField,
};
