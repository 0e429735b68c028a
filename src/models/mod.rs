// Models module
pub mod conversation;
pub mod currency;
pub mod pricing;

pub use conversation::{Conversation, FetchedConversation, Message};
pub use currency::{CurrencyConverter, format_currency};
pub use pricing::SegmentPricing;
