pub mod cbr;

pub use cbr::{CbrProvider, DOMESTIC_CURRENCY, DailyQuotes};
