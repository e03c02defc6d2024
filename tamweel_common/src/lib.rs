mod halalas;

pub mod op;

pub use halalas::{Halalas, HalalasConversionError, SAR_CURRENCY_CODE, SAR_CURRENCY_CODE_LOWER};
