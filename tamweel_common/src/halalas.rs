use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const SAR_CURRENCY_CODE: &str = "SAR";
pub const SAR_CURRENCY_CODE_LOWER: &str = "sar";

//--------------------------------------      Halalas       ----------------------------------------------------------
/// A monetary amount in halalas (1 riyal = 100 halalas). All financial fields in the marketplace are stored as
/// integer halalas to keep arithmetic exact.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Halalas(i64);

op!(binary Halalas, Add, add);
op!(binary Halalas, Sub, sub);
op!(inplace Halalas, SubAssign, sub_assign);
op!(unary Halalas, Neg, neg);

impl Mul<i64> for Halalas {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Halalas {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in halalas: {0}")]
pub struct HalalasConversionError(String);

impl From<i64> for Halalas {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Halalas {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Halalas {}

impl TryFrom<u64> for Halalas {
    type Error = HalalasConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(HalalasConversionError(format!("Value {} is too large to convert to Halalas", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Halalas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let riyals = self.0 as f64 / 100.0;
        write!(f, "{riyals:0.2} {SAR_CURRENCY_CODE}")
    }
}

impl Halalas {
    pub const fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_sar(riyals: i64) -> Self {
        Self(riyals * 100)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Halalas::from_sar(10);
        let b = Halalas::from(50);
        assert_eq!(a + b, Halalas::from(1050));
        assert_eq!(a - b, Halalas::from(950));
        assert_eq!(-b, Halalas::from(-50));
        assert_eq!(a * 3, Halalas::from_sar(30));
        let total: Halalas = [a, b].into_iter().sum();
        assert_eq!(total, Halalas::from(1050));
    }

    #[test]
    fn display_is_in_riyals() {
        assert_eq!(Halalas::from(1050).to_string(), "10.50 SAR");
        assert_eq!(Halalas::from_sar(500).to_string(), "500.00 SAR");
    }
}
