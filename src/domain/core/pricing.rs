use serde::{Deserialize, Serialize};

use super::{Controllers, Money, SessionLength, ValidationError};

/// 時間あたりの料金表
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    base_per_hour: Money,
    extra_controller_per_hour: Money,
}

impl RateCard {
    pub fn new(base_per_hour: Money, extra_controller_per_hour: Money) -> Result<Self, ValidationError> {
        for rate in [base_per_hour, extra_controller_per_hour] {
            if rate.is_negative() {
                return Err(ValidationError::NegativeAmount(rate));
            }
        }
        Ok(Self {
            base_per_hour,
            extra_controller_per_hour,
        })
    }

    pub fn base_per_hour(&self) -> Money {
        self.base_per_hour
    }

    pub fn extra_controller_per_hour(&self) -> Money {
        self.extra_controller_per_hour
    }
}

impl Default for RateCard {
    /// 基本料金149.00/時、追加コントローラー40.00/時
    fn default() -> Self {
        Self {
            base_per_hour: Money::from_major(149),
            extra_controller_per_hour: Money::from_major(40),
        }
    }
}

/// 料金の内訳
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceBreakdown {
    base_price: Money,
    controller_charges: Money,
    total_price: Money,
}

impl PriceBreakdown {
    pub fn new(base_price: Money, controller_charges: Money) -> Self {
        Self {
            base_price,
            controller_charges,
            total_price: base_price + controller_charges,
        }
    }

    pub fn base_price(&self) -> Money {
        self.base_price
    }

    pub fn controller_charges(&self) -> Money {
        self.controller_charges
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }
}

/// 利用時間とコントローラー数から料金を計算する
///
/// 端数は最小通貨単位で四捨五入する。
pub fn compute_price_breakdown(
    duration: SessionLength,
    controllers: Controllers,
    rates: &RateCard,
) -> PriceBreakdown {
    let minutes = duration.minutes() as i64;
    let base_price = rates.base_per_hour.scale_round(minutes, 60);
    let controller_charges = rates
        .extra_controller_per_hour
        .scale_round(controllers.extra() as i64 * minutes, 60);
    PriceBreakdown::new(base_price, controller_charges)
}

/// 入力値を検証してから料金を計算する
pub fn quote(
    duration_minutes: u32,
    controllers: u32,
    rates: &RateCard,
) -> Result<PriceBreakdown, ValidationError> {
    let duration = SessionLength::try_from(duration_minutes)?;
    let controllers = Controllers::new(controllers)?;
    Ok(compute_price_breakdown(duration, controllers, rates))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(duration: u32, controllers: u32) -> PriceBreakdown {
        quote(duration, controllers, &RateCard::default()).unwrap()
    }

    #[test]
    fn test_single_controller_hour() {
        let p = price(60, 1);
        assert_eq!(p.base_price(), Money::from_major(149));
        assert_eq!(p.controller_charges(), Money::ZERO);
        assert_eq!(p.total_price(), Money::from_major(149));
    }

    #[test]
    fn test_three_controllers_hour() {
        let p = price(60, 3);
        assert_eq!(p.base_price(), Money::from_major(149));
        assert_eq!(p.controller_charges(), Money::from_major(80));
        assert_eq!(p.total_price(), Money::from_major(229));
    }

    #[test]
    fn test_half_hour_keeps_paise() {
        let p = price(30, 2);
        assert_eq!(p.base_price(), Money::from_minor(7450));
        assert_eq!(p.controller_charges(), Money::from_major(20));
        assert_eq!(p.total_price(), Money::from_minor(9450));
    }

    #[test]
    fn test_all_combinations_are_deterministic_and_consistent() {
        let rates = RateCard::default();
        for duration in SessionLength::ALL {
            for count in Controllers::MIN..=Controllers::MAX {
                let controllers = Controllers::new(count).unwrap();
                let first = compute_price_breakdown(duration, controllers, &rates);
                let second = compute_price_breakdown(duration, controllers, &rates);
                assert_eq!(first, second);
                assert_eq!(first.total_price(), first.base_price() + first.controller_charges());
                assert!(!first.base_price().is_negative());
                assert!(!first.controller_charges().is_negative());
            }
        }
    }

    #[test]
    fn test_rounding_is_half_up() {
        // 1.01/時 × 30分 = 0.505 -> 0.51
        let rates = RateCard::new(Money::from_minor(101), Money::ZERO).unwrap();
        let p = quote(30, 1, &rates).unwrap();
        assert_eq!(p.base_price(), Money::from_minor(51));
    }

    #[test]
    fn test_out_of_domain_inputs_are_rejected() {
        let rates = RateCard::default();
        assert_eq!(quote(45, 1, &rates), Err(ValidationError::InvalidDuration(45)));
        assert_eq!(quote(60, 0, &rates), Err(ValidationError::InvalidControllers(0)));
        assert_eq!(quote(60, 5, &rates), Err(ValidationError::InvalidControllers(5)));
        assert!(RateCard::new(Money::from_minor(-1), Money::ZERO).is_err());
    }
}
