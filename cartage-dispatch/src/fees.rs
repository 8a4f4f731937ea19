/// Gateway transaction-fee rates by payment method.
///
/// Card payments carry the 3.5% processing rate; e-wallet rails settle at
/// 2.5%. Unknown methods are billed at the card rate.
pub fn fee_rate(method: &str) -> f64 {
    match method {
        "gcash" | "grab_pay" | "paymaya" => 0.025,
        "card" => 0.035,
        _ => 0.035,
    }
}

/// Fee charged by the gateway for `amount`, rounded to centavos.
pub fn transaction_fee(method: &str, amount: f64) -> f64 {
    round_centavos(amount * fee_rate(method))
}

/// Amount remaining after the gateway fee.
pub fn net_amount(method: &str, amount: f64) -> f64 {
    round_centavos(amount - transaction_fee(method, amount))
}

fn round_centavos(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_fee() {
        assert_eq!(transaction_fee("card", 1000.0), 35.0);
        assert_eq!(net_amount("card", 1000.0), 965.0);
    }

    #[test]
    fn test_ewallet_fee() {
        assert_eq!(transaction_fee("gcash", 1000.0), 25.0);
        assert_eq!(net_amount("gcash", 1000.0), 975.0);
        assert_eq!(transaction_fee("grab_pay", 1000.0), 25.0);
        assert_eq!(transaction_fee("paymaya", 1000.0), 25.0);
    }

    #[test]
    fn test_unknown_method_falls_back_to_card_rate() {
        assert_eq!(transaction_fee("bank_transfer", 1000.0), 35.0);
    }

    #[test]
    fn test_fee_rounds_to_centavos() {
        assert_eq!(transaction_fee("card", 333.33), 11.67);
    }
}
