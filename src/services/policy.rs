//! Order gating policy.
//!
//! [`evaluate`] is a pure function over the order, the credential's policy
//! and the notional already spent today. Checks run in a fixed order and the
//! first failure wins:
//!
//! 1. credential enabled
//! 2. symbol on the allow-list (empty list allows everything)
//! 3. order notional within `max_order_size`
//! 4. stop loss present when required
//! 5. today's notional plus this order within `daily_limit`

use std::fmt;

use crate::models::{credential::Policy, order::WebhookOrder};

/// Why an order was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    Disabled,
    SymbolNotAllowed,
    OrderTooLarge,
    StopLossRequired,
    DailyLimitExceeded,
}

impl DenialReason {
    /// Stable reason code exposed in responses and the audit log.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::Disabled => "webhook_disabled",
            DenialReason::SymbolNotAllowed => "symbol_not_allowed",
            DenialReason::OrderTooLarge => "order_too_large",
            DenialReason::StopLossRequired => "stop_loss_required",
            DenialReason::DailyLimitExceeded => "daily_limit_exceeded",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::Disabled => "Webhook is disabled",
            DenialReason::SymbolNotAllowed => "Symbol is not allowed for this webhook",
            DenialReason::OrderTooLarge => "Order exceeds the maximum order size",
            DenialReason::StopLossRequired => "A stop loss is required for this webhook",
            DenialReason::DailyLimitExceeded => "Order would exceed the daily limit",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Denied(DenialReason),
}

/// Evaluate an order against a credential's policy.
///
/// `spent_today` is the notional of the credential's successful executions
/// since the start of the current UTC day.
pub fn evaluate(
    order: &WebhookOrder,
    enabled: bool,
    policy: &Policy,
    spent_today: f64,
) -> PolicyDecision {
    if !enabled {
        return PolicyDecision::Denied(DenialReason::Disabled);
    }

    if !policy.allowed_symbols.is_empty() && !policy.allowed_symbols.contains(&order.symbol) {
        return PolicyDecision::Denied(DenialReason::SymbolNotAllowed);
    }

    let notional = order.notional();
    if notional > policy.max_order_size {
        return PolicyDecision::Denied(DenialReason::OrderTooLarge);
    }

    if policy.require_stop_loss && order.stop_loss.is_none() {
        return PolicyDecision::Denied(DenialReason::StopLossRequired);
    }

    if spent_today + notional > policy.daily_limit {
        return PolicyDecision::Denied(DenialReason::DailyLimitExceeded);
    }

    PolicyDecision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::Action;

    fn order(quantity: f64, price: Option<f64>) -> WebhookOrder {
        WebhookOrder {
            action: Action::Buy,
            symbol: "BTC".to_string(),
            quantity,
            price,
            order_type: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    fn policy(max_order_size: f64) -> Policy {
        Policy {
            allowed_symbols: Default::default(),
            max_order_size,
            daily_limit: 1_000_000.0,
            require_stop_loss: false,
        }
    }

    #[test]
    fn large_order_is_denied() {
        let decision = evaluate(&order(1.0, Some(50_000.0)), true, &policy(1000.0), 0.0);
        assert_eq!(decision, PolicyDecision::Denied(DenialReason::OrderTooLarge));
    }

    #[test]
    fn same_order_allowed_under_bigger_limit() {
        let decision = evaluate(&order(1.0, Some(50_000.0)), true, &policy(100_000.0), 0.0);
        assert_eq!(decision, PolicyDecision::Allowed);
    }

    #[test]
    fn order_exactly_at_limit_is_allowed() {
        let decision = evaluate(&order(2.0, Some(500.0)), true, &policy(1000.0), 0.0);
        assert_eq!(decision, PolicyDecision::Allowed);
    }

    #[test]
    fn priceless_order_is_sized_by_quantity() {
        assert_eq!(
            evaluate(&order(5000.0, None), true, &policy(1000.0), 0.0),
            PolicyDecision::Denied(DenialReason::OrderTooLarge)
        );
        assert_eq!(
            evaluate(&order(10.0, None), true, &policy(1000.0), 0.0),
            PolicyDecision::Allowed
        );
    }

    #[test]
    fn disabled_wins_over_everything() {
        let mut strict = policy(1.0);
        strict.require_stop_loss = true;
        strict.allowed_symbols.insert("ETH".to_string());

        let decision = evaluate(&order(100.0, Some(100.0)), false, &strict, 1e12);
        assert_eq!(decision, PolicyDecision::Denied(DenialReason::Disabled));
    }

    #[test]
    fn symbol_checked_before_size() {
        let mut restricted = policy(1.0);
        restricted.allowed_symbols.insert("ETH".to_string());

        let decision = evaluate(&order(100.0, Some(100.0)), true, &restricted, 0.0);
        assert_eq!(decision, PolicyDecision::Denied(DenialReason::SymbolNotAllowed));
    }

    #[test]
    fn empty_allow_list_is_unrestricted() {
        let mut any = order(1.0, Some(1.0));
        any.symbol = "DOGE".to_string();
        assert_eq!(evaluate(&any, true, &policy(10.0), 0.0), PolicyDecision::Allowed);
    }

    #[test]
    fn stop_loss_required() {
        let mut p = policy(1000.0);
        p.require_stop_loss = true;

        let mut o = order(1.0, Some(10.0));
        assert_eq!(
            evaluate(&o, true, &p, 0.0),
            PolicyDecision::Denied(DenialReason::StopLossRequired)
        );

        o.stop_loss = Some(9.0);
        assert_eq!(evaluate(&o, true, &p, 0.0), PolicyDecision::Allowed);
    }

    #[test]
    fn daily_limit_counts_prior_spend() {
        let mut p = policy(5000.0);
        p.daily_limit = 10_000.0;
        let o = order(0.05, Some(60_000.0));

        assert_eq!(evaluate(&o, true, &p, 6000.0), PolicyDecision::Allowed);
        assert_eq!(evaluate(&o, true, &p, 7000.0), PolicyDecision::Allowed);
        assert_eq!(
            evaluate(&o, true, &p, 9000.0),
            PolicyDecision::Denied(DenialReason::DailyLimitExceeded)
        );
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(DenialReason::OrderTooLarge.code(), "order_too_large");
        assert_eq!(DenialReason::DailyLimitExceeded.code(), "daily_limit_exceeded");
    }
}
