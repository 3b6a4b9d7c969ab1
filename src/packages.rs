//! The credit pack catalog.
//!
//! Fixed at deploy time; checkout looks packs up by id and writes the pack's
//! credit count into the session metadata the webhook later reads back.

use serde::Serialize;

/// One purchasable bundle of generation credits.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    /// catalog id used by checkout requests
    pub id: &'static str,
    /// display name
    pub name: &'static str,
    /// credits added on purchase
    pub credits: i32,
    /// price in cents
    pub price: i64,
    /// display price
    pub price_display: &'static str,
    /// percentage saved against the starter rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings: Option<u8>,
    /// highlighted in the purchase dialog
    pub popular: bool,
    /// one-line pitch
    pub description: &'static str,
}

/// Every pack the shop sells.
pub const CREDIT_PACKAGES: &[CreditPackage] = &[
    CreditPackage {
        id: "starter",
        name: "Starter Pack",
        credits: 10,
        price: 900,
        price_display: "$9",
        savings: None,
        popular: false,
        description: "Perfect for trying out",
    },
    CreditPackage {
        id: "value",
        name: "Value Pack",
        credits: 25,
        price: 2000,
        price_display: "$20",
        savings: Some(11),
        popular: true,
        description: "Most popular choice",
    },
    CreditPackage {
        id: "pro",
        name: "Pro Pack",
        credits: 50,
        price: 3500,
        price_display: "$35",
        savings: Some(22),
        popular: false,
        description: "Best value for money",
    },
    CreditPackage {
        id: "mega",
        name: "Mega Pack",
        credits: 100,
        price: 6000,
        price_display: "$60",
        savings: Some(33),
        popular: false,
        description: "For power users",
    },
];

/// Looks a pack up by catalog id.
pub fn package_by_id(id: &str) -> Option<&'static CreditPackage> {
    CREDIT_PACKAGES.iter().find(|package| package.id == id)
}

/// Dollar cost of a single credit within a pack, for display.
pub fn price_per_credit(price_cents: i64, credits: i32) -> String {
    if credits <= 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", price_cents as f64 / credits as f64 / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_known_packs() {
        let pack = package_by_id("value").expect("value pack");
        assert_eq!(pack.credits, 25);
        assert_eq!(pack.price, 2000);
        assert!(pack.popular);
        assert!(package_by_id("enterprise").is_none());
    }

    #[test]
    fn per_credit_price_formats_to_cents() {
        assert_eq!(price_per_credit(900, 10), "0.90");
        assert_eq!(price_per_credit(6000, 100), "0.60");
        assert_eq!(price_per_credit(100, 0), "0.00");
    }
}
