use serde::Serialize;

/// A purchasable bundle, as far as payments are concerned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

impl Offer {
    /// The gateway only takes whole shillings.
    pub fn charge_amount(&self) -> i64 {
        self.price.round() as i64
    }

    pub fn account_reference(&self) -> String {
        format!("PKG-{}", self.id)
    }

    pub fn transaction_desc(&self) -> String {
        format!("Payment for package {}", self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub id: i64,
    pub name: String,
    pub amount: f64,
}

impl From<&Offer> for PackageSummary {
    fn from(offer: &Offer) -> Self {
        PackageSummary {
            id: offer.id,
            name: offer.name.clone(),
            amount: offer.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_is_rounded_to_whole_units() {
        let mut offer = Offer { id: 1, name: "1GB Daily".into(), price: 99.5 };
        assert_eq!(offer.charge_amount(), 100);
        offer.price = 20.49;
        assert_eq!(offer.charge_amount(), 20);
    }

    #[test]
    fn reference_tags_the_item_id() {
        let offer = Offer { id: 42, name: "Weekly SMS".into(), price: 30.0 };
        assert_eq!(offer.account_reference(), "PKG-42");
        assert_eq!(offer.transaction_desc(), "Payment for package Weekly SMS");
    }
}
