use chrono::{DateTime, Utc};
use gazloc_core::{distance, Position, VendorId, VendorRecord};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::QuoteError;

/// Price and logistics for one order line, ready for checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderQuote {
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub brand: String,
    pub bottle_type: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub distance_m: Option<f64>,
    pub customer_position: Option<Position>,
    pub vendor_position: Option<Position>,
    pub quoted_at: DateTime<Utc>,
}

/// Quotes `quantity` bottles of `brand` / `bottle_type` from `vendor`.
///
/// # Errors
///
/// [`QuoteError::ZeroQuantity`], [`QuoteError::NotOffered`] when the vendor
/// does not offer the combination, [`QuoteError::NoPrice`] when it does but
/// lists no price, [`QuoteError::TotalOverflow`] when the total does not fit
/// a `Decimal`.
pub fn quote_order(
    vendor: &VendorRecord,
    brand: &str,
    bottle_type: &str,
    quantity: u32,
    position: Option<Position>,
) -> Result<OrderQuote, QuoteError> {
    if quantity == 0 {
        return Err(QuoteError::ZeroQuantity);
    }
    if !vendor.offers(brand, bottle_type) {
        return Err(QuoteError::NotOffered {
            vendor: vendor.id.clone(),
            brand: brand.to_owned(),
            bottle_type: bottle_type.to_owned(),
        });
    }
    let unit_price = vendor
        .price(brand, bottle_type)
        .ok_or_else(|| QuoteError::NoPrice {
            vendor: vendor.id.clone(),
            brand: brand.to_owned(),
            bottle_type: bottle_type.to_owned(),
        })?;
    let total_price = unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or(QuoteError::TotalOverflow {
            unit_price,
            quantity,
        })?;

    let customer_position = position.filter(Position::is_valid);
    let vendor_position = vendor.position();
    Ok(OrderQuote {
        vendor_id: vendor.id.clone(),
        vendor_name: vendor.name.clone(),
        brand: brand.trim().to_owned(),
        bottle_type: bottle_type.trim().to_owned(),
        quantity,
        unit_price,
        total_price,
        distance_m: customer_position
            .zip(vendor_position)
            .map(|(a, b)| distance(a, b)),
        customer_position,
        vendor_position,
        quoted_at: Utc::now(),
    })
}
