//! Order totals.

use cartwheel_client::Storefront;
use cartwheel_core::Money;

use super::CommandError;

/// Print totals for the current cart, with an optional coupon.
///
/// # Errors
///
/// Returns an error if there is no verified session or the coupon is
/// rejected.
#[allow(clippy::print_stdout)]
pub async fn quote(storefront: &Storefront, coupon: Option<&str>) -> Result<(), CommandError> {
    super::cart::ready(storefront).await?;

    let coupon = match coupon {
        Some(code) => Some(storefront.coupons().resolve(code).await?),
        None => None,
    };
    let totals = storefront.quote(coupon.as_ref());
    let currency = storefront.config().currency;
    let money = |amount| Money::new(amount, currency).to_string();

    println!("Subtotal  {:>12}", money(totals.subtotal));
    println!("Shipping  {:>12}", money(totals.shipping));
    println!("Tax       {:>12}", money(totals.tax));
    if let Some(coupon) = &coupon {
        println!("Discount  {:>12}  ({})", format!("-{}", money(totals.discount)), coupon.code);
    }
    println!("Total     {:>12}", money(totals.total));
    Ok(())
}
