//! Cart commands.
//!
//! Every command rehydrates the session and loads the cart first, then
//! prints the cart as the backend left it.

use cartwheel_client::Storefront;
use cartwheel_client::models::SessionStatus;
use cartwheel_core::{LineId, Money, ProductId};

use super::CommandError;

/// Print the cart.
///
/// # Errors
///
/// Returns an error if there is no verified session.
pub async fn show(storefront: &Storefront) -> Result<(), CommandError> {
    ready(storefront).await?;
    print_cart(storefront);
    Ok(())
}

/// Add `quantity` units of a product.
///
/// # Errors
///
/// Returns an error if there is no verified session or the backend refuses
/// the change.
pub async fn add(
    storefront: &Storefront,
    product_id: &str,
    quantity: u32,
) -> Result<(), CommandError> {
    ready(storefront).await?;
    storefront
        .cart()
        .add_line(ProductId::new(product_id), quantity)
        .await?;
    print_cart(storefront);
    Ok(())
}

/// Add one unit to a line.
///
/// # Errors
///
/// Returns an error if the line is unknown or at its stock limit.
pub async fn increase(storefront: &Storefront, line_id: &str) -> Result<(), CommandError> {
    ready(storefront).await?;
    storefront.cart().increase(&LineId::new(line_id)).await?;
    print_cart(storefront);
    Ok(())
}

/// Remove one unit from a line; the last unit removes the line.
///
/// # Errors
///
/// Returns an error if the line is unknown or the backend refuses the change.
pub async fn decrease(storefront: &Storefront, line_id: &str) -> Result<(), CommandError> {
    ready(storefront).await?;
    storefront.cart().decrease(&LineId::new(line_id)).await?;
    print_cart(storefront);
    Ok(())
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error if the line is unknown or the backend refuses the change.
pub async fn remove(storefront: &Storefront, line_id: &str) -> Result<(), CommandError> {
    ready(storefront).await?;
    storefront.cart().remove(&LineId::new(line_id)).await?;
    print_cart(storefront);
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error if the backend refuses the change.
pub async fn clear(storefront: &Storefront) -> Result<(), CommandError> {
    ready(storefront).await?;
    storefront.cart().clear().await?;
    print_cart(storefront);
    Ok(())
}

pub(super) async fn ready(storefront: &Storefront) -> Result<(), CommandError> {
    match storefront.initialize().await {
        SessionStatus::Verified => Ok(()),
        SessionStatus::Anonymous | SessionStatus::Stale => Err(CommandError::NotLoggedIn),
    }
}

#[allow(clippy::print_stdout)]
fn print_cart(storefront: &Storefront) {
    let snapshot = storefront.cart().snapshot();
    if snapshot.is_empty() {
        println!("Cart is empty");
        return;
    }

    let currency = storefront.config().currency;
    for line in snapshot.lines() {
        let name = line.name.as_deref().unwrap_or("(unnamed product)");
        match line.line_total() {
            Some(total) => println!(
                "{:<26} {:<30} x{:<3} {:>12}",
                line.line_id.as_str(),
                name,
                line.quantity,
                Money::new(total, currency).to_string()
            ),
            None => println!("{:<26} {:<30} unavailable", line.line_id.as_str(), name),
        }
    }

    let totals = storefront.quote(None);
    println!();
    println!("{} item(s), subtotal {}", totals.line_count, Money::new(totals.subtotal, currency));
}
