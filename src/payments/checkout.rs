//! Gateway checkout URL construction.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use sha2::{Digest, Sha512};
use url::Url;

use crate::config::GatewayConfig;
use crate::payments::types::CallbackError;

/// Widget signature: hex `sha512(address + secret)`.
///
/// The address is rendered in its checksummed form, as handed to the widget.
pub fn widget_signature(address: Address, secret: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(address.to_checksum(None).as_bytes());
    hasher.update(secret.as_bytes());
    alloy::hex::encode(hasher.finalize())
}

/// Parameters of one checkout.
#[derive(Debug, Clone)]
pub struct CheckoutParams<'a> {
    pub address: Address,
    pub fiat_amount: Decimal,
    /// Native currency the gateway delivers (BNB, ETH).
    pub currency: &'a str,
    pub email: &'a str,
    pub redirect_url: &'a str,
    pub correlation_token: &'a str,
}

/// Build the signed widget URL for a buy of `params.currency`.
pub fn checkout_url(config: &GatewayConfig, params: &CheckoutParams<'_>) -> Result<String, CallbackError> {
    let mut url = Url::parse(&config.checkout_base_url)
        .map_err(|e| CallbackError::InvalidRequest(format!("checkout base URL: {}", e)))?;

    let address = params.address.to_checksum(None);
    url.query_pairs_mut()
        .append_pair("widget_id", &config.widget_id)
        .append_pair("address", &address)
        .append_pair("signature", &widget_signature(params.address, &config.secret_key))
        .append_pair("fiat_amount", &params.fiat_amount.to_string())
        .append_pair("type", "buy")
        .append_pair("fiat_currency", &config.fiat_currency)
        .append_pair("currency", params.currency)
        .append_pair("email", params.email)
        .append_pair("redirect_url", params.redirect_url)
        .append_pair("merchant_transaction_id", params.correlation_token);

    Ok(url.into())
}
