//! Account REST endpoints. Every call is signed over
//! `/{exchange}/{account}{endpoint}` and never retried.

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::account::Account;
use crate::domain::order::{AmendOrder, Order, PlaceOrder, PlaceOrderResponse, Withdraw};
use crate::domain::Info;
use crate::error::SdkError;
use crate::http::{Params, RetryPolicy};
use crate::shared::{rand_client_oid, rand_client_wid};
use crate::ws::Handler;

fn joined(ids: &[&str]) -> Result<String, SdkError> {
    if ids.is_empty() {
        return Err(SdkError::Validation("at least one id is required".into()));
    }
    Ok(ids.join(","))
}

fn decimal(value: Decimal) -> Value {
    json!(value.to_f64())
}

impl Account {
    // ── Orders ───────────────────────────────────────────────────────────

    /// `GET /orders`, optionally filtered by contract and state
    /// (`active`, `end`, ...).
    pub async fn get_order_list(
        &self,
        contract: Option<&str>,
        state: Option<&str>,
    ) -> Result<Vec<Order>, SdkError> {
        self.order_list(contract, state, None).await
    }

    /// Same as [`get_order_list`](Self::get_order_list), served from the
    /// venue's order history store.
    pub async fn get_order_list_from_db(
        &self,
        contract: Option<&str>,
        state: Option<&str>,
    ) -> Result<Vec<Order>, SdkError> {
        self.order_list(contract, state, Some("db")).await
    }

    async fn order_list(
        &self,
        contract: Option<&str>,
        state: Option<&str>,
        helper: Option<&str>,
    ) -> Result<Vec<Order>, SdkError> {
        let mut params: Params = Vec::new();
        if let Some(contract) = contract {
            params.push(("contract", contract.to_string()));
        }
        if let Some(state) = state {
            params.push(("state", state.to_string()));
        }
        if let Some(helper) = helper {
            params.push(("helper", helper.to_string()));
        }
        Ok(self.rest.get("/orders", params, RetryPolicy::None).await?)
    }

    /// Open orders.
    pub async fn get_pending_list(&self, contract: Option<&str>) -> Result<Vec<Order>, SdkError> {
        self.get_order_list(contract, None).await
    }

    pub async fn get_order_use_client_oid(&self, oids: &[&str]) -> Result<Vec<Order>, SdkError> {
        let params = vec![("client_oid", joined(oids)?)];
        Ok(self.rest.get("/orders", params, RetryPolicy::None).await?)
    }

    pub async fn get_order_use_exchange_oid(&self, oids: &[&str]) -> Result<Vec<Order>, SdkError> {
        let params = vec![("exchange_oid", joined(oids)?)];
        Ok(self.rest.get("/orders", params, RetryPolicy::None).await?)
    }

    /// Place an order. A missing `client_oid` is generated.
    ///
    /// With `on_update`, the `order` channel is registered first and every
    /// update for the returned `exchange_oid` is delivered to `on_update` in
    /// order until the order reaches a terminal status.
    pub async fn place_order(
        &self,
        mut order: PlaceOrder,
        on_update: Option<Handler<Order>>,
    ) -> Result<PlaceOrderResponse, SdkError> {
        order.validate()?;
        if order.client_oid.is_none() {
            order.client_oid = Some(rand_client_oid(order.contract.as_str()));
        }

        let track = match &on_update {
            Some(_) => self.ensure_order_channel()?,
            None => false,
        };

        tracing::debug!(
            account = %self.symbol,
            contract = %order.contract,
            bs = %order.bs,
            price = %order.price,
            amount = %order.amount,
            client_oid = ?order.client_oid,
            "Placing order"
        );
        let response: PlaceOrderResponse = self.rest.post("/orders", &order).await?;

        if let (true, Some(on_update)) = (track, on_update) {
            match &response.exchange_oid {
                Some(oid) => {
                    self.tracker
                        .track(oid, on_update, self.stream.stop_signal());
                }
                None => tracing::warn!(
                    account = %self.symbol,
                    "Order placed without exchange_oid; updates cannot be tracked"
                ),
            }
        }
        Ok(response)
    }

    /// Place an order, wait `sleep`, then cancel it.
    pub async fn place_and_cancel(
        &self,
        mut order: PlaceOrder,
        sleep: Duration,
    ) -> Result<(PlaceOrderResponse, Value), SdkError> {
        let client_oid = order
            .client_oid
            .get_or_insert_with(|| rand_client_oid(order.contract.as_str()))
            .clone();
        let placed = self.place_order(order, None).await?;
        tokio::time::sleep(sleep).await;
        let cancelled = match &placed.exchange_oid {
            Some(oid) => self.cancel_use_exchange_oid(&[oid.as_str()]).await?,
            None => self.cancel_use_client_oid(&[client_oid.as_str()]).await?,
        };
        Ok((placed, cancelled))
    }

    pub async fn amend_order_use_client_oid(
        &self,
        client_oid: &str,
        price: Decimal,
        amount: Decimal,
    ) -> Result<Value, SdkError> {
        let params = vec![("client_oid", client_oid.to_string())];
        Ok(self
            .rest
            .patch("/orders", params, &AmendOrder { price, amount })
            .await?)
    }

    pub async fn amend_order_use_exchange_oid(
        &self,
        exchange_oid: &str,
        price: Decimal,
        amount: Decimal,
    ) -> Result<Value, SdkError> {
        let params = vec![("exchange_oid", exchange_oid.to_string())];
        Ok(self
            .rest
            .patch("/orders", params, &AmendOrder { price, amount })
            .await?)
    }

    /// Cancel one or more orders by client id.
    pub async fn cancel_use_client_oid(&self, oids: &[&str]) -> Result<Value, SdkError> {
        let params = vec![("client_oid", joined(oids)?)];
        Ok(self.rest.delete("/orders", params).await?)
    }

    /// Cancel one or more orders by exchange id.
    pub async fn cancel_use_exchange_oid(&self, oids: &[&str]) -> Result<Value, SdkError> {
        let params = vec![("exchange_oid", joined(oids)?)];
        Ok(self.rest.delete("/orders", params).await?)
    }

    pub async fn cancel_all(&self, contract: Option<&str>) -> Result<Value, SdkError> {
        let params = contract
            .map(|c| vec![("contract", c.to_string())])
            .unwrap_or_default();
        Ok(self.rest.delete("/orders/all", params).await?)
    }

    /// Recent fills.
    pub async fn get_dealt_trans(&self, contract: Option<&str>) -> Result<Value, SdkError> {
        self.dealt_trans(contract, None).await
    }

    pub async fn get_dealt_trans_from_db(&self, contract: Option<&str>) -> Result<Value, SdkError> {
        self.dealt_trans(contract, Some("db")).await
    }

    async fn dealt_trans(
        &self,
        contract: Option<&str>,
        helper: Option<&str>,
    ) -> Result<Value, SdkError> {
        let mut params: Params = Vec::new();
        if let Some(contract) = contract {
            params.push(("contract", contract.to_string()));
        }
        if let Some(helper) = helper {
            params.push(("helper", helper.to_string()));
        }
        Ok(self.rest.get("/trans", params, RetryPolicy::None).await?)
    }

    // ── Account ──────────────────────────────────────────────────────────

    /// Balance and positions. For a margin account, the view of its margin
    /// pair.
    pub async fn get_info(&self) -> Result<Info, SdkError> {
        let info: Info = self.rest.get("/info", Vec::new(), RetryPolicy::None).await?;
        match self.margin_contract() {
            Some(contract) => info.margin_view(contract.name()).ok_or_else(|| {
                SdkError::Validation(format!("no margin position for {}", contract))
            }),
            None => Ok(info),
        }
    }

    pub async fn get_status(&self) -> Result<Value, SdkError> {
        Ok(self.rest.get("/status", Vec::new(), RetryPolicy::None).await?)
    }

    // ── Withdrawals and deposits ─────────────────────────────────────────

    /// Request a withdrawal. A missing `client_wid` is generated.
    pub async fn post_withdraw(&self, mut withdraw: Withdraw) -> Result<Value, SdkError> {
        if withdraw.client_wid.is_none() {
            withdraw.client_wid = Some(rand_client_wid(self.exchange(), &withdraw.currency));
        }
        tracing::debug!(
            account = %self.symbol,
            currency = %withdraw.currency,
            amount = %withdraw.amount,
            client_wid = ?withdraw.client_wid,
            "Posting withdraw"
        );
        Ok(self.rest.post("/withdraws", &withdraw).await?)
    }

    pub async fn cancel_withdraw_use_exchange_wid(
        &self,
        exchange_wid: &str,
    ) -> Result<Value, SdkError> {
        let params = vec![("exchange_wid", exchange_wid.to_string())];
        Ok(self.rest.delete("/withdraws", params).await?)
    }

    pub async fn cancel_withdraw_use_client_wid(
        &self,
        client_wid: &str,
    ) -> Result<Value, SdkError> {
        let params = vec![("client_wid", client_wid.to_string())];
        Ok(self.rest.delete("/withdraws", params).await?)
    }

    pub async fn get_withdraw_use_exchange_wid(
        &self,
        exchange_wid: &str,
    ) -> Result<Value, SdkError> {
        let params = vec![("exchange_wid", exchange_wid.to_string())];
        Ok(self.rest.get("/withdraws", params, RetryPolicy::None).await?)
    }

    pub async fn get_withdraw_use_client_wid(&self, client_wid: &str) -> Result<Value, SdkError> {
        let params = vec![("client_wid", client_wid.to_string())];
        Ok(self.rest.get("/withdraws", params, RetryPolicy::None).await?)
    }

    pub async fn get_deposit_list(&self, currency: &str) -> Result<Value, SdkError> {
        let params = vec![("currency", currency.to_string())];
        Ok(self.rest.get("/deposits", params, RetryPolicy::None).await?)
    }

    pub async fn get_deposit_addr_list(&self, currency: &str) -> Result<Value, SdkError> {
        let params = vec![("currency", currency.to_string())];
        Ok(self
            .rest
            .get("/deposits/addresses", params, RetryPolicy::None)
            .await?)
    }

    // ── Margin ───────────────────────────────────────────────────────────

    fn margin_target(&self, contract: Option<&str>) -> Result<String, SdkError> {
        contract
            .map(str::to_string)
            .or_else(|| self.margin_contract().map(|c| c.to_string()))
            .ok_or_else(|| {
                SdkError::Validation(format!(
                    "{} is not a margin account; pass a contract",
                    self.symbol
                ))
            })
    }

    pub async fn get_loan_records(&self, contract: Option<&str>) -> Result<Value, SdkError> {
        let params = vec![("contract", self.margin_target(contract)?)];
        Ok(self.rest.get("/loan-records", params, RetryPolicy::None).await?)
    }

    pub async fn borrow(
        &self,
        currency: &str,
        amount: Decimal,
        contract: Option<&str>,
    ) -> Result<Value, SdkError> {
        let body = json!({
            "contract": self.margin_target(contract)?,
            "currency": currency,
            "amount": decimal(amount),
        });
        Ok(self.rest.post("/borrow", &body).await?)
    }

    pub async fn repay(
        &self,
        exchange_loan_id: &str,
        currency: &str,
        amount: Decimal,
    ) -> Result<Value, SdkError> {
        let body = json!({
            "exchange_loan_id": exchange_loan_id,
            "currency": currency,
            "amount": decimal(amount),
        });
        Ok(self.rest.post("/return", &body).await?)
    }

    /// Move funds from spot into the margin account.
    pub async fn margin_transfer_in(
        &self,
        currency: &str,
        amount: Decimal,
        contract: Option<&str>,
    ) -> Result<Value, SdkError> {
        self.margin_transfer(currency, amount, contract, "margin").await
    }

    /// Move funds from the margin account back to spot.
    pub async fn margin_transfer_out(
        &self,
        currency: &str,
        amount: Decimal,
        contract: Option<&str>,
    ) -> Result<Value, SdkError> {
        self.margin_transfer(currency, amount, contract, "spot").await
    }

    async fn margin_transfer(
        &self,
        currency: &str,
        amount: Decimal,
        contract: Option<&str>,
        target: &str,
    ) -> Result<Value, SdkError> {
        let body = json!({
            "contract": self.margin_target(contract)?,
            "currency": currency,
            "amount": decimal(amount),
            "target": target,
        });
        Ok(self.rest.post("/assets-internal", &body).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_ids() {
        assert_eq!(joined(&["a", "b", "c"]).unwrap(), "a,b,c");
        assert!(matches!(joined(&[]), Err(SdkError::Validation(_))));
    }

    #[test]
    fn test_decimal_goes_out_as_number() {
        assert_eq!(decimal("0.25".parse().unwrap()), json!(0.25));
    }
}
