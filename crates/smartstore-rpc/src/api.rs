//! Typed wrappers for the back-office operations.
//!
//! Each wrapper builds the parameter object the backend expects and goes
//! through [`RpcClient::call`] with the client's default options, except
//! `test_connection`, which is a single-attempt probe.

use crate::client::{CallOptions, RpcClient};
use crate::domain::envelope::{Envelope, Params};
use crate::domain::error::RpcError;
use crate::domain::operations::names;
use serde_json::{json, Value};

/// Convert a `json!` object literal into a parameter map.
fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// `record` plus one extra field, without touching `record`.
fn with_field(record: &Params, key: &str, value: impl Into<Value>) -> Params {
    let mut merged = record.clone();
    merged.insert(key.to_string(), value.into());
    merged
}

impl RpcClient {
    async fn invoke(&self, operation: &str, params: Params) -> Result<Envelope, RpcError> {
        self.call(operation, &params, CallOptions::default()).await
    }

    /// Connectivity probe. One attempt, no retry.
    pub async fn test_connection(&self) -> Result<Envelope, RpcError> {
        self.call(names::TEST_CONNECTION, &Params::new(), CallOptions::once())
            .await
    }

    /// Authenticate; on success the session holds the returned token and user.
    pub async fn login(&self, username: &str, password: &str) -> Result<Envelope, RpcError> {
        self.invoke(
            names::LOGIN,
            params(json!({ "username": username, "password": password })),
        )
        .await
    }

    pub async fn get_inventory_data(&self) -> Result<Envelope, RpcError> {
        self.invoke(names::GET_INVENTORY_DATA, Params::new()).await
    }

    /// Record a sale (`items`, `total`, `paymentMethod`, `soldBy`, ...).
    pub async fn submit_sale_data(&self, sale: &Params) -> Result<Envelope, RpcError> {
        self.invoke(names::SUBMIT_SALE_DATA, sale.clone()).await
    }

    /// Report for the given filter (period, date range, ...).
    pub async fn generate_report(&self, filter: &Params) -> Result<Envelope, RpcError> {
        self.invoke(names::GENERATE_REPORT, filter.clone()).await
    }

    pub async fn add_inventory_item(
        &self,
        item: &Params,
        username: &str,
    ) -> Result<Envelope, RpcError> {
        self.invoke(names::ADD_INVENTORY_ITEM, with_field(item, "username", username))
            .await
    }

    pub async fn update_inventory_item(
        &self,
        item: &Params,
        username: &str,
    ) -> Result<Envelope, RpcError> {
        self.invoke(
            names::UPDATE_INVENTORY_ITEM,
            with_field(item, "username", username),
        )
        .await
    }

    pub async fn delete_inventory_item(
        &self,
        item_name: &str,
        username: &str,
    ) -> Result<Envelope, RpcError> {
        self.invoke(
            names::DELETE_INVENTORY_ITEM,
            params(json!({ "itemName": item_name, "username": username })),
        )
        .await
    }

    pub async fn bulk_upload_inventory(
        &self,
        items: Vec<Value>,
        username: &str,
    ) -> Result<Envelope, RpcError> {
        self.invoke(
            names::BULK_UPLOAD_INVENTORY,
            params(json!({ "items": items, "username": username })),
        )
        .await
    }

    pub async fn get_todays_sales_breakdown(&self) -> Result<Envelope, RpcError> {
        self.invoke(names::GET_TODAYS_SALES_BREAKDOWN, Params::new())
            .await
    }

    pub async fn get_all_users(&self) -> Result<Envelope, RpcError> {
        self.invoke(names::GET_ALL_USERS, Params::new()).await
    }

    pub async fn get_all_usernames(&self) -> Result<Envelope, RpcError> {
        self.invoke(names::GET_ALL_USERNAMES, Params::new()).await
    }

    /// Create a user; `current_user` is the manager performing the change.
    pub async fn add_user(&self, user: &Params, current_user: &str) -> Result<Envelope, RpcError> {
        self.invoke(names::ADD_USER, with_field(user, "currentUser", current_user))
            .await
    }

    pub async fn delete_user(
        &self,
        username: &str,
        current_user: &str,
    ) -> Result<Envelope, RpcError> {
        self.invoke(
            names::DELETE_USER,
            params(json!({ "username": username, "currentUser": current_user })),
        )
        .await
    }

    /// Change `target_user`'s password. Managers may omit the old password.
    pub async fn change_password(
        &self,
        current_user: &str,
        target_user: &str,
        new_password: &str,
        old_password: Option<&str>,
        is_manager: bool,
    ) -> Result<Envelope, RpcError> {
        self.invoke(
            names::CHANGE_PASSWORD,
            params(json!({
                "currentUser": current_user,
                "targetUser": target_user,
                "newPassword": new_password,
                "oldPassword": old_password,
                "isManager": is_manager,
            })),
        )
        .await
    }

    pub async fn get_dashboard_overview(&self) -> Result<Envelope, RpcError> {
        self.invoke(names::GET_DASHBOARD_OVERVIEW, Params::new())
            .await
    }

    /// The `limit` most recent sales.
    pub async fn get_recent_sales(&self, limit: u32) -> Result<Envelope, RpcError> {
        self.invoke(names::GET_RECENT_SALES, params(json!({ "limit": limit })))
            .await
    }

    /// Items whose stock is at or below `threshold`.
    pub async fn get_stock_alerts(&self, threshold: u32) -> Result<Envelope, RpcError> {
        self.invoke(
            names::GET_STOCK_ALERTS,
            params(json!({ "threshold": threshold })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryTokenStore, ScriptedTransport, Step};
    use crate::domain::error::ErrorKind;
    use std::sync::Arc;

    fn signed_in(transport: Arc<ScriptedTransport>) -> RpcClient {
        RpcClient::builder(transport)
            .token_store(Arc::new(MemoryTokenStore::with_token("abc")))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_item_payload_gets_username() {
        let transport = Arc::new(ScriptedTransport::always(Step::Echo(Default::default())));
        let client = signed_in(transport.clone());
        let item = params(json!({ "name": "Rice 5kg", "quantity": 12, "price": 95.5 }));

        client.add_inventory_item(&item, "clerk1").await.unwrap();

        let requests = transport.requests();
        let sent = &requests[0];
        assert_eq!(sent.operation, "addInventoryItem");
        assert_eq!(sent.params.get("username"), Some(&json!("clerk1")));
        assert_eq!(sent.params.get("name"), Some(&json!("Rice 5kg")));
        assert_eq!(sent.params.get("token"), Some(&json!("abc")));
        assert!(!item.contains_key("username"));
    }

    #[tokio::test]
    async fn test_change_password_shape() {
        let transport = Arc::new(ScriptedTransport::always(Step::Echo(Default::default())));
        let client = signed_in(transport.clone());

        client
            .change_password("manager", "clerk1", "n3w", None, true)
            .await
            .unwrap();

        let requests = transport.requests();
        let sent = &requests[0].params;
        assert_eq!(sent.get("targetUser"), Some(&json!("clerk1")));
        assert_eq!(sent.get("oldPassword"), Some(&Value::Null));
        assert_eq!(sent.get("isManager"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_recent_sales_limit() {
        let transport = Arc::new(ScriptedTransport::always(Step::Echo(Default::default())));
        let client = signed_in(transport.clone());

        let envelope = client.get_recent_sales(5).await.unwrap();
        assert_eq!(envelope.get("params"), Some(&json!({ "limit": 5, "token": "abc" })));
    }

    #[tokio::test]
    async fn test_test_connection_is_public_and_single_attempt() {
        let transport = Arc::new(ScriptedTransport::always(Step::Fail("refused".into())));
        let client = RpcClient::builder(transport.clone()).build().unwrap();

        let err = client.test_connection().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(transport.dispatch_count(), 1);
        assert!(transport.requests()[0].token.is_none());
    }

    #[tokio::test]
    async fn test_private_wrappers_need_session() {
        let transport = Arc::new(ScriptedTransport::always(Step::Hang));
        let client = RpcClient::builder(transport.clone()).build().unwrap();

        let err = client.get_dashboard_overview().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        let err = client.delete_user("clerk1", "manager").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthRequired);
        assert_eq!(transport.dispatch_count(), 0);
    }
}
