//! Back-office operation names and their access classification.
//!
//! Private by default: an operation needs a session token unless it is on
//! the public allow-list. The set of valid names belongs to the backend; the
//! client only rejects empty ones.

use crate::domain::error::RpcError;
use std::collections::HashSet;

/// Operation names understood by the back office
pub mod names {
    pub const TEST_CONNECTION: &str = "testConnection";
    pub const LOGIN: &str = "login";
    pub const GET_INVENTORY_DATA: &str = "getInventoryData";
    pub const SUBMIT_SALE_DATA: &str = "submitSaleData";
    pub const GENERATE_REPORT: &str = "generateReport";
    pub const ADD_INVENTORY_ITEM: &str = "addInventoryItem";
    pub const UPDATE_INVENTORY_ITEM: &str = "updateInventoryItem";
    pub const DELETE_INVENTORY_ITEM: &str = "deleteInventoryItem";
    pub const BULK_UPLOAD_INVENTORY: &str = "bulkUploadInventory";
    pub const GET_TODAYS_SALES_BREAKDOWN: &str = "getTodaysSalesBreakdown";
    pub const GET_ALL_USERS: &str = "getAllUsers";
    pub const GET_ALL_USERNAMES: &str = "getAllUsernames";
    pub const ADD_USER: &str = "addUser";
    pub const DELETE_USER: &str = "deleteUser";
    pub const CHANGE_PASSWORD: &str = "changePassword";
    pub const GET_DASHBOARD_OVERVIEW: &str = "getDashboardOverview";
    pub const GET_RECENT_SALES: &str = "getRecentSales";
    pub const GET_STOCK_ALERTS: &str = "getStockAlerts";
}

/// Access class of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationAccess {
    /// Callable without a session
    Public,
    /// Needs a session token
    Private,
}

impl OperationAccess {
    pub fn requires_token(&self) -> bool {
        matches!(self, OperationAccess::Private)
    }
}

/// Allow-list driven classification.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    public: HashSet<String>,
}

impl AccessPolicy {
    pub fn new<I, S>(public_operations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            public: public_operations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn access(&self, operation: &str) -> OperationAccess {
        if self.public.contains(operation) {
            OperationAccess::Public
        } else {
            OperationAccess::Private
        }
    }

    pub fn requires_token(&self, operation: &str) -> bool {
        self.access(operation).requires_token()
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new([names::LOGIN, names::TEST_CONNECTION])
    }
}

/// Reject empty or blank operation names.
pub fn validate_operation(operation: &str) -> Result<(), RpcError> {
    if operation.trim().is_empty() {
        return Err(RpcError::validation("operation name cannot be empty"));
    }
    Ok(())
}
