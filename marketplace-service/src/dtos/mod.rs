//! Request and response bodies. Amounts cross the API as rupees
//! ([`rust_decimal::Decimal`]) and are stored as paise.

pub mod booking;
pub mod coupon;
pub mod feedback;
pub mod payment;

pub use booking::*;
pub use coupon::*;
pub use feedback::*;
pub use payment::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::repository::Page;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.skip)
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: i64,
    pub skip: u64,
}

impl<T> Paginated<T> {
    pub fn new<S>(rows: Vec<S>, total: u64, page: Page) -> Self
    where
        S: Into<T>,
    {
        Self {
            items: rows.into_iter().map(Into::into).collect(),
            total,
            limit: page.limit,
            skip: page.skip,
        }
    }
}

pub(crate) fn utc(value: mongodb::bson::DateTime) -> DateTime<Utc> {
    value.to_chrono()
}
